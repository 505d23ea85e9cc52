//! Normalization of spreadsheet rows into [`OrderInput`] records.
//!
//! Upstream sheets come with Arabic or English headers, so each field accepts
//! several header spellings. The first non-empty match wins.

use serde_json::{Map, Value};
use triage_shared::Masked;

use crate::order::OrderInput;
use crate::{CoreError, CoreResult};

pub const FIRST_NAME_KEYS: &[&str] = &["الاسم", "firstName", "first_name", "name"];
pub const LAST_NAME_KEYS: &[&str] = &["اللقب", "lastName", "last_name", "surname"];
pub const PHONE_KEYS: &[&str] = &["رقم الهاتف", "phone", "telephone"];
pub const STATE_KEYS: &[&str] = &["الولاية", "state"];
pub const MUNICIPALITY_KEYS: &[&str] = &["البلدية", "municipality"];

/// Business label for the `index`-th row of a batch ingested at `batch_millis`.
pub fn order_label(batch_millis: i64, index: usize) -> String {
    format!("ORDER-{}-{}", batch_millis, index)
}

fn cell_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn pick(row: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| row.get(*key).and_then(cell_text))
}

/// Maps one sheet row onto the five descriptive fields. Returns `None` when
/// the row carries none of them.
pub fn normalize_record(row: &Map<String, Value>, order_id: String) -> Option<OrderInput> {
    let first_name = pick(row, FIRST_NAME_KEYS);
    let last_name = pick(row, LAST_NAME_KEYS);
    let phone = pick(row, PHONE_KEYS);
    let state = pick(row, STATE_KEYS);
    let municipality = pick(row, MUNICIPALITY_KEYS);

    if first_name.is_none()
        && last_name.is_none()
        && phone.is_none()
        && state.is_none()
        && municipality.is_none()
    {
        return None;
    }

    Some(OrderInput {
        order_id,
        first_name: first_name.unwrap_or_default(),
        last_name: last_name.unwrap_or_default(),
        phone: Masked::new(phone.unwrap_or_default()),
        state: state.unwrap_or_default(),
        municipality: municipality.unwrap_or_default(),
    })
}

/// Converts a whole sheet into labelled records ready for the store.
pub fn build_batch(rows: &[Value], batch_millis: i64) -> CoreResult<Vec<OrderInput>> {
    if rows.is_empty() {
        return Err(CoreError::ValidationError("batch contains no rows".to_string()));
    }

    rows.iter()
        .enumerate()
        .map(|(index, row)| {
            let fields = row.as_object().ok_or_else(|| {
                CoreError::ValidationError(format!("row {} is not a record", index))
            })?;
            normalize_record(fields, order_label(batch_millis, index)).ok_or_else(|| {
                CoreError::ValidationError(format!("row {} has none of the order fields", index))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_arabic_headers() {
        let row = json!({
            "الاسم": "أمينة",
            "اللقب": "بن علي",
            "رقم الهاتف": "0555123456",
            "الولاية": "وهران",
            "البلدية": "السانية"
        });
        let input = normalize_record(row.as_object().unwrap(), "ORDER-1-0".to_string()).unwrap();
        assert_eq!(input.first_name, "أمينة");
        assert_eq!(input.last_name, "بن علي");
        assert_eq!(input.phone.expose(), "0555123456");
        assert_eq!(input.state, "وهران");
        assert_eq!(input.municipality, "السانية");
    }

    #[test]
    fn test_synonyms_and_missing_fields() {
        let row = json!({ "name": "Karim", "surname": "Haddad", "telephone": 661234567 });
        let input = normalize_record(row.as_object().unwrap(), "ORDER-1-0".to_string()).unwrap();
        assert_eq!(input.first_name, "Karim");
        assert_eq!(input.last_name, "Haddad");
        assert_eq!(input.phone.expose(), "661234567");
        assert_eq!(input.state, "");
        assert_eq!(input.municipality, "");
    }

    #[test]
    fn test_first_non_empty_synonym_wins() {
        let row = json!({ "الاسم": "  ", "firstName": "Lina", "name": "ignored" });
        let input = normalize_record(row.as_object().unwrap(), "ORDER-1-0".to_string()).unwrap();
        assert_eq!(input.first_name, "Lina");
    }

    #[test]
    fn test_build_batch_labels_rows() {
        let rows = vec![json!({ "firstName": "A" }), json!({ "firstName": "B" })];
        let batch = build_batch(&rows, 1700000000000).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].order_id, "ORDER-1700000000000-0");
        assert_eq!(batch[1].order_id, "ORDER-1700000000000-1");
    }

    #[test]
    fn test_build_batch_rejects_bad_rows() {
        assert!(matches!(build_batch(&[], 1), Err(CoreError::ValidationError(_))));
        assert!(build_batch(&[json!(null)], 1).is_err());
        assert!(build_batch(&[json!({ "unrelated": "x" })], 1).is_err());
    }
}
