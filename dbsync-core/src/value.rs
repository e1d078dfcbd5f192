//! Engine-neutral value comparison.
//!
//! Drivers disagree on how they surface the same stored value: SQLite returns
//! booleans as integers, MySQL returns `DECIMAL` as text, some drivers widen
//! integers to floats. Row comparison goes through [`canonical_text`] so that
//! these surface differences do not register as data differences.
//!
//! Binary values travel as `{"$hex": "..."}` objects (see [`binary_value`])
//! so they never compare equal to text and are written back as bytes.

use serde_json::Value;

use crate::connector::{Row, RowExt};

/// A primary key tuple in canonical form.
pub type RowKey = Vec<Option<String>>;

/// Object key marking a binary value.
pub const BINARY_TAG: &str = "$hex";

/// Wrap raw bytes as a binary value.
pub fn binary_value(bytes: &[u8]) -> Value {
    let mut map = serde_json::Map::with_capacity(1);
    map.insert(BINARY_TAG.to_string(), Value::String(hex::encode(bytes)));
    Value::Object(map)
}

/// Bytes of a binary value; `None` for anything else.
pub fn as_binary(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::Object(map) if map.len() == 1 => {
            hex::decode(map.get(BINARY_TAG)?.as_str()?).ok()
        }
        _ => None,
    }
}

/// Canonical textual form of a value; `None` for SQL NULL.
pub fn canonical_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else if let Some(u) = n.as_u64() {
                Some(u.to_string())
            } else {
                let f = n.as_f64().unwrap_or_default();
                if f.fract() == 0.0 && f.abs() < 1e15 {
                    Some((f as i64).to_string())
                } else {
                    Some(f.to_string())
                }
            }
        }
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Whether two values are equal after canonicalization.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    canonical_text(a) == canonical_text(b)
}

/// Extract the canonical key of a row.
///
/// Missing key columns yield `None` entries, same as NULL.
pub fn row_key(row: &Row, key_columns: &[String]) -> RowKey {
    key_columns
        .iter()
        .map(|c| row.get_ci(c).and_then(canonical_text))
        .collect()
}

/// Whether two rows differ on any of `columns`.
pub fn rows_differ(a: &Row, b: &Row, columns: &[String]) -> bool {
    columns.iter().any(|c| {
        let left = a.get_ci(c).unwrap_or(&Value::Null);
        let right = b.get_ci(c).unwrap_or(&Value::Null);
        !values_equal(left, right)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_canonical_text() {
        assert_eq!(canonical_text(&json!(null)), None);
        assert_eq!(canonical_text(&json!(true)).as_deref(), Some("1"));
        assert_eq!(canonical_text(&json!(42)).as_deref(), Some("42"));
        assert_eq!(canonical_text(&json!(42.0)).as_deref(), Some("42"));
        assert_eq!(canonical_text(&json!(1.5)).as_deref(), Some("1.5"));
        assert_eq!(canonical_text(&json!("x")).as_deref(), Some("x"));
    }

    #[test]
    fn test_cross_driver_equality() {
        assert!(values_equal(&json!(true), &json!(1)));
        assert!(values_equal(&json!(7), &json!(7.0)));
        assert!(!values_equal(&json!(null), &json!("")));
        assert!(!values_equal(&json!("a"), &json!("b")));
    }

    #[test]
    fn test_binary_values() {
        let blob = binary_value(&[0x00, 0xff, 0x10]);
        assert_eq!(blob, json!({"$hex": "00ff10"}));
        assert_eq!(as_binary(&blob), Some(vec![0x00, 0xff, 0x10]));
        assert_eq!(as_binary(&json!("00ff10")), None);
        assert_eq!(as_binary(&json!({"$hex": "zz"})), None);

        assert!(values_equal(&blob, &binary_value(&[0x00, 0xff, 0x10])));
        assert!(!values_equal(&blob, &json!("00ff10")));
        assert!(!values_equal(&binary_value(b"abc"), &json!("abc")));
    }

    #[test]
    fn test_row_key_and_diff() {
        let a = row(json!({"id": 1, "tenant": "x", "name": "Ann"}));
        let b = row(json!({"ID": 1.0, "tenant": "x", "name": "Anne"}));
        let key = vec!["id".to_string(), "tenant".to_string()];

        assert_eq!(row_key(&a, &key), row_key(&b, &key));
        assert!(rows_differ(&a, &b, &["name".to_string()]));
        assert!(!rows_differ(&a, &b, &key));
    }
}
