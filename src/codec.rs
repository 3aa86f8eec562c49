//! Row codec: application values to and from field-name-to-value rows.
//!
//! The default codec goes through `serde_json`, using the declared column
//! types to pick the right [`Value`] variant. Types that need something else
//! can override [`Record::to_row`] and [`Record::from_row`].

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value as Json};

use crate::ast::{Column, CqlType, Row, Value};
use crate::error::{CassaError, CassaResult};

/// An application row type that recipes can store.
///
/// ```
/// use cassa::prelude::*;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct User {
///     id: String,
///     name: String,
/// }
///
/// impl Record for User {
///     fn columns() -> Vec<Column> {
///         vec![Column::new("id", CqlType::Text), Column::new("name", CqlType::Text)]
///     }
/// }
///
/// let row = User { id: "u1".into(), name: "ann".into() }.to_row().unwrap();
/// assert_eq!(row["name"], Value::from("ann"));
/// ```
pub trait Record: Serialize + DeserializeOwned {
    /// Declared fields, in declaration order.
    fn columns() -> Vec<Column>;

    fn to_row(&self) -> CassaResult<Row> {
        encode(self, &Self::columns())
    }

    fn from_row(row: &Row) -> CassaResult<Self> {
        decode(row)
    }
}

/// Encode any serializable struct against a column list.
/// Fields absent from the struct are left out of the row.
pub fn encode<T: Serialize + ?Sized>(value: &T, columns: &[Column]) -> CassaResult<Row> {
    let json = serde_json::to_value(value)?;
    let obj = match json {
        Json::Object(obj) => obj,
        other => {
            return Err(CassaError::Codec(format!(
                "expected a struct or map, got {}",
                kind(&other)
            )));
        }
    };
    let mut row = Row::new();
    for col in columns {
        if let Some(v) = obj.get(&col.name) {
            row.insert(col.name.clone(), from_json(&col.name, v, &col.ty)?);
        }
    }
    Ok(row)
}

/// Decode a row into any deserializable type.
pub fn decode<T: DeserializeOwned>(row: &Row) -> CassaResult<T> {
    let obj: Map<String, Json> = row.iter().map(|(k, v)| (k.clone(), to_json(v))).collect();
    Ok(serde_json::from_value(Json::Object(obj))?)
}

fn kind(v: &Json) -> &'static str {
    match v {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

fn from_json(field: &str, v: &Json, ty: &CqlType) -> CassaResult<Value> {
    let mismatch = || {
        CassaError::Codec(format!(
            "field '{}': cannot store {} as {}",
            field,
            kind(v),
            ty
        ))
    };
    if v.is_null() {
        return Ok(Value::Null);
    }
    let out = match ty {
        CqlType::Text => Value::Text(v.as_str().ok_or_else(mismatch)?.to_string()),
        CqlType::Int | CqlType::BigInt | CqlType::Counter => Value::Int(v.as_i64().ok_or_else(mismatch)?),
        CqlType::Double => Value::Double(v.as_f64().ok_or_else(mismatch)?),
        CqlType::Boolean => Value::Bool(v.as_bool().ok_or_else(mismatch)?),
        CqlType::Uuid => {
            let s = v.as_str().ok_or_else(mismatch)?;
            Value::Uuid(s.parse().map_err(|_| mismatch())?)
        }
        CqlType::Timestamp => match v {
            Json::String(s) => Value::Timestamp(
                DateTime::parse_from_rfc3339(s)
                    .map_err(|_| mismatch())?
                    .with_timezone(&Utc),
            ),
            Json::Number(n) => {
                let ms = n.as_i64().ok_or_else(mismatch)?;
                Value::Timestamp(DateTime::<Utc>::from_timestamp_millis(ms).ok_or_else(mismatch)?)
            }
            _ => return Err(mismatch()),
        },
        CqlType::Blob => {
            let items = v.as_array().ok_or_else(mismatch)?;
            let mut bytes = Vec::with_capacity(items.len());
            for item in items {
                let b = item.as_u64().filter(|b| *b <= u8::MAX as u64).ok_or_else(mismatch)?;
                bytes.push(b as u8);
            }
            Value::Blob(bytes)
        }
        CqlType::List(inner) => {
            let items = v.as_array().ok_or_else(mismatch)?;
            Value::List(
                items
                    .iter()
                    .map(|item| from_json(field, item, inner))
                    .collect::<CassaResult<_>>()?,
            )
        }
        CqlType::Map(inner) => {
            let entries = v.as_object().ok_or_else(mismatch)?;
            Value::Map(
                entries
                    .iter()
                    .map(|(k, item)| Ok((k.clone(), from_json(field, item, inner)?)))
                    .collect::<CassaResult<_>>()?,
            )
        }
    };
    Ok(out)
}

fn to_json(v: &Value) -> Json {
    match v {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(n) => Json::Number((*n).into()),
        Value::Double(n) => Number::from_f64(*n).map(Json::Number).unwrap_or(Json::Null),
        Value::Text(s) => Json::String(s.clone()),
        Value::Uuid(u) => Json::String(u.to_string()),
        Value::Timestamp(t) => Json::String(t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        Value::Blob(b) => Json::Array(b.iter().map(|x| Json::Number((*x).into())).collect()),
        Value::List(items) => Json::Array(items.iter().map(to_json).collect()),
        Value::Map(m) => Json::Object(m.iter().map(|(k, v)| (k.clone(), to_json(v))).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sale {
        id: Uuid,
        seller: String,
        price: i64,
        at: DateTime<Utc>,
        note: Option<String>,
        tags: Vec<String>,
        attrs: BTreeMap<String, f64>,
    }

    impl Record for Sale {
        fn columns() -> Vec<Column> {
            vec![
                Column::new("id", CqlType::Uuid),
                Column::new("seller", CqlType::Text),
                Column::new("price", CqlType::BigInt),
                Column::new("at", CqlType::Timestamp),
                Column::new("note", CqlType::Text),
                Column::new("tags", CqlType::List(Box::new(CqlType::Text))),
                Column::new("attrs", CqlType::Map(Box::new(CqlType::Double))),
            ]
        }
    }

    fn sale() -> Sale {
        Sale {
            id: Uuid::new_v4(),
            seller: "s1".into(),
            price: 42,
            at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            note: None,
            tags: vec!["a".into(), "b".into()],
            attrs: BTreeMap::from([("w".to_string(), 1.5)]),
        }
    }

    #[test]
    fn test_encode_uses_column_types() {
        let s = sale();
        let row = s.to_row().unwrap();
        assert_eq!(row["id"], Value::Uuid(s.id));
        assert_eq!(row["at"], Value::Timestamp(s.at));
        assert_eq!(row["note"], Value::Null);
        assert_eq!(row["tags"], Value::List(vec!["a".into(), "b".into()]));
    }

    #[test]
    fn test_decode_restores_value() {
        let s = sale();
        let back = Sale::from_row(&s.to_row().unwrap()).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn test_decode_ignores_extra_columns() {
        let s = sale();
        let mut row = s.to_row().unwrap();
        row.insert("bucket".into(), Value::Timestamp(s.at));
        assert_eq!(Sale::from_row(&row).unwrap(), s);
    }

    #[test]
    fn test_type_mismatch_is_codec_error() {
        let cols = vec![Column::new("price", CqlType::Int)];
        let err = encode(&serde_json::json!({"price": "lots"}), &cols).unwrap_err();
        assert!(matches!(err, CassaError::Codec(_)));
        assert!(err.to_string().contains("price"));
    }

    #[test]
    fn test_non_struct_rejected() {
        let err = encode(&3, &[]).unwrap_err();
        assert!(matches!(err, CassaError::Codec(_)));
    }
}
