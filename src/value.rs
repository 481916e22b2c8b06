use std::collections::BTreeMap;
use std::fmt;

use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// A single row as exchanged with a store: column name to value.
pub type Row = BTreeMap<String, Value>;

/// Equality constraints, column name to required value.
pub type Filter = BTreeMap<String, Value>;

/// Field value of a shadow record. Serializes as a plain JSON scalar.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric reading of the value. Text is parsed, reals are truncated.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            Value::Bool(b) => Some(*b as i64),
            Value::Real(f) if f.is_finite() => Some(*f as i64),
            Value::Text(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Integer(n) => Some(*n != 0),
            _ => None,
        }
    }

    /// Loose truthiness: null, false, zero and empty or "0" text are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Integer(n) => *n != 0,
            Value::Real(f) => *f != 0.0,
            Value::Text(s) => !s.is_empty() && s != "0",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(n) => write!(f, "{}", n),
            Value::Real(r) => write!(f, "{}", r),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(n as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Real(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Value::Bool(b) => ToSqlOutput::from(*b as i64),
            Value::Integer(n) => ToSqlOutput::from(*n),
            Value::Real(f) => ToSqlOutput::from(*f),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(n) => Value::Integer(n),
            ValueRef::Real(f) => Value::Real(f),
            ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                Value::Text(String::from_utf8_lossy(bytes).into_owned())
            }
        }
    }
}

/// Builds a `Row` (or `Filter`) from `field => value` pairs.
#[macro_export]
macro_rules! row {
    () => { $crate::Row::new() };
    ($($field:expr => $value:expr),+ $(,)?) => {{
        let mut row = $crate::Row::new();
        $( row.insert(($field).to_string(), $crate::Value::from($value)); )+
        row
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn as_i64_reads_numeric_forms() {
        assert_eq!(Value::Integer(7).as_i64(), Some(7));
        assert_eq!(Value::Real(3.9).as_i64(), Some(3));
        assert_eq!(Value::Text(" 12 ".into()).as_i64(), Some(12));
        assert_eq!(Value::Text("4.0".into()).as_i64(), Some(4));
        assert_eq!(Value::Text("abc".into()).as_i64(), None);
        assert_eq!(Value::Real(f64::NAN).as_i64(), None);
        assert_eq!(Value::Null.as_i64(), None);
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Integer(0).is_truthy());
        assert!(!Value::Text("0".into()).is_truthy());
        assert!(!Value::Text(String::new()).is_truthy());
        assert!(Value::Integer(-1).is_truthy());
        assert!(Value::Text("x".into()).is_truthy());
    }

    #[test]
    fn json_scalars() -> anyhow::Result<()> {
        let row: Row = serde_json::from_str(r#"{"a": null, "b": true, "c": 3, "d": 1.5, "e": "x"}"#)?;
        assert_eq!(row["a"], Value::Null);
        assert_eq!(row["b"], Value::Bool(true));
        assert_eq!(row["c"], Value::Integer(3));
        assert_eq!(row["d"], Value::Real(1.5));
        assert_eq!(row["e"], Value::Text("x".into()));
        assert_eq!(serde_json::to_string(&Value::Integer(3))?, "3");
        Ok(())
    }

    #[test]
    fn row_macro() {
        let row = row! { "Name" => "Metallica", "Rank" => 1 };
        assert_eq!(row.len(), 2);
        assert_eq!(row["Rank"], Value::Integer(1));
    }
}
