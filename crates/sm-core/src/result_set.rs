//! Typed result sets
//!
//! A [`ResultSet`] is the ordered list of rows a statement returned. Two
//! result sets are equal only if they hold the same rows, in the same order,
//! with the same cell types. No normalization or reordering is applied.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One cell of a result row
///
/// Serialized as plain JSON scalars. Non-finite reals, which JSON numbers
/// cannot carry, are written as `{"float": "NaN" | "inf" | "-inf"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "ValueRepr", into = "ValueRepr")]
pub enum Value {
    /// SQL NULL
    Null,
    /// Boolean value
    Bool(bool),
    /// Any integer type that fits in 64 bits
    Integer(i64),
    /// Floating point value
    Real(f64),
    /// Text, and any type rendered as text by the backend (dates, decimals, ...)
    Text(String),
}

/// Reals compare numerically, except that NaN equals NaN so a reference
/// holding NaN can still be reproduced.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Real(a), Value::Real(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Text(a), Value::Text(b)) => a == b,
            _ => false,
        }
    }
}

/// Wire form of [`Value`]
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ValueRepr {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    NonFinite { float: String },
}

impl From<Value> for ValueRepr {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => ValueRepr::Null,
            Value::Bool(b) => ValueRepr::Bool(b),
            Value::Integer(n) => ValueRepr::Integer(n),
            Value::Real(x) if x.is_nan() => ValueRepr::NonFinite {
                float: "NaN".to_string(),
            },
            Value::Real(x) if x.is_infinite() => ValueRepr::NonFinite {
                float: if x > 0.0 { "inf" } else { "-inf" }.to_string(),
            },
            Value::Real(x) => ValueRepr::Real(x),
            Value::Text(s) => ValueRepr::Text(s),
        }
    }
}

impl TryFrom<ValueRepr> for Value {
    type Error = String;

    fn try_from(repr: ValueRepr) -> Result<Self, Self::Error> {
        Ok(match repr {
            ValueRepr::Null => Value::Null,
            ValueRepr::Bool(b) => Value::Bool(b),
            ValueRepr::Integer(n) => Value::Integer(n),
            ValueRepr::Real(x) => Value::Real(x),
            ValueRepr::Text(s) => Value::Text(s),
            ValueRepr::NonFinite { float } => match float.as_str() {
                "NaN" => Value::Real(f64::NAN),
                "inf" => Value::Real(f64::INFINITY),
                "-inf" => Value::Real(f64::NEG_INFINITY),
                other => return Err(format!("unknown non-finite float '{other}'")),
            },
        })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(n) => write!(f, "{}", n),
            Value::Real(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Real(x)
    }
}

/// One result row
pub type Row = Vec<Value>;

/// Ordered rows returned by a statement
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultSet(Vec<Row>);

impl ResultSet {
    /// Wrap fetched rows
    pub fn new(rows: Vec<Row>) -> Self {
        Self(rows)
    }

    /// Rows, in the order the engine returned them
    pub fn rows(&self) -> &[Row] {
        &self.0
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no rows were returned
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consume and return the rows
    pub fn into_rows(self) -> Vec<Row> {
        self.0
    }
}

impl From<Vec<Row>> for ResultSet {
    fn from(rows: Vec<Row>) -> Self {
        Self(rows)
    }
}

/// Renders one tuple per line, e.g. `(1, 'a', NULL)`; a single-cell row
/// keeps its trailing comma (`(1,)`).
impl fmt::Display for ResultSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "(no rows)");
        }
        for (i, row) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            let cells: Vec<String> = row.iter().map(Value::to_string).collect();
            if cells.len() == 1 {
                write!(f, "({},)", cells[0])?;
            } else {
                write!(f, "({})", cells.join(", "))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_is_order_sensitive() {
        let a = ResultSet::new(vec![vec![Value::Integer(1)], vec![Value::Integer(2)]]);
        let b = ResultSet::new(vec![vec![Value::Integer(2)], vec![Value::Integer(1)]]);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn test_equality_is_type_sensitive() {
        let int = ResultSet::new(vec![vec![Value::Integer(1)]]);
        let text = ResultSet::new(vec![vec![Value::Text("1".to_string())]]);
        assert_ne!(int, text);
    }

    #[test]
    fn test_json_keeps_types() {
        let rs = ResultSet::new(vec![vec![
            Value::Integer(1),
            Value::Real(2.5),
            Value::Text("x".to_string()),
            Value::Null,
            Value::Bool(true),
        ]]);
        let json = serde_json::to_string(&rs).unwrap();
        assert_eq!(json, r#"[[1,2.5,"x",null,true]]"#);
        let back: ResultSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rs);
    }

    #[test]
    fn test_json_keeps_non_finite_reals() {
        let rs = ResultSet::new(vec![vec![
            Value::Real(f64::INFINITY),
            Value::Real(f64::NEG_INFINITY),
            Value::Real(f64::NAN),
        ]]);
        let json = serde_json::to_string(&rs).unwrap();
        assert_eq!(
            json,
            r#"[[{"float":"inf"},{"float":"-inf"},{"float":"NaN"}]]"#
        );
        let back: ResultSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rs);
        assert_ne!(back, ResultSet::new(vec![vec![Value::Null; 3]]));

        assert!(serde_json::from_str::<ResultSet>(r#"[[{"float":"big"}]]"#).is_err());
    }

    #[test]
    fn test_display() {
        let rs = ResultSet::new(vec![
            vec![Value::Integer(1)],
            vec![Value::Text("it's".to_string()), Value::Null],
        ]);
        assert_eq!(rs.to_string(), "(1,)\n('it''s', NULL)");
        assert_eq!(ResultSet::default().to_string(), "(no rows)");
    }
}
