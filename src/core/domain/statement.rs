use serde::{Deserialize, Serialize};

/// A positional parameter as seen by a resource manager adapter.
///
/// Adapters try each parameter in turn and bind the first representation
/// that answers; a parameter that answers none of them cannot be bound.
pub trait ToSql: Send + Sync + std::fmt::Debug {
    fn is_null(&self) -> bool {
        false
    }
    fn as_bool(&self) -> Option<bool> {
        None
    }
    fn as_i64(&self) -> Option<i64> {
        None
    }
    fn as_string(&self) -> Option<String> {
        None
    }
}

impl ToSql for i32 {
    fn as_i64(&self) -> Option<i64> {
        Some(i64::from(*self))
    }
}

impl ToSql for i64 {
    fn as_i64(&self) -> Option<i64> {
        Some(*self)
    }
}

impl ToSql for bool {
    fn as_bool(&self) -> Option<bool> {
        Some(*self)
    }
}

impl ToSql for String {
    fn as_string(&self) -> Option<String> {
        Some(self.clone())
    }
}

impl ToSql for &'static str {
    fn as_string(&self) -> Option<String> {
        Some((*self).to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
}

impl ToSql for SqlValue {
    fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
    fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Bool(value) => Some(*value),
            _ => None,
        }
    }
    fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(value) => Some(*value),
            _ => None,
        }
    }
    fn as_string(&self) -> Option<String> {
        match self {
            SqlValue::Text(value) => Some(value.clone()),
            _ => None,
        }
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Int(i64::from(value))
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

/// One branch-local statement. Placeholders use the dialect of the backend
/// the branch targets (`$1` for Postgres, `?` for MySQL).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub sql: String,
    #[serde(default)]
    pub params: Vec<SqlValue>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn bind(mut self, value: impl Into<SqlValue>) -> Self {
        self.params.push(value.into());
        self
    }
}
