//! Column types and cell values.

use crate::types::RowKey;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Storage type of a column.
///
/// Link columns name their target table instead of holding a [`TableId`]
/// so that table definitions stay meaningful across snapshots.
///
/// [`TableId`]: crate::TableId
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    /// 64-bit signed integer.
    Int,
    /// 64-bit float.
    Double,
    /// 32-bit float.
    Float,
    /// Boolean.
    Bool,
    /// UTF-8 string.
    String,
    /// Byte string.
    Binary,
    /// Milliseconds since the Unix epoch.
    Timestamp,
    /// Reference to a single row of `target`.
    Link {
        /// Target table name.
        target: String,
    },
    /// Ordered references to rows of `target`.
    LinkList {
        /// Target table name.
        target: String,
    },
    /// Ordered list of primitive values.
    List(Box<ColumnType>),
}

impl ColumnType {
    /// Returns the target table of a link or link-list column.
    #[must_use]
    pub fn link_target(&self) -> Option<&str> {
        match self {
            ColumnType::Link { target } | ColumnType::LinkList { target } => Some(target),
            _ => None,
        }
    }

    /// Checks whether a non-null value can be stored in this column.
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (ColumnType::Int, Value::Int(_))
            | (ColumnType::Double, Value::Double(_))
            | (ColumnType::Float, Value::Float(_))
            | (ColumnType::Bool, Value::Bool(_))
            | (ColumnType::String, Value::String(_))
            | (ColumnType::Binary, Value::Binary(_))
            | (ColumnType::Timestamp, Value::Timestamp(_))
            | (ColumnType::Link { .. }, Value::Link(_))
            | (ColumnType::LinkList { .. }, Value::LinkList(_)) => true,
            (ColumnType::List(element), Value::List(items)) => items.iter().all(|item| element.accepts(item)),
            _ => false,
        }
    }

    /// Checks a value against this type and a column's nullability.
    ///
    /// For primitive lists `nullable` governs the items: a required list
    /// never holds a null item.
    #[must_use]
    pub fn admits(&self, value: &Value, nullable: bool) -> bool {
        match (self, value) {
            (ColumnType::List(element), Value::List(items)) => items
                .iter()
                .all(|item| (nullable && item.is_null()) || element.accepts(item)),
            _ => self.accepts(value),
        }
    }

    /// Returns the value a fresh row holds in a non-nullable column.
    #[must_use]
    pub fn default_value(&self) -> Value {
        match self {
            ColumnType::Int => Value::Int(0),
            ColumnType::Double => Value::Double(0.0),
            ColumnType::Float => Value::Float(0.0),
            ColumnType::Bool => Value::Bool(false),
            ColumnType::String => Value::String(String::new()),
            ColumnType::Binary => Value::Binary(Vec::new()),
            ColumnType::Timestamp => Value::Timestamp(0),
            ColumnType::Link { .. } => Value::Null,
            ColumnType::LinkList { .. } => Value::LinkList(Vec::new()),
            ColumnType::List(_) => Value::List(Vec::new()),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Int => f.write_str("int"),
            ColumnType::Double => f.write_str("double"),
            ColumnType::Float => f.write_str("float"),
            ColumnType::Bool => f.write_str("bool"),
            ColumnType::String => f.write_str("string"),
            ColumnType::Binary => f.write_str("binary"),
            ColumnType::Timestamp => f.write_str("timestamp"),
            ColumnType::Link { target } => write!(f, "link<{target}>"),
            ColumnType::LinkList { target } => write!(f, "list<{target}>"),
            ColumnType::List(element) => write!(f, "list<{element}>"),
        }
    }
}

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Null value.
    Null,
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit float.
    Double(f64),
    /// 32-bit float.
    Float(f32),
    /// Boolean.
    Bool(bool),
    /// UTF-8 string.
    String(String),
    /// Byte string.
    Binary(Vec<u8>),
    /// Milliseconds since the Unix epoch.
    Timestamp(i64),
    /// Reference to a row of the column's target table.
    Link(RowKey),
    /// List of primitive values.
    List(Vec<Value>),
    /// Ordered references to rows of the column's target table.
    LinkList(Vec<RowKey>),
}

impl Value {
    /// Returns the name of this value's type, as used in error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int(_) => "int",
            Value::Double(_) => "double",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::String(_) => "string",
            Value::Binary(_) => "binary",
            Value::Timestamp(_) => "timestamp",
            Value::Link(_) => "link",
            Value::List(_) => "list",
            Value::LinkList(_) => "link list",
        }
    }

    /// Returns true if this is [`Value::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the integer payload, if any.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the numeric payload widened to `f64`, if any.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            Value::Float(v) => Some(f64::from(*v)),
            Value::Timestamp(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Returns the string payload, if any.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the boolean payload, if any.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the link target, if any.
    #[must_use]
    pub fn as_link(&self) -> Option<RowKey> {
        match self {
            Value::Link(key) => Some(*key),
            _ => None,
        }
    }

    /// Orders two values of the same type; mixed types and nulls sort first.
    #[must_use]
    pub fn sort_cmp(&self, other: &Self) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Binary(a), Value::Binary(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) | (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.total_cmp(&y),
                _ => Ordering::Equal,
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Int(v) | Value::Timestamp(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Binary(b) => write!(f, "<{} bytes>", b.len()),
            Value::Link(key) => write!(f, "{key}"),
            Value::List(items) => write!(f, "[{} values]", items.len()),
            Value::LinkList(keys) => write!(f, "[{} links]", keys.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_matching_types_only() {
        assert!(ColumnType::Int.accepts(&Value::Int(1)));
        assert!(!ColumnType::Int.accepts(&Value::Double(1.0)));
        assert!(!ColumnType::Float.accepts(&Value::Double(1.0)));
        assert!(ColumnType::Link {
            target: "Dog".into()
        }
        .accepts(&Value::Link(RowKey::new(3))));
    }

    #[test]
    fn list_accepts_checks_elements() {
        let list = ColumnType::List(Box::new(ColumnType::String));
        assert!(list.accepts(&Value::List(vec![Value::String("a".into())])));
        assert!(!list.accepts(&Value::List(vec![Value::Int(1)])));
    }

    #[test]
    fn null_list_items_need_a_nullable_column() {
        let list = ColumnType::List(Box::new(ColumnType::Int));
        let with_null = Value::List(vec![Value::Int(1), Value::Null]);
        assert!(!list.admits(&with_null, false));
        assert!(list.admits(&with_null, true));
        assert!(!list.admits(&Value::List(vec![Value::Null, Value::Bool(true)]), true));
    }

    #[test]
    fn display_names() {
        assert_eq!(
            ColumnType::LinkList {
                target: "Dog".into()
            }
            .to_string(),
            "list<Dog>"
        );
        assert_eq!(
            ColumnType::List(Box::new(ColumnType::Int)).to_string(),
            "list<int>"
        );
    }

    #[test]
    fn sort_nulls_first() {
        use std::cmp::Ordering;
        assert_eq!(Value::Null.sort_cmp(&Value::Int(1)), Ordering::Less);
        assert_eq!(Value::Int(2).sort_cmp(&Value::Int(1)), Ordering::Greater);
        assert_eq!(
            Value::String("a".into()).sort_cmp(&Value::String("b".into())),
            Ordering::Less
        );
    }
}
