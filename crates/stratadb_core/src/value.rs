//! Conversions between Rust field types and stored values.

use crate::error::{CoreError, CoreResult};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use stratadb_engine::Value;

/// A Rust type that can be stored in a primitive field.
///
/// Reads are strict: a value of another semantic type, a null read into a
/// non-`Option` type, or an integer that does not fit the requested width
/// all fail with [`CoreError::TypeMismatch`].
///
/// Integer fields are stored as `i64`. `i32`, `i16` and `i8` are accepted
/// as views onto them: writes widen, and reads are range-checked instead of
/// truncated. A stored `i64::from(i32::MAX) + 1` read as `i32` is an error,
/// never a wrapped value.
pub trait FieldValue: Sized {
    /// Name used in error messages.
    const TYPE_NAME: &'static str;

    /// Converts into a stored value.
    fn into_value(self) -> Value;

    /// Converts from a stored value read from `column`.
    fn from_value(value: &Value, column: &str) -> CoreResult<Self>;
}

fn mismatch<T: FieldValue>(value: &Value, column: &str) -> CoreError {
    CoreError::type_mismatch(column, T::TYPE_NAME, value.type_name())
}

impl FieldValue for i64 {
    const TYPE_NAME: &'static str = "i64";

    fn into_value(self) -> Value {
        Value::Int(self)
    }

    fn from_value(value: &Value, column: &str) -> CoreResult<Self> {
        value.as_int().ok_or_else(|| mismatch::<Self>(value, column))
    }
}

macro_rules! narrow_int {
    ($($t:ty),*) => {$(
        impl FieldValue for $t {
            const TYPE_NAME: &'static str = stringify!($t);

            fn into_value(self) -> Value {
                Value::Int(i64::from(self))
            }

            fn from_value(value: &Value, column: &str) -> CoreResult<Self> {
                let wide = value.as_int().ok_or_else(|| mismatch::<Self>(value, column))?;
                <$t>::try_from(wide).map_err(|_| {
                    CoreError::type_mismatch(column, Self::TYPE_NAME, format!("int {wide}"))
                })
            }
        }
    )*};
}

narrow_int!(i32, i16, i8);

impl FieldValue for f64 {
    const TYPE_NAME: &'static str = "f64";

    fn into_value(self) -> Value {
        Value::Double(self)
    }

    fn from_value(value: &Value, column: &str) -> CoreResult<Self> {
        match value {
            Value::Double(v) => Ok(*v),
            other => Err(mismatch::<Self>(other, column)),
        }
    }
}

impl FieldValue for f32 {
    const TYPE_NAME: &'static str = "f32";

    fn into_value(self) -> Value {
        Value::Float(self)
    }

    fn from_value(value: &Value, column: &str) -> CoreResult<Self> {
        match value {
            Value::Float(v) => Ok(*v),
            other => Err(mismatch::<Self>(other, column)),
        }
    }
}

impl FieldValue for bool {
    const TYPE_NAME: &'static str = "bool";

    fn into_value(self) -> Value {
        Value::Bool(self)
    }

    fn from_value(value: &Value, column: &str) -> CoreResult<Self> {
        value.as_bool().ok_or_else(|| mismatch::<Self>(value, column))
    }
}

impl FieldValue for String {
    const TYPE_NAME: &'static str = "string";

    fn into_value(self) -> Value {
        Value::String(self)
    }

    fn from_value(value: &Value, column: &str) -> CoreResult<Self> {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| mismatch::<Self>(value, column))
    }
}

impl FieldValue for Vec<u8> {
    const TYPE_NAME: &'static str = "binary";

    fn into_value(self) -> Value {
        Value::Binary(self)
    }

    fn from_value(value: &Value, column: &str) -> CoreResult<Self> {
        match value {
            Value::Binary(bytes) => Ok(bytes.clone()),
            other => Err(mismatch::<Self>(other, column)),
        }
    }
}

impl FieldValue for SystemTime {
    const TYPE_NAME: &'static str = "timestamp";

    fn into_value(self) -> Value {
        let millis = match self.duration_since(UNIX_EPOCH) {
            Ok(after) => i64::try_from(after.as_millis()).unwrap_or(i64::MAX),
            Err(before) => i64::try_from(before.duration().as_millis())
                .map(|m| -m)
                .unwrap_or(i64::MIN),
        };
        Value::Timestamp(millis)
    }

    fn from_value(value: &Value, column: &str) -> CoreResult<Self> {
        match value {
            Value::Timestamp(millis) if *millis >= 0 => {
                Ok(UNIX_EPOCH + Duration::from_millis(millis.unsigned_abs()))
            }
            Value::Timestamp(millis) => Ok(UNIX_EPOCH - Duration::from_millis(millis.unsigned_abs())),
            other => Err(mismatch::<Self>(other, column)),
        }
    }
}

impl<T: FieldValue> FieldValue for Option<T> {
    const TYPE_NAME: &'static str = T::TYPE_NAME;

    fn into_value(self) -> Value {
        self.map_or(Value::Null, FieldValue::into_value)
    }

    fn from_value(value: &Value, column: &str) -> CoreResult<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value, column).map(Some)
        }
    }
}

impl FieldValue for Value {
    const TYPE_NAME: &'static str = "value";

    fn into_value(self) -> Value {
        self
    }

    fn from_value(value: &Value, _column: &str) -> CoreResult<Self> {
        Ok(value.clone())
    }
}

/// Converts a list of primitives into a stored list value.
pub(crate) fn list_into_value<T: FieldValue>(items: Vec<T>) -> Value {
    Value::List(items.into_iter().map(FieldValue::into_value).collect())
}

/// Reads a stored list value as a list of primitives.
pub(crate) fn list_from_value<T: FieldValue>(value: &Value, column: &str) -> CoreResult<Vec<T>> {
    match value {
        Value::List(items) => items.iter().map(|v| T::from_value(v, column)).collect(),
        other => Err(CoreError::type_mismatch(
            column,
            format!("list<{}>", T::TYPE_NAME),
            other.type_name(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrow_reads_reject_overflow() {
        let big = Value::Int(i64::from(i32::MAX) + 1);
        assert!(matches!(
            i32::from_value(&big, "age"),
            Err(CoreError::TypeMismatch { .. })
        ));
        assert_eq!(i64::from_value(&big, "age").unwrap(), i64::from(i32::MAX) + 1);
        assert_eq!(i8::from_value(&Value::Int(-128), "x").unwrap(), -128);
    }

    #[test]
    fn wrong_semantic_type_is_rejected() {
        assert!(f64::from_value(&Value::Float(1.5), "w").is_err());
        assert!(String::from_value(&Value::Int(1), "name").is_err());
        assert!(i64::from_value(&Value::Null, "age").is_err());
    }

    #[test]
    fn option_maps_null() {
        assert_eq!(Option::<String>::from_value(&Value::Null, "nick").unwrap(), None);
        assert_eq!(Option::<i64>::None.into_value(), Value::Null);
        assert_eq!(Some(3_i16).into_value(), Value::Int(3));
    }

    #[test]
    fn timestamps_before_epoch() {
        let t = UNIX_EPOCH - Duration::from_millis(1500);
        let v = t.into_value();
        assert_eq!(v, Value::Timestamp(-1500));
        assert_eq!(SystemTime::from_value(&v, "born").unwrap(), t);
    }

    #[test]
    fn lists_convert_element_wise() {
        let v = list_into_value(vec![1_i32, 2, 3]);
        assert_eq!(list_from_value::<i64>(&v, "xs").unwrap(), vec![1, 2, 3]);
        assert!(list_from_value::<String>(&v, "xs").is_err());
    }
}
