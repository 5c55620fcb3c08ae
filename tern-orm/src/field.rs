//! # Field Module
//!
//! Values exchanged with the store and the [`Field`] capability every persistable
//! struct member implements. Scalars (numbers, strings, dates) are encoded here;
//! relation containers live in [`crate::relation`].

// ============================================================================
// External Crate Imports
// ============================================================================

use chrono::{NaiveDate, NaiveDateTime};
use sqlx::{any::AnyArguments, any::AnyRow, Arguments, Row};

// ============================================================================
// Internal Crate Imports
// ============================================================================

use crate::{
    model::FieldKind,
    relation::{ForeignKeyLink, RelationMut},
};

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

// ============================================================================
// Value
// ============================================================================

/// Storage class used to decode a column back from a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Integer,
    Real,
    Text,
}

/// A single column value as written to or read from SQLite.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Appends this value to a positional argument list.
    pub(crate) fn bind(self, args: &mut AnyArguments<'_>) -> Result<(), sqlx::Error> {
        let result = match self {
            Value::Null => args.add(Option::<i64>::None),
            Value::Integer(v) => args.add(v),
            Value::Real(v) => args.add(v),
            Value::Text(v) => args.add(v),
        };
        result.map_err(sqlx::Error::Encode)
    }

    /// Reads `column` from `row`, interpreting it according to `value_type`.
    pub(crate) fn decode(row: &AnyRow, column: &str, value_type: ValueType) -> Result<Value, sqlx::Error> {
        let value = match value_type {
            ValueType::Integer => row.try_get::<Option<i64>, _>(column)?.map(Value::Integer),
            ValueType::Real => match row.try_get::<Option<f64>, _>(column) {
                Ok(v) => v.map(Value::Real),
                // SQLite keeps integral reals in integer storage.
                Err(_) => row.try_get::<Option<i64>, _>(column)?.map(|v| Value::Real(v as f64)),
            },
            ValueType::Text => row.try_get::<Option<String>, _>(column)?.map(Value::Text),
        };
        Ok(value.unwrap_or(Value::Null))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

// ============================================================================
// Field Capability
// ============================================================================

/// Capability of a struct member that takes part in persistence.
///
/// `#[derive(Model)]` dispatches every non-skipped member through this trait, so
/// scalars and relation containers are handled uniformly.
pub trait Field: Send + Sync {
    /// Static classification of the member, used to build the model's field table.
    fn kind() -> FieldKind
    where
        Self: Sized;

    /// The column value, or `None` for members that have no column.
    fn to_value(&self) -> Option<Value>;

    /// Stores a value read from the database.
    fn assign(&mut self, value: Value) -> Result<(), String>;

    /// Clears the member back to its empty state.
    fn reset(&mut self);

    fn as_foreign_key_mut(&mut self) -> Option<&mut dyn ForeignKeyLink> {
        None
    }

    fn as_relation_mut(&mut self) -> Option<RelationMut<'_>> {
        None
    }
}

/// Encoding of a plain value type into a single column.
pub trait Scalar: Sized + Default + Send + Sync {
    const SQL_TYPE: &'static str;
    const VALUE_TYPE: ValueType;

    fn to_value(&self) -> Value;

    fn from_value(value: Value) -> Result<Self, String>;
}

fn mismatch(expected: &str, value: &Value) -> String {
    format!("expected {expected}, found {value:?}")
}

impl Scalar for i32 {
    const SQL_TYPE: &'static str = "integer";
    const VALUE_TYPE: ValueType = ValueType::Integer;

    fn to_value(&self) -> Value {
        Value::Integer(i64::from(*self))
    }

    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Integer(v) => i32::try_from(v).map_err(|e| e.to_string()),
            other => Err(mismatch("integer", &other)),
        }
    }
}

impl Scalar for i64 {
    const SQL_TYPE: &'static str = "integer";
    const VALUE_TYPE: ValueType = ValueType::Integer;

    fn to_value(&self) -> Value {
        Value::Integer(*self)
    }

    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Integer(v) => Ok(v),
            other => Err(mismatch("integer", &other)),
        }
    }
}

impl Scalar for f64 {
    const SQL_TYPE: &'static str = "real";
    const VALUE_TYPE: ValueType = ValueType::Real;

    fn to_value(&self) -> Value {
        Value::Real(*self)
    }

    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Real(v) => Ok(v),
            Value::Integer(v) => Ok(v as f64),
            other => Err(mismatch("real", &other)),
        }
    }
}

impl Scalar for bool {
    const SQL_TYPE: &'static str = "integer";
    const VALUE_TYPE: ValueType = ValueType::Integer;

    fn to_value(&self) -> Value {
        Value::Integer(i64::from(*self))
    }

    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Integer(v) => Ok(v != 0),
            other => Err(mismatch("integer", &other)),
        }
    }
}

impl Scalar for String {
    const SQL_TYPE: &'static str = "varchar(255)";
    const VALUE_TYPE: ValueType = ValueType::Text;

    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Text(v) => Ok(v),
            other => Err(mismatch("text", &other)),
        }
    }
}

impl Scalar for NaiveDateTime {
    const SQL_TYPE: &'static str = "varchar(19)";
    const VALUE_TYPE: ValueType = ValueType::Text;

    fn to_value(&self) -> Value {
        Value::Text(self.format(DATETIME_FORMAT).to_string())
    }

    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Text(v) => NaiveDateTime::parse_from_str(&v, DATETIME_FORMAT).map_err(|e| e.to_string()),
            other => Err(mismatch("date-time text", &other)),
        }
    }
}

impl Scalar for NaiveDate {
    const SQL_TYPE: &'static str = "varchar(10)";
    const VALUE_TYPE: ValueType = ValueType::Text;

    fn to_value(&self) -> Value {
        Value::Text(self.format(DATE_FORMAT).to_string())
    }

    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Text(v) => NaiveDate::parse_from_str(&v, DATE_FORMAT).map_err(|e| e.to_string()),
            other => Err(mismatch("date text", &other)),
        }
    }
}

macro_rules! impl_scalar_field {
    ($($t:ty),*) => {
        $(
            impl Field for $t {
                fn kind() -> FieldKind {
                    FieldKind::scalar(<$t as Scalar>::SQL_TYPE, <$t as Scalar>::VALUE_TYPE)
                }

                fn to_value(&self) -> Option<Value> {
                    Some(Scalar::to_value(self))
                }

                fn assign(&mut self, value: Value) -> Result<(), String> {
                    *self = match value {
                        Value::Null => <$t>::default(),
                        value => <$t as Scalar>::from_value(value)?,
                    };
                    Ok(())
                }

                fn reset(&mut self) {
                    *self = <$t>::default();
                }
            }

            impl Field for Option<$t> {
                fn kind() -> FieldKind {
                    FieldKind::scalar(<$t as Scalar>::SQL_TYPE, <$t as Scalar>::VALUE_TYPE)
                }

                fn to_value(&self) -> Option<Value> {
                    Some(self.as_ref().map_or(Value::Null, Scalar::to_value))
                }

                fn assign(&mut self, value: Value) -> Result<(), String> {
                    *self = match value {
                        Value::Null => None,
                        value => Some(<$t as Scalar>::from_value(value)?),
                    };
                    Ok(())
                }

                fn reset(&mut self) {
                    *self = None;
                }
            }

            impl From<$t> for Value {
                fn from(value: $t) -> Self {
                    Scalar::to_value(&value)
                }
            }
        )*
    };
}

impl_scalar_field!(i32, i64, f64, bool, String, NaiveDateTime, NaiveDate);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_scalars_round_trip_null() {
        let mut name: Option<String> = Some("Ada".to_string());
        assert_eq!(Field::to_value(&name), Some(Value::Text("Ada".to_string())));

        name.assign(Value::Null).unwrap();
        assert_eq!(name, None);
        assert_eq!(Field::to_value(&name), Some(Value::Null));
    }

    #[test]
    fn plain_scalars_fall_back_to_default_on_null() {
        let mut age = 42i32;
        age.assign(Value::Null).unwrap();
        assert_eq!(age, 0);

        let mut active = false;
        active.assign(Value::Integer(1)).unwrap();
        assert!(active);
    }

    #[test]
    fn dates_are_stored_as_fixed_width_text() {
        let date = NaiveDate::from_ymd_opt(2010, 3, 14).unwrap().and_hms_opt(9, 26, 53).unwrap();
        assert_eq!(Scalar::to_value(&date), Value::Text("2010-03-14 09:26:53".to_string()));
        assert_eq!(<NaiveDateTime as Field>::kind().definition("foo"), Some("foo varchar(19)".to_string()));

        let mut parsed = NaiveDateTime::default();
        parsed.assign(Value::Text("2010-03-14 09:26:53".to_string())).unwrap();
        assert_eq!(parsed, date);
    }

    #[test]
    fn mismatched_values_are_rejected() {
        let mut count = 0i32;
        assert!(count.assign(Value::Text("seven".to_string())).is_err());
        assert!(count.assign(Value::Integer(i64::MAX)).is_err());
    }

    #[test]
    fn conversions_into_values() {
        assert_eq!(Value::from(7i32), Value::Integer(7));
        assert_eq!(Value::from("x"), Value::Text("x".to_string()));
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from(true), Value::Integer(1));
    }
}
