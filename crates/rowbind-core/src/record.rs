//! The `Record` capability and its static descriptors.
//!
//! A record is a struct whose fields map to the columns of one table. Its
//! shape is fixed at compile time by `#[derive(Record)]`, which emits a
//! [`RecordDescriptor`] and the per-instance [`Record::values`] and
//! [`Record::relations`] accessors.
//!
//! ```rust,ignore
//! #[derive(Record)]
//! struct Users {
//!     #[record(name = "id")]
//!     id: i32,
//!     #[record(name = "username")]
//!     username: String,
//!     #[record(name = "credentials_id", reference = "credentials")]
//!     credentials: Credentials,
//! }
//! ```

use crate::value::Value;
use std::time::SystemTime;

/// Compile-time description of one struct field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Rust field name
    pub name: &'static str,
    /// Persisted column name, `""` when the field is not tagged
    pub column: &'static str,
    /// Relation tag; set only on fields holding a nested record
    pub reference: Option<&'static str>,
    /// Last path segment of the field's type, e.g. `"Credentials"`
    pub type_name: &'static str,
}

impl FieldDescriptor {
    pub const fn is_persisted(&self) -> bool {
        !self.column.is_empty()
    }

    pub const fn is_relation(&self) -> bool {
        self.reference.is_some()
    }
}

/// Compile-time description of a record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordDescriptor {
    /// The struct's name
    pub type_name: &'static str,
    /// Target table, the lower-cased type name unless overridden
    pub table: &'static str,
    /// Every field, in declaration order
    pub fields: &'static [FieldDescriptor],
}

/// A struct that can be persisted as one row.
///
/// The trait is object safe so nested records of different types can be
/// walked through `&dyn Record`.
pub trait Record: Send + Sync {
    /// Static shape of this record type.
    fn descriptor(&self) -> &'static RecordDescriptor;

    /// One value per field, index-aligned with
    /// [`RecordDescriptor::fields`]. Relation fields yield
    /// [`Value::Default`]; their id is spliced in by the mapper.
    fn values(&self) -> Vec<Value>;

    /// Nested records held by relation fields, in declaration order.
    fn relations(&self) -> Vec<&dyn Record>;
}

/// Conversion of a field into the value bound for its column.
///
/// Zero values defer to the column default: an empty string or a zero
/// integer becomes [`Value::Default`]. Kinds without a column mapping
/// (timestamps, booleans, floats, bytes) always defer.
pub trait ColumnValue {
    fn column_value(&self) -> Value;
}

impl ColumnValue for String {
    fn column_value(&self) -> Value {
        self.as_str().column_value()
    }
}

impl ColumnValue for &str {
    fn column_value(&self) -> Value {
        if self.is_empty() {
            Value::Default
        } else {
            Value::Text((*self).to_string())
        }
    }
}

macro_rules! int_column_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl ColumnValue for $ty {
                fn column_value(&self) -> Value {
                    if *self == 0 {
                        Value::Default
                    } else {
                        Value::$variant((*self).into())
                    }
                }
            }
        )*
    };
}

int_column_value! {
    i8 => Int,
    i16 => Int,
    i32 => Int,
    u8 => Int,
    u16 => Int,
    i64 => BigInt,
    u32 => BigInt,
}

macro_rules! default_column_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ColumnValue for $ty {
                fn column_value(&self) -> Value {
                    Value::Default
                }
            }
        )*
    };
}

default_column_value!(bool, f32, f64, Vec<u8>, SystemTime);

impl<T: ColumnValue> ColumnValue for Option<T> {
    fn column_value(&self) -> Value {
        self.as_ref().map_or(Value::Default, |v| v.column_value())
    }
}

/// An explicit value is bound as-is.
impl ColumnValue for Value {
    fn column_value(&self) -> Value {
        self.clone()
    }
}
