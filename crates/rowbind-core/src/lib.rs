//! Core types and traits for rowbind.
//!
//! - `Record` capability and its static descriptors
//! - `Value` / `Row` for parameter binding and result fetching
//! - `Connection` / `TransactionOps` for database drivers
//! - `Error` with the persistence error taxonomy and `Fault` classification
//! - `Outcome` and `Cx` re-exported from asupersync

pub use asupersync::{Cx, Outcome};

pub mod connection;
pub mod error;
pub mod ids;
pub mod record;
pub mod row;
pub mod value;

pub use connection::{Connection, Dialect, IsolationLevel, TransactionOps};
pub use error::{
    Error, Fault, FieldValidationError, PersistError, PersistErrorKind, Result, ValidationError,
    ValidationErrorKind,
};
pub use ids::{ErrorIdSource, FixedErrorIds, SequentialErrorIds, UuidErrorIds};
pub use record::{ColumnValue, FieldDescriptor, Record, RecordDescriptor};
pub use row::{FromValue, Row};
pub use value::Value;
