//! Metadata view of a record.
//!
//! `RecordMeta` borrows a record and answers the questions the statement
//! builder and the relation resolver ask of it. Nothing is cached: every
//! accessor reads the record's static descriptor or its current field values.

use rowbind_core::{Record, Value};

/// Borrowed metadata view over one record instance.
#[derive(Clone, Copy)]
pub struct RecordMeta<'a> {
    record: &'a dyn Record,
}

impl<'a> RecordMeta<'a> {
    pub fn of(record: &'a dyn Record) -> Self {
        Self { record }
    }

    /// The record's type name, e.g. `"Users"`.
    pub fn type_name(&self) -> &'static str {
        self.record.descriptor().type_name
    }

    /// Target table: the lower-cased type name unless the type overrides it.
    pub fn table_name(&self) -> &'static str {
        self.record.descriptor().table
    }

    /// One persisted name per field in declaration order; `""` for fields
    /// without one.
    pub fn columns(&self) -> Vec<&'static str> {
        self.record
            .descriptor()
            .fields
            .iter()
            .map(|f| f.column)
            .collect()
    }

    /// Bound values, index-aligned with [`columns`](Self::columns).
    pub fn values(&self) -> Vec<Value> {
        self.record.values()
    }

    /// True iff at least one field carries a non-empty relation tag.
    pub fn has_relations(&self) -> bool {
        self.record
            .descriptor()
            .fields
            .iter()
            .any(|f| f.reference.is_some_and(|r| !r.is_empty()))
    }

    /// Nested records in declaration order.
    pub fn relations(&self) -> Vec<&'a dyn Record> {
        self.record.relations()
    }

    /// Persisted name of the field whose type is `nested_type_name`, or `""`
    /// when no field has that type.
    pub fn referencing_column_for(&self, nested_type_name: &str) -> &'static str {
        self.record
            .descriptor()
            .fields
            .iter()
            .find(|f| f.type_name == nested_type_name)
            .map_or("", |f| f.column)
    }

    /// Persisted column names joined for display, skipping untagged fields.
    pub fn query_columns(&self) -> String {
        self.columns()
            .into_iter()
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Values of persisted columns rendered for logs. Never sent to the
    /// database.
    pub fn query_values(&self) -> String {
        self.columns()
            .iter()
            .zip(self.values())
            .filter(|(c, _)| !c.is_empty())
            .map(|(_, v)| v.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl std::fmt::Debug for RecordMeta<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordMeta")
            .field("type_name", &self.type_name())
            .field("table", &self.table_name())
            .finish()
    }
}
