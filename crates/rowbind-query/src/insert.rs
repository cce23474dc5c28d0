//! INSERT statement synthesis and execution.
//!
//! Statements have the shape
//! `INSERT INTO <table>(<c1>, <c2>, ...) VALUES (<p1>, <p2>, ...) RETURNING id`.
//! Every value is bound as a parameter. [`Value::Default`] is written as the
//! `DEFAULT` keyword, or, on SQLite, by leaving the column out.

use crate::classify::{self, classify};
use crate::metadata::RecordMeta;
use asupersync::{Cx, Outcome};
use rowbind_core::error::{QueryError, QueryErrorKind};
use rowbind_core::{Connection, Dialect, Error, ErrorIdSource, Record, Row, TransactionOps, Value};
use std::collections::HashMap;

pub(crate) const OP_INSERT_WITHOUT_RELATIONS: &str = "mapper.insert_without_relations";
pub(crate) const OP_INSERT_WITHIN_TRANSACTION: &str = "mapper.insert_within_transaction";

/// Referencing column name -> id generated for the nested record stored
/// there during the current transaction.
pub type ReferenceMap = HashMap<&'static str, i64>;

/// INSERT builder for a single record.
pub struct InsertBuilder<'a> {
    record: &'a dyn Record,
    references: Option<&'a ReferenceMap>,
}

impl<'a> InsertBuilder<'a> {
    pub fn new(record: &'a dyn Record) -> Self {
        Self {
            record,
            references: None,
        }
    }

    /// Substitute generated ids into the referencing columns.
    pub fn with_references(mut self, references: &'a ReferenceMap) -> Self {
        self.references = Some(references);
        self
    }

    /// Column names and values after reference substitution, still aligned
    /// one-to-one and still including untagged slots.
    pub fn resolved_values(&self) -> (Vec<&'static str>, Vec<Value>) {
        let meta = RecordMeta::of(self.record);
        let columns = meta.columns();
        let mut values = meta.values();
        if let Some(references) = self.references {
            apply_references(&columns, &mut values, references);
        }
        (columns, values)
    }

    /// Build the SQL and parameters, or `None` if the record has no
    /// persisted column.
    pub fn build(&self, dialect: Dialect) -> Option<(String, Vec<Value>)> {
        let table = RecordMeta::of(self.record).table_name();
        let (columns, values) = self.resolved_values();

        let persisted: Vec<(&str, Value)> = columns
            .into_iter()
            .zip(values)
            .filter(|(column, _)| !column.is_empty())
            .collect();
        if persisted.is_empty() {
            return None;
        }

        let supports_default = dialect.supports_default_keyword();
        let mut names = Vec::with_capacity(persisted.len());
        let mut slots = Vec::with_capacity(persisted.len());
        let mut params = Vec::with_capacity(persisted.len());

        for (column, value) in persisted {
            if value.is_default() {
                if supports_default {
                    names.push(column);
                    slots.push("DEFAULT".to_string());
                }
                continue;
            }
            params.push(value);
            names.push(column);
            slots.push(dialect.placeholder(params.len()));
        }

        let sql = if names.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES RETURNING id", table)
        } else {
            format!(
                "INSERT INTO {}({}) VALUES ({}) RETURNING id",
                table,
                names.join(", "),
                slots.join(", ")
            )
        };
        Some((sql, params))
    }
}

/// Replace the value of every column named in `references` with its id.
///
/// Substitution is by column name, so untagged slots and column order are
/// left untouched.
pub fn apply_references(columns: &[&str], values: &mut [Value], references: &ReferenceMap) {
    for (column, value) in columns.iter().zip(values.iter_mut()) {
        if column.is_empty() {
            continue;
        }
        if let Some(id) = references.get(column) {
            *value = Value::BigInt(*id);
        }
    }
}

/// Insert a record with no relations directly on the connection.
#[tracing::instrument(
    level = "debug",
    skip_all,
    fields(table = RecordMeta::of(record).table_name())
)]
pub async fn insert_without_relations<C: Connection>(
    cx: &Cx,
    conn: &C,
    record: &dyn Record,
    ids: &dyn ErrorIdSource,
) -> Outcome<i64, Error> {
    let Some((sql, params)) = InsertBuilder::new(record).build(conn.dialect()) else {
        return Outcome::Err(no_columns(record, OP_INSERT_WITHOUT_RELATIONS, ids));
    };
    trace_statement(record, &sql, None);

    if let Some(reason) = cx.cancel_reason() {
        return Outcome::Cancelled(reason);
    }

    match conn.query_one(cx, &sql, &params).await {
        Outcome::Ok(row) => read_id(row, &sql, OP_INSERT_WITHOUT_RELATIONS, ids),
        Outcome::Err(e) => Outcome::Err(classify(e, OP_INSERT_WITHOUT_RELATIONS, ids)),
        Outcome::Cancelled(r) => Outcome::Cancelled(r),
        Outcome::Panicked(p) => Outcome::Panicked(p),
    }
}

/// Insert a record inside an open transaction after splicing in the ids of
/// its already-persisted nested records.
///
/// Rolling back on failure is the caller's job.
#[tracing::instrument(
    level = "debug",
    skip_all,
    fields(table = RecordMeta::of(record).table_name())
)]
pub async fn insert_within_transaction<T: TransactionOps>(
    cx: &Cx,
    tx: &T,
    record: &dyn Record,
    references: &ReferenceMap,
    dialect: Dialect,
    ids: &dyn ErrorIdSource,
) -> Outcome<i64, Error> {
    let Some((sql, params)) = InsertBuilder::new(record)
        .with_references(references)
        .build(dialect)
    else {
        return Outcome::Err(no_columns(record, OP_INSERT_WITHIN_TRANSACTION, ids));
    };
    trace_statement(record, &sql, Some(references));

    if let Some(reason) = cx.cancel_reason() {
        return Outcome::Cancelled(reason);
    }

    match tx.query_one(cx, &sql, &params).await {
        Outcome::Ok(row) => read_id(row, &sql, OP_INSERT_WITHIN_TRANSACTION, ids),
        Outcome::Err(e) => Outcome::Err(classify(e, OP_INSERT_WITHIN_TRANSACTION, ids)),
        Outcome::Cancelled(r) => Outcome::Cancelled(r),
        Outcome::Panicked(p) => Outcome::Panicked(p),
    }
}

fn read_id(
    row: Option<Row>,
    sql: &str,
    op: &'static str,
    ids: &dyn ErrorIdSource,
) -> Outcome<i64, Error> {
    let Some(row) = row else {
        let err = Error::Query(QueryError {
            kind: QueryErrorKind::Database,
            sql: Some(sql.to_string()),
            sqlstate: None,
            message: "INSERT returned no row; expected the generated id".to_string(),
            detail: None,
            source: None,
        });
        return Outcome::Err(classify(err, op, ids));
    };
    match row.get_as::<i64>(0) {
        Ok(id) => Outcome::Ok(id),
        Err(e) => Outcome::Err(classify(e, op, ids)),
    }
}

fn no_columns(record: &dyn Record, op: &'static str, ids: &dyn ErrorIdSource) -> Error {
    let meta = RecordMeta::of(record);
    classify::malformed(
        op,
        format!(
            "{} has no persisted columns; tag at least one field with #[record(name = \"...\")]",
            meta.type_name()
        ),
        ids,
    )
}

fn trace_statement(record: &dyn Record, sql: &str, references: Option<&ReferenceMap>) {
    let meta = RecordMeta::of(record);
    tracing::trace!(
        sql,
        columns = %meta.query_columns(),
        values = %meta.query_values(),
        references = ?references,
        "insert statement"
    );
}
