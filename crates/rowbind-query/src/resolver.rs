//! Relation resolution.
//!
//! [`Mapper::insert`] persists a record together with every record nested in
//! it. Nested records go first, depth-first, in field declaration order; the
//! id generated for each one is stored in the parent's referencing column
//! before the parent itself is inserted. The whole graph is written in one
//! transaction.

use crate::classify;
use crate::insert::{ReferenceMap, insert_within_transaction, insert_without_relations};
use crate::metadata::RecordMeta;
use asupersync::{Cx, Outcome};
use rowbind_core::{
    Connection, Dialect, Error, ErrorIdSource, PersistError, PersistErrorKind, Record,
    TransactionOps, UuidErrorIds,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

const OP_INSERT: &str = "mapper.insert";
const OP_RESOLVE: &str = "mapper.resolve_relations";
const OP_BEGIN: &str = "mapper.begin";
const OP_COMMIT: &str = "mapper.commit";

type InsertFuture<'a> = Pin<Box<dyn Future<Output = Outcome<i64, Error>> + Send + 'a>>;

/// Persists records, and the records nested in them, over a connection.
pub struct Mapper<C> {
    conn: C,
    ids: Arc<dyn ErrorIdSource>,
}

impl<C: Connection> Mapper<C> {
    /// Create a mapper that tags errors with random UUIDs.
    pub fn new(conn: C) -> Self {
        Self {
            conn,
            ids: Arc::new(UuidErrorIds),
        }
    }

    /// Use a different source of error identifiers.
    pub fn with_error_ids(mut self, ids: Arc<dyn ErrorIdSource>) -> Self {
        self.ids = ids;
        self
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    pub fn error_ids(&self) -> &dyn ErrorIdSource {
        self.ids.as_ref()
    }

    pub fn into_inner(self) -> C {
        self.conn
    }

    /// Insert `record` and return the id the database generated for it.
    ///
    /// A record without relations is written with a single statement. A
    /// record with relations is written inside a transaction that is rolled
    /// back if any statement fails, or if `cx` is cancelled, so either the
    /// whole graph is stored or none of it is.
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(table = RecordMeta::of(record).table_name())
    )]
    pub async fn insert(&self, cx: &Cx, record: &dyn Record) -> Outcome<i64, Error> {
        let ids = self.ids.as_ref();
        let meta = RecordMeta::of(record);

        if !meta.has_relations() {
            return insert_without_relations(cx, &self.conn, record, ids).await;
        }

        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }

        let tx = match self.conn.begin(cx).await {
            Outcome::Ok(tx) => tx,
            Outcome::Err(e) => {
                return Outcome::Err(classify::database(
                    e,
                    OP_BEGIN,
                    "Failed to begin transaction",
                    ids,
                ));
            }
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        tracing::debug!(record = meta.type_name(), "transaction opened");

        match insert_graph(cx, &tx, record, self.conn.dialect(), ids).await {
            Outcome::Ok(id) => match tx.commit(cx).await {
                Outcome::Ok(()) => {
                    tracing::debug!(record = meta.type_name(), id, "transaction committed");
                    Outcome::Ok(id)
                }
                Outcome::Err(e) => Outcome::Err(classify::database(
                    e,
                    OP_COMMIT,
                    "Failed to commit entry",
                    ids,
                )),
                Outcome::Cancelled(r) => Outcome::Cancelled(r),
                Outcome::Panicked(p) => Outcome::Panicked(p),
            },
            Outcome::Err(e) => {
                rollback(cx, tx).await;
                Outcome::Err(Error::Persist(PersistError::wrap(
                    PersistErrorKind::Relation,
                    OP_INSERT,
                    classify::INSERT_FAILED_MESSAGE,
                    e,
                    ids,
                )))
            }
            Outcome::Cancelled(r) => {
                rollback(cx, tx).await;
                Outcome::Cancelled(r)
            }
            // The transaction is dropped while open, which rolls it back.
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }
}

impl<C> std::fmt::Debug for Mapper<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mapper").finish_non_exhaustive()
    }
}

/// Insert `record` after every record nested in it, depth-first.
fn insert_graph<'a, T: TransactionOps>(
    cx: &'a Cx,
    tx: &'a T,
    record: &'a dyn Record,
    dialect: Dialect,
    ids: &'a dyn ErrorIdSource,
) -> InsertFuture<'a> {
    Box::pin(async move {
        let meta = RecordMeta::of(record);
        let mut references = ReferenceMap::new();

        for nested in meta.relations() {
            let nested_type = RecordMeta::of(nested).type_name();

            let id = match insert_graph(cx, tx, nested, dialect, ids).await {
                Outcome::Ok(id) => id,
                Outcome::Err(e) => {
                    return Outcome::Err(Error::Persist(PersistError::wrap(
                        PersistErrorKind::Relation,
                        OP_RESOLVE,
                        format!("Failed to insert related {}", nested_type),
                        e,
                        ids,
                    )));
                }
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            };

            let column = meta.referencing_column_for(nested_type);
            if column.is_empty() {
                return Outcome::Err(classify::malformed(
                    OP_RESOLVE,
                    format!(
                        "{} has no persisted field of type {} to hold the related id",
                        meta.type_name(),
                        nested_type
                    ),
                    ids,
                ));
            }
            tracing::trace!(
                record = meta.type_name(),
                related = nested_type,
                column,
                id,
                "resolved relation"
            );
            references.insert(column, id);
        }

        insert_within_transaction(cx, tx, record, &references, dialect, ids).await
    })
}

async fn rollback<T: TransactionOps>(cx: &Cx, tx: T) {
    match tx.rollback(cx).await {
        Outcome::Ok(()) => tracing::debug!("transaction rolled back"),
        Outcome::Err(e) => tracing::warn!(error = %e, "rollback failed"),
        Outcome::Cancelled(_) | Outcome::Panicked(_) => {
            tracing::warn!("rollback interrupted");
        }
    }
}
