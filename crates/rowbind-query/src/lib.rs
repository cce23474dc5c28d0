//! Statement synthesis and relation resolution for rowbind.
//!
//! `rowbind-query` turns a [`Record`](rowbind_core::Record) into an
//! `INSERT ... RETURNING id` statement and executes it through the
//! [`Connection`](rowbind_core::Connection) trait.
//!
//! # Role In The Architecture
//!
//! - **Metadata**: [`RecordMeta`] reads column names, values and relations.
//! - **Statement synthesis**: [`InsertBuilder`] renders SQL and parameters
//!   for any [`Dialect`](rowbind_core::Dialect).
//! - **Relation resolution**: [`Mapper::insert`] writes nested records first,
//!   inside one transaction, and splices their ids into the parent.
//! - **Classification**: every driver failure leaves this crate as a
//!   [`PersistError`](rowbind_core::PersistError) with a client or server fault.

pub mod classify;
pub mod insert;
pub mod metadata;
pub mod resolver;

pub use classify::{CONSTRAINT_MESSAGE, INSERT_FAILED_MESSAGE, classify, is_constraint_violation};
pub use insert::{
    InsertBuilder, ReferenceMap, apply_references, insert_within_transaction,
    insert_without_relations,
};
pub use metadata::RecordMeta;
pub use resolver::Mapper;

#[cfg(test)]
mod mock;
#[cfg(test)]
mod test_records;
