//! Error identifier sources.
//!
//! Every classified error carries an identifier that can be handed to a
//! client and matched against server logs. Sources are injected wherever
//! errors are classified so tests can pin identifiers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Produces identifiers for classified errors.
pub trait ErrorIdSource: Send + Sync {
    fn next_id(&self) -> String;
}

/// Random v4 UUIDs. The default source.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidErrorIds;

impl ErrorIdSource for UuidErrorIds {
    fn next_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Always returns the same identifier.
#[derive(Debug, Clone)]
pub struct FixedErrorIds {
    id: String,
}

impl FixedErrorIds {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl ErrorIdSource for FixedErrorIds {
    fn next_id(&self) -> String {
        self.id.clone()
    }
}

/// `prefix-1`, `prefix-2`, ... in call order.
pub struct SequentialErrorIds {
    prefix: String,
    next: AtomicU64,
}

impl SequentialErrorIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl fmt::Debug for SequentialErrorIds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequentialErrorIds")
            .field("prefix", &self.prefix)
            .field("next", &self.next.load(Ordering::Relaxed))
            .finish()
    }
}

impl ErrorIdSource for SequentialErrorIds {
    fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.prefix, n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_ids_are_unique_and_parseable() {
        let ids = UuidErrorIds;
        let a = ids.next_id();
        let b = ids.next_id();
        assert_ne!(a, b);
        assert!(uuid::Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn sequential_ids_count_up() {
        let ids = SequentialErrorIds::new("req");
        assert_eq!(ids.next_id(), "req-1");
        assert_eq!(ids.next_id(), "req-2");
    }
}
