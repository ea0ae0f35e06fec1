//! Unique identifiers for buses, adapters and in-flight requests
//!
//! Every generator owns its salt and counter. Nothing is process-wide,
//! so two buses never share a sequence and tests can pin the salt.

use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Produces `"{prefix}-{salt}-{counter}"` identifiers
#[derive(Debug)]
pub struct IdGenerator {
    salt: u64,
    counter: AtomicU64,
}

impl IdGenerator {
    /// Seed the salt from a UUIDv7 (millisecond timestamp + random bits)
    pub fn new() -> Self {
        let (high, low) = Uuid::now_v7().as_u64_pair();
        Self::with_salt(high ^ low)
    }

    /// Fixed salt, for reproducible ids
    pub fn with_salt(salt: u64) -> Self {
        Self {
            salt,
            counter: AtomicU64::new(0),
        }
    }

    pub fn salt(&self) -> u64 {
        self.salt
    }

    /// Next identifier under `prefix`
    pub fn next(&self, prefix: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}-{}", prefix, self.salt, n)
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_sequential_per_prefix_and_salt() {
        let ids = IdGenerator::with_salt(42);

        assert_eq!(ids.next("bus"), "bus-42-0");
        assert_eq!(ids.next("bus-42-0-action"), "bus-42-0-action-42-1");
        assert_eq!(ids.next("wa"), "wa-42-2");
    }

    #[test]
    fn test_generators_are_independent() {
        let first = IdGenerator::with_salt(1);
        let second = IdGenerator::with_salt(1);

        first.next("x");
        first.next("x");

        // No shared counter between instances
        assert_eq!(second.next("x"), "x-1-0");
    }

    #[test]
    fn test_random_salts_differ() {
        let a = IdGenerator::new();
        let b = IdGenerator::new();
        assert_ne!(a.next("bus"), b.next("bus"));
    }
}
