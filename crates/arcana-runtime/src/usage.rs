//! Per-user usage accounting.
//!
//! The monthly counter is the only mutable state shared between otherwise
//! independent reading requests. The ledger contract is an atomic
//! increment-and-return: concurrent requests from the same user each
//! observe a distinct new count, so a quota check against the returned
//! value cannot double-spend the last slot.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use parking_lot::Mutex;

use crate::store::StoreError;

/// Calendar-month period key, e.g. "2026-08".
pub fn month_key(at: DateTime<Utc>) -> String {
    format!("{:04}-{:02}", at.year(), at.month())
}

/// Atomic usage counter.
#[async_trait]
pub trait UsageLedger: Send + Sync {
    /// Atomically increment the counter and return the new count.
    async fn increment(&self, user_id: &str, period_key: &str) -> Result<u32, StoreError>;

    /// Read the current count without incrementing.
    async fn current(&self, user_id: &str, period_key: &str) -> Result<u32, StoreError>;
}

/// In-memory ledger. One lock guards the whole map, which gives the
/// single-writer semantics the contract requires.
#[derive(Debug, Default)]
pub struct MemoryUsageLedger {
    counts: Mutex<HashMap<(String, String), u32>>,
}

impl MemoryUsageLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UsageLedger for MemoryUsageLedger {
    async fn increment(&self, user_id: &str, period_key: &str) -> Result<u32, StoreError> {
        let mut counts = self.counts.lock();
        let entry = counts
            .entry((user_id.to_string(), period_key.to_string()))
            .or_insert(0);
        *entry += 1;
        Ok(*entry)
    }

    async fn current(&self, user_id: &str, period_key: &str) -> Result<u32, StoreError> {
        Ok(self
            .counts
            .lock()
            .get(&(user_id.to_string(), period_key.to_string()))
            .copied()
            .unwrap_or(0))
    }
}
