//! Per-tenant key allocation.
//!
//! Each tenant owns one `KeyArena`. Sequences are kept per key space (a
//! collection name) and only ever move forward, so a key is never handed out
//! twice even after the document it named has been removed.

use crate::ids::{DocKey, PartitionKey};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct KeyArena {
    partition: PartitionKey,
    sequences: BTreeMap<&'static str, u64>,
}

impl KeyArena {
    pub fn new(partition: PartitionKey) -> Self {
        Self {
            partition,
            sequences: BTreeMap::new(),
        }
    }

    pub fn partition(&self) -> &PartitionKey {
        &self.partition
    }

    /// Allocate the next key in `space`.
    ///
    /// Keys use the smart-graph layout `<partition>:<space>-<seq>`, which keeps
    /// them unique across tenants without any shared counter.
    pub fn next(&mut self, space: &'static str) -> DocKey {
        let seq = self.sequences.entry(space).or_insert(0);
        *seq += 1;
        DocKey::new(format!("{}:{}-{}", self.partition, space, seq))
    }

    /// Number of keys issued so far in `space`.
    pub fn issued(&self, space: &str) -> u64 {
        self.sequences.get(space).copied().unwrap_or(0)
    }
}
