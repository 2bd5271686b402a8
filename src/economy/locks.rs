//! Per-record async locks.
//!
//! Every read-validate-mutate-persist cycle holds the lock for each record it
//! touches. Operations spanning several records acquire their keys in sorted
//! order, so two commands can never wait on each other in a cycle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::economy::types::normalize_character_name;

/// Shared trade-book key. Expiry and acceptance both take it.
pub const TRADES_KEY: &str = "trades";

/// Serializes project id allocation.
pub const PROJECT_IDS_KEY: &str = "projects";

pub fn character_key(name: &str) -> String {
    format!("character:{}", normalize_character_name(name))
}

pub fn project_key(id: u64) -> String {
    format!("project:{:020}", id)
}

type Slots = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

/// Guards for a set of records, released together on drop. Slots nobody
/// else holds or waits on are dropped from the table on release.
pub struct RecordGuard {
    keys: Vec<String>,
    guards: Vec<OwnedMutexGuard<()>>,
    slots: Slots,
}

impl RecordGuard {
    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

impl Drop for RecordGuard {
    fn drop(&mut self) {
        self.guards.clear();
        let mut slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        for key in &self.keys {
            // Clones are only handed out under this mutex, so a count of one
            // means no holder and no waiter.
            if slots.get(key).is_some_and(|slot| Arc::strong_count(slot) == 1) {
                slots.remove(key);
            }
        }
    }
}

#[derive(Default, Clone)]
pub struct RecordLocks {
    slots: Slots,
}

impl RecordLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        slots
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Lock a single record.
    pub async fn lock(&self, key: impl Into<String>) -> RecordGuard {
        self.lock_many(vec![key.into()]).await
    }

    /// Lock several records in sorted order. Duplicate keys are taken once.
    pub async fn lock_many(&self, mut keys: Vec<String>) -> RecordGuard {
        keys.sort();
        keys.dedup();
        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            guards.push(self.slot(key).lock_owned().await);
        }
        RecordGuard {
            keys,
            guards,
            slots: self.slots.clone(),
        }
    }

    /// Number of keys currently held or waited on.
    pub fn len(&self) -> usize {
        self.slots.lock().map(|slots| slots.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
