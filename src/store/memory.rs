//! In-memory counter store.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{CounterStore, check_revision};
use crate::Result;
use crate::quota::UsageCounters;

/// Process-local counter store. Counters are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, UsageCounters>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of APIs with saved counters.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load(&self, api: &str) -> Result<Option<UsageCounters>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(api).cloned())
    }

    async fn save(&self, api: &str, counters: &UsageCounters) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(api.to_string(), counters.clone());
        Ok(())
    }

    async fn save_if(&self, api: &str, expected: u64, counters: &UsageCounters) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        check_revision(api, entries.get(api), expected)?;
        entries.insert(api.to_string(), counters.clone());
        Ok(())
    }
}
