use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::archive::ArchiveIndex;
use crate::error::Result;
use crate::month::Month;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchiveKey {
    pub owner: String,
    pub month: Month,
}

impl ArchiveKey {
    pub fn new(owner: impl Into<String>, month: Month) -> Self {
        Self {
            owner: owner.into(),
            month,
        }
    }
}

/// Process-wide map from (owner, month) to that month's container index.
///
/// Readers only ever see a missing entry or a fully built index. Two callers
/// racing on the same cold key may both build; the later insert replaces the
/// earlier one wholesale. Entries are never evicted.
#[derive(Debug, Default)]
pub struct ArchiveCache {
    entries: RwLock<HashMap<ArchiveKey, Arc<ArchiveIndex>>>,
}

impl ArchiveCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ArchiveKey) -> Option<Arc<ArchiveIndex>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Returns the cached index for `key`, building it with `build` on a miss.
    ///
    /// `build` runs without any lock held. Failures are returned to the caller
    /// and not cached.
    pub fn resolve_with<F>(&self, key: &ArchiveKey, build: F) -> Result<Arc<ArchiveIndex>>
    where
        F: FnOnce() -> Result<ArchiveIndex>,
    {
        if let Some(index) = self.get(key) {
            return Ok(index);
        }

        let index = Arc::new(build()?);
        log::debug!(
            "cached index for {}/{} ({} members)",
            key.owner,
            key.month,
            index.len()
        );
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), Arc::clone(&index));
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
