//! Store wrapper that survives losing its backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use super::{MemorySettingsStore, SettingsStore, StoreError};

/// Wraps a primary store with a local-only fallback.
///
/// The first [`StoreError::Unavailable`] from the primary switches the
/// wrapper into degraded mode; from then on every operation goes to the
/// fallback. Other errors pass through unchanged.
pub struct ResilientStore {
    primary: Arc<dyn SettingsStore>,
    fallback: MemorySettingsStore,
    degraded: AtomicBool,
}

impl std::fmt::Debug for ResilientStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientStore")
            .field("degraded", &self.is_degraded())
            .finish_non_exhaustive()
    }
}

impl ResilientStore {
    #[must_use]
    pub fn new(primary: Arc<dyn SettingsStore>) -> Self {
        Self {
            primary,
            fallback: MemorySettingsStore::new(),
            degraded: AtomicBool::new(false),
        }
    }

    /// A store with no persistent backend at all.
    #[must_use]
    pub fn local_only() -> Self {
        Self::new(Arc::new(MemorySettingsStore::new()))
    }

    /// Whether writes currently land in the local fallback.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    fn degrade(&self, error: &StoreError) {
        if !self.degraded.swap(true, Ordering::SeqCst) {
            warn!(%error, "settings store unavailable, switching to local fallback");
        }
    }

    fn active(&self) -> &dyn SettingsStore {
        if self.is_degraded() {
            &self.fallback
        } else {
            self.primary.as_ref()
        }
    }
}

#[async_trait]
impl SettingsStore for ResilientStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        match self.active().get(key).await {
            Err(error) if error.is_unavailable() => {
                self.degrade(&error);
                self.fallback.get(key).await
            }
            other => other,
        }
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        match self.active().set(key, value.clone()).await {
            Err(error) if error.is_unavailable() => {
                self.degrade(&error);
                self.fallback.set(key, value).await
            }
            other => other,
        }
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        match self.active().remove(key).await {
            Err(error) if error.is_unavailable() => {
                self.degrade(&error);
                self.fallback.remove(key).await
            }
            other => other,
        }
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        match self.active().keys_with_prefix(prefix).await {
            Err(error) if error.is_unavailable() => {
                self.degrade(&error);
                self.fallback.keys_with_prefix(prefix).await
            }
            other => other,
        }
    }
}
