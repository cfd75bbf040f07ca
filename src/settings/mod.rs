//! Persistent settings: the key-value store seam and what the engine keeps
//! in it.
//!
//! Three things live in the store:
//! - [`Preferences`] under [`PREFERENCES_KEY`]
//! - the last filter criteria under [`FILTER_CRITERIA_KEY`]
//! - one [`DownloadRecord`] per confirmed transfer under `download_<id>`
//!
//! Values are JSON. Adapters only move JSON around; typed access goes through
//! [`load_json`] and [`save_json`].

mod memory;
mod resilient;
mod sqlite;

pub use memory::MemorySettingsStore;
pub use resilient::ResilientStore;
pub use sqlite::SqliteSettingsStore;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::download::TransferId;
use crate::identity::Fingerprint;

pub const PREFERENCES_KEY: &str = "preferences";
pub const FILTER_CRITERIA_KEY: &str = "filterCriteria";
pub const DOWNLOAD_RECORD_PREFIX: &str = "download_";

/// Download records older than this are pruned at engine init.
pub const DOWNLOAD_RECORD_MAX_AGE: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Errors raised by settings stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing service is gone (closed pool, torn-down host channel).
    #[error("settings store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("settings backend error: {0}")]
    Backend(#[source] sqlx::Error),

    #[error("invalid stored value for {key}: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
                Self::unavailable(error.to_string())
            }
            sqlx::Error::Io(_) => Self::unavailable(error.to_string()),
            other => Self::Backend(other),
        }
    }
}

/// Key-value store for JSON values.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;

    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Keys starting with `prefix`, sorted.
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// Reads and deserializes `key`.
///
/// # Errors
///
/// Returns the store's error, or [`StoreError::Serialization`] when the stored
/// value does not match `T`.
pub async fn load_json<T: DeserializeOwned>(
    store: &dyn SettingsStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    let Some(value) = store.get(key).await? else {
        return Ok(None);
    };
    serde_json::from_value(value)
        .map(Some)
        .map_err(|source| StoreError::Serialization {
            key: key.to_string(),
            source,
        })
}

/// Serializes and writes `value` under `key`.
///
/// # Errors
///
/// Returns the store's error, or [`StoreError::Serialization`] if `value`
/// cannot be represented as JSON.
pub async fn save_json<T: Serialize + Sync>(
    store: &dyn SettingsStore,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let json = serde_json::to_value(value).map_err(|source| StoreError::Serialization {
        key: key.to_string(),
        source,
    })?;
    store.set(key, json).await
}

/// General preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Preferences {
    /// Download newly rendered candidates after each rescan.
    #[serde(alias = "auto_download")]
    pub auto_download: bool,
    #[serde(alias = "download_format")]
    pub download_format: String,
    /// Output directory for transfers.
    #[serde(alias = "download_location")]
    pub download_location: String,
    #[serde(alias = "download_quality")]
    pub download_quality: String,
    /// Persist a [`DownloadRecord`] after each confirmed transfer.
    #[serde(alias = "include_metadata")]
    pub include_metadata: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            auto_download: false,
            download_format: "original".to_string(),
            download_location: "downloads".to_string(),
            download_quality: "high".to_string(),
            include_metadata: true,
        }
    }
}

impl Preferences {
    /// Loads preferences, falling back to defaults when absent or unreadable.
    pub async fn load(store: &dyn SettingsStore) -> Self {
        match load_json::<Self>(store, PREFERENCES_KEY).await {
            Ok(Some(preferences)) => preferences,
            Ok(None) => Self::default(),
            Err(error) => {
                warn!(%error, "using default preferences");
                Self::default()
            }
        }
    }

    /// # Errors
    ///
    /// Returns the store's error.
    pub async fn save(&self, store: &dyn SettingsStore) -> Result<(), StoreError> {
        save_json(store, PREFERENCES_KEY, self).await
    }
}

/// Metadata kept for one confirmed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRecord {
    pub ad_id: Fingerprint,
    pub original_url: String,
    pub download_time: DateTime<Utc>,
    pub filename: String,
    pub transfer_id: TransferId,
}

impl DownloadRecord {
    /// Store key, `download_<transfer_id>`.
    #[must_use]
    pub fn key(&self) -> String {
        record_key(self.transfer_id)
    }
}

#[must_use]
pub fn record_key(id: TransferId) -> String {
    format!("{DOWNLOAD_RECORD_PREFIX}{id}")
}

/// Removes download records older than `max_age` relative to `now`.
///
/// Records that no longer parse are left alone. Returns the number removed.
///
/// # Errors
///
/// Returns the store's error when listing or removing fails.
#[instrument(skip(store))]
pub async fn prune_download_records(
    store: &dyn SettingsStore,
    now: DateTime<Utc>,
    max_age: Duration,
) -> Result<usize, StoreError> {
    let cutoff = chrono::Duration::from_std(max_age)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);

    let mut removed = 0;
    for key in store.keys_with_prefix(DOWNLOAD_RECORD_PREFIX).await? {
        match load_json::<DownloadRecord>(store, &key).await {
            Ok(Some(record)) if record.download_time < cutoff => {
                store.remove(&key).await?;
                removed += 1;
            }
            Ok(_) => {}
            Err(error) if error.is_unavailable() => return Err(error),
            Err(error) => debug!(%key, %error, "skipping unreadable download record"),
        }
    }
    debug!(removed, "pruned download records");
    Ok(removed)
}
