//! Command surface exposed to a controlling UI.
//!
//! Commands arrive as JSON objects tagged by `action`. Every command yields a
//! [`CommandResponse`] carrying `success` plus either a payload or a
//! human-readable `error`; nothing escapes the command boundary.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::engine::{Engine, EngineError};
use crate::filter::FilterCriteria;
use crate::settings::Preferences;
use crate::tree::ContentTree;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Command {
    DiscoverAndRender,
    #[serde(alias = "downloadAllAds")]
    DownloadAllMatching,
    RefreshDetection,
    GetStatus,
    ApplyFilters {
        #[serde(default)]
        filters: FilterCriteria,
    },
    ClearFilters,
    GetFilterStats,
    GetFilterSettings,
    SaveFilterSettings {
        filters: FilterCriteria,
    },
    GetPreferences,
    SavePreferences {
        preferences: Preferences,
    },
    /// Full re-initialization of per-page state.
    Reset,
}

/// `{"success": true, ...payload}` or `{"success": false, "error": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl CommandResponse {
    /// Success with `payload` flattened into the response. Non-object
    /// payloads land under `data`.
    pub fn ok(payload: impl Serialize) -> Self {
        match serde_json::to_value(payload) {
            Ok(Value::Object(payload)) => Self {
                success: true,
                error: None,
                payload,
            },
            Ok(Value::Null) => Self {
                success: true,
                error: None,
                payload: Map::new(),
            },
            Ok(other) => {
                let mut payload = Map::new();
                payload.insert("data".to_string(), other);
                Self {
                    success: true,
                    error: None,
                    payload,
                }
            }
            Err(error) => Self::failure(format!("response could not be encoded: {error}")),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            payload: Map::new(),
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }
}

impl From<EngineError> for CommandResponse {
    fn from(error: EngineError) -> Self {
        Self::failure(error.to_string())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DownloadSummary {
    message: String,
    succeeded: usize,
    failed: usize,
    skipped: usize,
    download_count: u64,
}

#[derive(Serialize)]
struct Filters<'a> {
    filters: &'a FilterCriteria,
}

/// Runs one command against the engine.
///
/// The tree lock is released before any transfer is awaited.
#[instrument(skip(engine, tree))]
pub async fn dispatch(
    engine: &mut Engine,
    tree: &Mutex<ContentTree>,
    command: Command,
) -> CommandResponse {
    let response = match run(engine, tree, command).await {
        Ok(response) => response,
        Err(error) => {
            warn!(%error, "command failed");
            error.into()
        }
    };
    debug!(success = response.success, "command finished");
    response
}

async fn run(
    engine: &mut Engine,
    tree: &Mutex<ContentTree>,
    command: Command,
) -> Result<CommandResponse, EngineError> {
    Ok(match command {
        Command::DiscoverAndRender => {
            CommandResponse::ok(engine.discover_and_render(&mut *tree.lock().await)?)
        }
        Command::DownloadAllMatching => {
            let jobs = engine.plan_downloads(&*tree.lock().await)?;
            let report = engine
                .execute_downloads(jobs, &mut crate::download::NoopObserver)
                .await?;
            CommandResponse::ok(DownloadSummary {
                message: report.summary(),
                succeeded: report.items_succeeded(),
                failed: report.items_failed(),
                skipped: report.candidates_skipped(),
                download_count: engine.download_count(),
            })
        }
        Command::RefreshDetection => {
            CommandResponse::ok(engine.refresh_detection(&mut *tree.lock().await)?)
        }
        Command::GetStatus => CommandResponse::ok(engine.status(&*tree.lock().await)?),
        // The tree guard is dropped before the settings write.
        Command::ApplyFilters { filters } => {
            let outcome = engine.overlay_filters(&mut *tree.lock().await, filters.clone())?;
            engine.persist_criteria(filters).await;
            CommandResponse::ok(outcome)
        }
        Command::ClearFilters => {
            let outcome = engine.clear_overlay_filters(&mut *tree.lock().await)?;
            engine.persist_criteria(FilterCriteria::default()).await;
            CommandResponse::ok(outcome)
        }
        Command::GetFilterStats => CommandResponse::ok(engine.filter_stats(&*tree.lock().await)?),
        Command::GetFilterSettings => CommandResponse::ok(Filters {
            filters: engine.saved_criteria(),
        }),
        Command::SaveFilterSettings { filters } => {
            engine.save_filter_settings(filters).await?;
            CommandResponse::ok(())
        }
        Command::GetPreferences => CommandResponse::ok(engine.preferences()),
        Command::SavePreferences { preferences } => {
            engine.save_preferences(preferences).await?;
            CommandResponse::ok(())
        }
        Command::Reset => CommandResponse::ok(engine.reset(&mut *tree.lock().await)?),
    })
}
