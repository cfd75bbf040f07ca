//! Ads Downloader Core Library
//!
//! Discovers ad cards in a content tree, gives each one a download
//! affordance, extracts metadata and media, and downloads the media with
//! paced, partial-failure-tolerant transfers. An optional filter overlay
//! narrows what is shown and downloaded.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`tree`] - Content tree model and HTML snapshot loader
//! - [`visibility`] - On-screen and render-state gate
//! - [`discovery`] - Candidate discovery, affordances and rescan scheduling
//! - [`identity`] - Stable candidate fingerprints
//! - [`extract`] - Media and metadata extraction
//! - [`download`] - Filenames, transfers and the paced orchestrator
//! - [`filter`] - Filter criteria, overlay and statistics
//! - [`settings`] - Key-value settings store and its adapters
//! - [`db`] - `SQLite` connection and migrations
//! - [`engine`] - Per-page engine context and lifecycle
//! - [`commands`] - JSON command surface
//! - [`runtime`] - Event loop serializing signals and commands
//! - [`config`] - Optional TOML configuration file

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod commands;
pub mod config;
pub mod db;
pub mod discovery;
pub mod download;
pub mod engine;
pub mod extract;
pub mod filter;
pub mod identity;
pub mod runtime;
pub mod settings;
pub mod tree;
pub(crate) mod user_agent;
pub mod visibility;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use commands::{Command, CommandResponse, dispatch};
pub use db::Database;
pub use discovery::{Candidate, DiscoveryConfig, DiscoveryEngine, HostSignal};
pub use download::{
    BatchObserver, BatchReport, DownloadError, HttpClient, HttpTransferService, Orchestrator,
    PacingPolicy, TransferService,
};
pub use engine::{Engine, EngineConfig, EngineError, EngineStatus, ProcessedSet, RenderReport};
pub use extract::{AdMetadata, AdStatus, ExtractContext, MediaItem, MediaKind};
pub use filter::{FilterCriteria, FilterOutcome, FilterStats};
pub use identity::Fingerprint;
pub use runtime::{EngineRuntime, RuntimeHandle};
pub use settings::{
    MemorySettingsStore, Preferences, ResilientStore, SettingsStore, SqliteSettingsStore,
    StoreError,
};
pub use tree::{ContentTree, NodeId, Rect};
