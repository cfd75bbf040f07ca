//! Engine context: owns the per-page state and implements the command surface.
//!
//! One [`Engine`] lives as long as the hosted page. It holds the set of
//! fingerprints that already received an affordance, the download counter
//! and the filter state. None of it is shared: commands run one at a time
//! against `&mut Engine`.
//!
//! Lifecycle is explicit: [`Engine::init`] reads settings, [`Engine::reset`]
//! clears all per-page state and rediscovers, [`Engine::dispose`] makes every
//! further command fail.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::discovery::{
    self, Candidate, DebounceConfig, DiscoveryConfig, DiscoveryEngine, render_affordance,
};
use crate::download::{
    BatchObserver, BatchReport, DownloadJob, NoopObserver, Orchestrator, PacingPolicy,
    TransferService, prepare_jobs,
};
use crate::extract::{self, ExtractContext, MediaConfig};
use crate::filter::{FilterCriteria, FilterOutcome, FilterState, FilterStats, FilterSubject};
use crate::identity::Fingerprint;
use crate::settings::{
    DOWNLOAD_RECORD_MAX_AGE, FILTER_CRITERIA_KEY, Preferences, SettingsStore, StoreError,
    load_json, prune_download_records, save_json,
};
use crate::tree::ContentTree;
use crate::visibility;

/// Engine tunables.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub discovery: DiscoveryConfig,
    pub media: MediaConfig,
    pub pacing: PacingPolicy,
    pub debounce: DebounceConfig,
    /// Render affordances only on regions currently on screen.
    pub visible_only: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            discovery: DiscoveryConfig::default(),
            media: MediaConfig::default(),
            pacing: PacingPolicy::default(),
            debounce: DebounceConfig::default(),
            visible_only: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine is not initialized")]
    NotInitialized,

    #[error("engine has been disposed")]
    Disposed,

    #[error("settings store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Ready,
    Disposed,
}

/// Fingerprints already granted an affordance.
///
/// Only ever cleared in full.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessedSet(BTreeSet<Fingerprint>);

impl ProcessedSet {
    /// Returns false if the fingerprint was already processed.
    pub fn insert(&mut self, fingerprint: Fingerprint) -> bool {
        self.0.insert(fingerprint)
    }

    #[must_use]
    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.0.contains(fingerprint)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

/// Result of one discover-and-render pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderReport {
    /// Candidates without an affordance found by the pass.
    pub discovered: usize,
    /// Fingerprints that received an affordance, in discovery order.
    pub rendered: Vec<Fingerprint>,
    /// Candidates left for a later pass because they are off screen.
    pub deferred: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub total_detected: usize,
    pub download_count: u64,
}

/// The per-page engine.
pub struct Engine {
    config: EngineConfig,
    discovery: DiscoveryEngine,
    store: Arc<dyn SettingsStore>,
    service: Arc<dyn TransferService>,
    preferences: Preferences,
    processed: ProcessedSet,
    download_count: u64,
    filter: FilterState,
    /// Criteria restored from the store, not applied until asked.
    saved_criteria: FilterCriteria,
    today: Option<NaiveDate>,
    lifecycle: Lifecycle,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("lifecycle", &self.lifecycle)
            .field("processed", &self.processed.len())
            .field("download_count", &self.download_count)
            .finish_non_exhaustive()
    }
}

impl Engine {
    #[must_use]
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn SettingsStore>,
        service: Arc<dyn TransferService>,
    ) -> Self {
        let discovery = DiscoveryEngine::new(config.discovery.clone(), config.media.clone());
        Self {
            config,
            discovery,
            store,
            service,
            preferences: Preferences::default(),
            processed: ProcessedSet::default(),
            download_count: 0,
            filter: FilterState::default(),
            saved_criteria: FilterCriteria::default(),
            today: None,
            lifecycle: Lifecycle::Created,
        }
    }

    /// Pins "today" for date fallbacks and date presets.
    #[must_use]
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    #[must_use]
    pub fn processed(&self) -> &ProcessedSet {
        &self.processed
    }

    #[must_use]
    pub fn download_count(&self) -> u64 {
        self.download_count
    }

    #[must_use]
    pub fn filter_state(&self) -> &FilterState {
        &self.filter
    }

    /// Criteria last persisted, whether or not they are applied.
    #[must_use]
    pub fn saved_criteria(&self) -> &FilterCriteria {
        &self.saved_criteria
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.lifecycle == Lifecycle::Disposed
    }

    #[must_use]
    pub fn discovery(&self) -> &DiscoveryEngine {
        &self.discovery
    }

    /// Extraction context honoring a pinned "today".
    #[must_use]
    pub fn extract_context(&self) -> ExtractContext {
        self.today.map_or_else(ExtractContext::now, ExtractContext::new)
    }

    fn ensure_ready(&self) -> Result<(), EngineError> {
        match self.lifecycle {
            Lifecycle::Ready => Ok(()),
            Lifecycle::Created => Err(EngineError::NotInitialized),
            Lifecycle::Disposed => Err(EngineError::Disposed),
        }
    }

    /// Reads preferences and saved filter criteria, then prunes stale
    /// download records. Store trouble is logged, never fatal.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Disposed`] after [`Engine::dispose`].
    #[instrument(skip(self))]
    pub async fn init(&mut self) -> Result<(), EngineError> {
        if self.lifecycle == Lifecycle::Disposed {
            return Err(EngineError::Disposed);
        }
        let store = self.store.as_ref();
        self.preferences = Preferences::load(store).await;
        self.saved_criteria = match load_json::<FilterCriteria>(store, FILTER_CRITERIA_KEY).await {
            Ok(criteria) => criteria.unwrap_or_default(),
            Err(error) => {
                warn!(%error, "ignoring saved filter criteria");
                FilterCriteria::default()
            }
        };
        if let Err(error) = prune_download_records(store, Utc::now(), DOWNLOAD_RECORD_MAX_AGE).await
        {
            warn!(%error, "download record cleanup failed");
        }
        self.lifecycle = Lifecycle::Ready;
        info!(
            auto_download = self.preferences.auto_download,
            "engine initialized"
        );
        Ok(())
    }

    /// Full re-initialization: clears processed fingerprints, the download
    /// counter and filter state, strips affordances and rediscovers.
    ///
    /// Transfers dispatched before the reset keep running on their own.
    ///
    /// # Errors
    ///
    /// Fails when the engine is not ready.
    pub fn reset(&mut self, tree: &mut ContentTree) -> Result<RenderReport, EngineError> {
        self.ensure_ready()?;
        self.processed.clear();
        self.download_count = 0;
        self.clear_overlay(tree);
        self.filter.reset();
        let stripped = discovery::strip_affordances(tree);
        debug!(stripped, "engine reset");
        self.discover_and_render(tree)
    }

    /// Makes every further command fail. Idempotent.
    pub fn dispose(&mut self) {
        if self.lifecycle != Lifecycle::Disposed {
            self.processed.clear();
            self.filter.reset();
            self.lifecycle = Lifecycle::Disposed;
            debug!("engine disposed");
        }
    }

    /// Discovers regions without an affordance and renders one on each new
    /// fingerprint.
    ///
    /// # Errors
    ///
    /// Fails when the engine is not ready.
    #[instrument(skip_all)]
    pub fn discover_and_render(
        &mut self,
        tree: &mut ContentTree,
    ) -> Result<RenderReport, EngineError> {
        self.ensure_ready()?;
        let candidates = self.discovery.discover(tree);
        let mut report = RenderReport {
            discovered: candidates.len(),
            ..RenderReport::default()
        };
        for candidate in &candidates {
            if self.config.visible_only && !visibility::is_visible(tree, candidate.node) {
                report.deferred += 1;
                continue;
            }
            if !self.processed.insert(candidate.fingerprint.clone()) {
                debug!(fingerprint = %candidate.fingerprint, "fingerprint already processed");
                continue;
            }
            render_affordance(tree, candidate);
            report.rendered.push(candidate.fingerprint.clone());
        }
        debug!(
            discovered = report.discovered,
            rendered = report.rendered.len(),
            deferred = report.deferred,
            "render pass"
        );
        Ok(report)
    }

    /// Strips affordances, clears processed fingerprints and rediscovers.
    /// The download counter is kept.
    ///
    /// # Errors
    ///
    /// Fails when the engine is not ready.
    pub fn refresh_detection(&mut self, tree: &mut ContentTree) -> Result<RenderReport, EngineError> {
        self.ensure_ready()?;
        discovery::strip_affordances(tree);
        self.processed.clear();
        self.discover_and_render(tree)
    }

    /// # Errors
    ///
    /// Fails when the engine is not ready.
    pub fn status(&self, tree: &ContentTree) -> Result<EngineStatus, EngineError> {
        self.ensure_ready()?;
        Ok(EngineStatus {
            total_detected: self.discovery.discover_all(tree).len(),
            download_count: self.download_count,
        })
    }

    /// Jobs for every discovered candidate passing the active filter.
    ///
    /// # Errors
    ///
    /// Fails when the engine is not ready.
    pub fn plan_downloads(&self, tree: &ContentTree) -> Result<Vec<DownloadJob>, EngineError> {
        self.ensure_ready()?;
        let ctx = self.extract_context();
        let candidates: Vec<Candidate> = self
            .discovery
            .discover_all(tree)
            .into_iter()
            .filter(|candidate| self.passes_filter(tree, candidate, &ctx))
            .collect();
        Ok(prepare_jobs(tree, &candidates, &self.discovery, &ctx))
    }

    /// Jobs for the given fingerprints only, in discovery order.
    ///
    /// # Errors
    ///
    /// Fails when the engine is not ready.
    pub fn plan_downloads_for(
        &self,
        tree: &ContentTree,
        fingerprints: &[Fingerprint],
    ) -> Result<Vec<DownloadJob>, EngineError> {
        self.ensure_ready()?;
        let wanted: BTreeSet<&Fingerprint> = fingerprints.iter().collect();
        let candidates: Vec<Candidate> = self
            .discovery
            .discover_all(tree)
            .into_iter()
            .filter(|candidate| wanted.contains(&candidate.fingerprint))
            .collect();
        Ok(prepare_jobs(tree, &candidates, &self.discovery, &self.extract_context()))
    }

    /// Runs planned jobs and bumps the download counter once per candidate
    /// with at least one confirmed item.
    ///
    /// # Errors
    ///
    /// Fails when the engine is not ready. Transfer failures land in the
    /// report instead.
    pub async fn execute_downloads(
        &mut self,
        jobs: Vec<DownloadJob>,
        observer: &mut dyn BatchObserver,
    ) -> Result<BatchReport, EngineError> {
        self.ensure_ready()?;
        let mut orchestrator = Orchestrator::new(self.service.clone(), self.config.pacing);
        if self.preferences.include_metadata {
            orchestrator = orchestrator.with_record_store(self.store.clone());
        }
        let report = orchestrator.run_with_observer(jobs, observer).await;
        self.download_count += report.candidates_completed() as u64;
        Ok(report)
    }

    /// Plans and runs downloads for every candidate passing the active filter.
    ///
    /// # Errors
    ///
    /// Fails when the engine is not ready.
    pub async fn download_all_matching(
        &mut self,
        tree: &ContentTree,
    ) -> Result<BatchReport, EngineError> {
        let jobs = self.plan_downloads(tree)?;
        self.execute_downloads(jobs, &mut NoopObserver).await
    }

    /// Applies and persists `criteria`.
    ///
    /// # Errors
    ///
    /// Fails when the engine is not ready.
    pub async fn apply_filters(
        &mut self,
        tree: &mut ContentTree,
        criteria: FilterCriteria,
    ) -> Result<FilterOutcome, EngineError> {
        let outcome = self.overlay_filters(tree, criteria.clone())?;
        self.persist_criteria(criteria).await;
        Ok(outcome)
    }

    /// Resets criteria to neutral and shows every candidate.
    ///
    /// # Errors
    ///
    /// Fails when the engine is not ready.
    pub async fn clear_filters(
        &mut self,
        tree: &mut ContentTree,
    ) -> Result<FilterOutcome, EngineError> {
        let outcome = self.clear_overlay_filters(tree)?;
        self.persist_criteria(FilterCriteria::default()).await;
        Ok(outcome)
    }

    /// Tree half of [`Engine::apply_filters`]; nothing is persisted.
    ///
    /// # Errors
    ///
    /// Fails when the engine is not ready.
    pub fn overlay_filters(
        &mut self,
        tree: &mut ContentTree,
        criteria: FilterCriteria,
    ) -> Result<FilterOutcome, EngineError> {
        self.ensure_ready()?;
        let subjects = self.subjects(tree);
        Ok(self
            .filter
            .apply(tree, &subjects, criteria, self.extract_context().today))
    }

    /// Tree half of [`Engine::clear_filters`]; nothing is persisted.
    ///
    /// # Errors
    ///
    /// Fails when the engine is not ready.
    pub fn clear_overlay_filters(
        &mut self,
        tree: &mut ContentTree,
    ) -> Result<FilterOutcome, EngineError> {
        self.ensure_ready()?;
        let subjects = self.subjects(tree);
        Ok(self.filter.clear(tree, &subjects))
    }

    /// # Errors
    ///
    /// Fails when the engine is not ready.
    pub fn filter_stats(&self, tree: &ContentTree) -> Result<FilterStats, EngineError> {
        self.ensure_ready()?;
        Ok(FilterStats::collect(&self.subjects(tree)))
    }

    /// Persists criteria without applying them.
    ///
    /// # Errors
    ///
    /// Fails when the engine is not ready or the store rejects the value.
    pub async fn save_filter_settings(&mut self, criteria: FilterCriteria) -> Result<(), EngineError> {
        self.ensure_ready()?;
        save_json(self.store.as_ref(), FILTER_CRITERIA_KEY, &criteria).await?;
        self.saved_criteria = criteria;
        Ok(())
    }

    /// # Errors
    ///
    /// Fails when the engine is not ready or the store rejects the value.
    pub async fn save_preferences(&mut self, preferences: Preferences) -> Result<(), EngineError> {
        self.ensure_ready()?;
        preferences.save(self.store.as_ref()).await?;
        self.preferences = preferences;
        Ok(())
    }

    /// Saves `criteria` as the last used filter. Store failures are logged.
    pub async fn persist_criteria(&mut self, criteria: FilterCriteria) {
        if let Err(error) = save_json(self.store.as_ref(), FILTER_CRITERIA_KEY, &criteria).await {
            warn!(%error, "filter criteria not saved");
        }
        self.saved_criteria = criteria;
    }

    fn clear_overlay(&self, tree: &mut ContentTree) {
        for candidate in self.discovery.discover_all(tree) {
            tree.set_overlay_hidden(candidate.node, false);
        }
    }

    fn passes_filter(&self, tree: &ContentTree, candidate: &Candidate, ctx: &ExtractContext) -> bool {
        let Some(criteria) = self.filter.criteria() else {
            return true;
        };
        criteria.matches(&self.subject(tree, candidate, ctx), ctx.today)
    }

    fn subjects(&self, tree: &ContentTree) -> Vec<FilterSubject> {
        let ctx = self.extract_context();
        self.discovery
            .discover_all(tree)
            .iter()
            .map(|candidate| self.subject(tree, candidate, &ctx))
            .collect()
    }

    fn subject(&self, tree: &ContentTree, candidate: &Candidate, ctx: &ExtractContext) -> FilterSubject {
        FilterSubject {
            node: candidate.node,
            fingerprint: candidate.fingerprint.clone(),
            metadata: extract::extract(tree, candidate.node, ctx),
            media_kinds: self
                .discovery
                .media_of(tree, candidate)
                .iter()
                .map(|item| item.kind)
                .collect(),
        }
    }
}
