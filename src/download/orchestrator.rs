//! Paced, partial-failure-tolerant download orchestration.
//!
//! A batch runs in two phases. [`prepare_jobs`] reads the tree synchronously
//! and produces owned [`DownloadJob`]s; [`Orchestrator::run`] then works
//! through them without touching the tree, so no tree borrow is held across
//! an await.
//!
//! Work is a sequential queue of transfer tasks, each carrying the delay to
//! wait before it is dispatched. A failed item gets exactly one direct-link
//! fallback attempt; a failure never aborts the rest of the queue.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ads_downloader_core::download::{HttpClient, HttpTransferService, Orchestrator, PacingPolicy};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let service = Arc::new(HttpTransferService::new(HttpClient::new()?, "downloads"));
//! let orchestrator = Orchestrator::new(service, PacingPolicy::default());
//! let report = orchestrator.run(Vec::new()).await;
//! assert_eq!(report.items_succeeded(), 0);
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::constants::{CANDIDATE_DELAY, ITEM_DELAY};
use super::filename;
use super::transfer::{TransferId, TransferReceipt, TransferRequest, TransferService};
use crate::discovery::{Candidate, DiscoveryEngine};
use crate::extract::{self, AdMetadata, ExtractContext, MediaDeduper, MediaItem};
use crate::identity::Fingerprint;
use crate::settings::{DownloadRecord, SettingsStore, save_json};
use crate::tree::ContentTree;

/// Delays inserted between dispatched transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingPolicy {
    /// Between items of the same candidate.
    pub item_delay: Duration,
    /// Between the last item of one candidate and the first of the next.
    pub candidate_delay: Duration,
}

impl Default for PacingPolicy {
    fn default() -> Self {
        Self {
            item_delay: ITEM_DELAY,
            candidate_delay: CANDIDATE_DELAY,
        }
    }
}

impl PacingPolicy {
    /// No delays; for tests and dry runs.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            item_delay: Duration::ZERO,
            candidate_delay: Duration::ZERO,
        }
    }
}

/// Everything needed to download one candidate, detached from the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    pub fingerprint: Fingerprint,
    pub metadata: AdMetadata,
    /// Media after batch-wide dedup, in extraction order.
    pub media: Vec<MediaItem>,
    /// Media found before batch-wide dedup.
    pub extracted: usize,
}

/// Builds jobs for `candidates`, deduplicating media across the batch by
/// query-stripped URL. The first occurrence keeps its full URL.
#[must_use]
pub fn prepare_jobs(
    tree: &ContentTree,
    candidates: &[Candidate],
    discovery: &DiscoveryEngine,
    ctx: &ExtractContext,
) -> Vec<DownloadJob> {
    let mut deduper = MediaDeduper::default();
    candidates
        .iter()
        .map(|candidate| {
            let found = discovery.media_of(tree, candidate);
            let extracted = found.len();
            let media = found
                .into_iter()
                .filter(|item| deduper.insert(item))
                .collect();
            DownloadJob {
                fingerprint: candidate.fingerprint.clone(),
                metadata: extract::extract(tree, candidate.node, ctx),
                media,
                extracted,
            }
        })
        .collect()
}

/// Result of one media item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemOutcome {
    Completed {
        transfer_id: TransferId,
        path: Option<PathBuf>,
        /// Whether the direct-link fallback delivered it.
        via_fallback: bool,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemReport {
    pub url: String,
    pub filename: String,
    pub outcome: ItemOutcome,
}

impl ItemReport {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, ItemOutcome::Completed { .. })
    }
}

/// Result of one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CandidateOutcome {
    Processed { items: Vec<ItemReport> },
    /// No media to fetch; the batch moved on.
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateReport {
    pub fingerprint: Fingerprint,
    pub brand: String,
    pub outcome: CandidateOutcome,
}

impl CandidateReport {
    /// Items of this candidate, empty when skipped.
    #[must_use]
    pub fn items(&self) -> &[ItemReport] {
        match &self.outcome {
            CandidateOutcome::Processed { items } => items,
            CandidateOutcome::Skipped { .. } => &[],
        }
    }

    /// Whether at least one item of this candidate was confirmed.
    #[must_use]
    pub fn has_success(&self) -> bool {
        self.items().iter().any(ItemReport::succeeded)
    }
}

/// Best-effort report of a whole batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub candidates: Vec<CandidateReport>,
}

impl BatchReport {
    #[must_use]
    pub fn items_succeeded(&self) -> usize {
        self.items().filter(|item| item.succeeded()).count()
    }

    #[must_use]
    pub fn items_failed(&self) -> usize {
        self.items().filter(|item| !item.succeeded()).count()
    }

    #[must_use]
    pub fn candidates_skipped(&self) -> usize {
        self.candidates
            .iter()
            .filter(|c| matches!(c.outcome, CandidateOutcome::Skipped { .. }))
            .count()
    }

    /// Candidates with at least one confirmed item.
    #[must_use]
    pub fn candidates_completed(&self) -> usize {
        self.candidates.iter().filter(|c| c.has_success()).count()
    }

    fn items(&self) -> impl Iterator<Item = &ItemReport> {
        self.candidates.iter().flat_map(CandidateReport::items)
    }

    /// One-line summary for notices.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} downloaded, {} failed, {} skipped",
            self.items_succeeded(),
            self.items_failed(),
            self.candidates_skipped()
        )
    }
}

/// Receives progress as the queue drains.
pub trait BatchObserver: Send {
    fn item_finished(&mut self, _report: &ItemReport) {}

    fn candidate_finished(&mut self, _report: &CandidateReport) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl BatchObserver for NoopObserver {}

/// Lifetime counters of an orchestrator.
///
/// Atomics so a shared orchestrator can be inspected while a batch runs.
#[derive(Debug, Default)]
pub struct DownloadStats {
    completed: AtomicUsize,
    failed: AtomicUsize,
    fallbacks: AtomicUsize,
}

impl DownloadStats {
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Number of direct-link fallback attempts made.
    #[must_use]
    pub fn fallbacks(&self) -> usize {
        self.fallbacks.load(Ordering::SeqCst)
    }

    fn increment_completed(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_fallbacks(&self) {
        self.fallbacks.fetch_add(1, Ordering::SeqCst);
    }
}

/// One queued transfer.
#[derive(Debug)]
struct TransferTask {
    job: usize,
    /// Position among the job's media; drives the filename index suffix.
    item: usize,
    delay_before: Duration,
}

/// Sequences transfers for a batch of jobs.
pub struct Orchestrator {
    service: Arc<dyn TransferService>,
    pacing: PacingPolicy,
    records: Option<Arc<dyn SettingsStore>>,
    stats: DownloadStats,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("pacing", &self.pacing)
            .field("records", &self.records.is_some())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    #[must_use]
    pub fn new(service: Arc<dyn TransferService>, pacing: PacingPolicy) -> Self {
        Self {
            service,
            pacing,
            records: None,
            stats: DownloadStats::default(),
        }
    }

    /// Persists a [`DownloadRecord`] into `store` after each confirmed
    /// transfer.
    #[must_use]
    pub fn with_record_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.records = Some(store);
        self
    }

    #[must_use]
    pub fn stats(&self) -> &DownloadStats {
        &self.stats
    }

    #[must_use]
    pub fn pacing(&self) -> PacingPolicy {
        self.pacing
    }

    /// Runs a batch without progress reporting.
    pub async fn run(&self, jobs: Vec<DownloadJob>) -> BatchReport {
        self.run_with_observer(jobs, &mut NoopObserver).await
    }

    /// Runs a batch, reporting each finished item and candidate.
    ///
    /// Dispatch order is job order, then media order. Never fails: every
    /// error ends up in the report.
    #[instrument(skip_all, fields(jobs = jobs.len()))]
    pub async fn run_with_observer(
        &self,
        jobs: Vec<DownloadJob>,
        observer: &mut dyn BatchObserver,
    ) -> BatchReport {
        let mut queue = self.build_queue(&jobs);
        let mut items: Vec<Vec<ItemReport>> = vec![Vec::new(); jobs.len()];
        let mut report = BatchReport::default();
        let mut next_to_close = 0;

        while let Some(task) = queue.pop_front() {
            // Skipped jobs carry no tasks; close everything before this one.
            next_to_close =
                self.close_jobs(&jobs, &mut items, next_to_close, task.job, &mut report, observer);

            if !task.delay_before.is_zero() {
                tokio::time::sleep(task.delay_before).await;
            }
            let job = &jobs[task.job];
            let item = &job.media[task.item];
            let item_report = self.dispatch(job, item, task.item).await;
            observer.item_finished(&item_report);
            items[task.job].push(item_report);
        }
        self.close_jobs(&jobs, &mut items, next_to_close, jobs.len(), &mut report, observer);

        info!(
            succeeded = report.items_succeeded(),
            failed = report.items_failed(),
            skipped = report.candidates_skipped(),
            "batch finished"
        );
        report
    }

    fn build_queue(&self, jobs: &[DownloadJob]) -> VecDeque<TransferTask> {
        let mut queue = VecDeque::new();
        for (job_index, job) in jobs.iter().enumerate() {
            for item_index in 0..job.media.len() {
                let delay_before = match (queue.is_empty(), item_index) {
                    (true, _) => Duration::ZERO,
                    (false, 0) => self.pacing.candidate_delay,
                    (false, _) => self.pacing.item_delay,
                };
                queue.push_back(TransferTask {
                    job: job_index,
                    item: item_index,
                    delay_before,
                });
            }
        }
        queue
    }

    /// Finalizes reports for jobs `from..until`. Returns `until`.
    fn close_jobs(
        &self,
        jobs: &[DownloadJob],
        items: &mut [Vec<ItemReport>],
        from: usize,
        until: usize,
        report: &mut BatchReport,
        observer: &mut dyn BatchObserver,
    ) -> usize {
        for index in from..until {
            let job = &jobs[index];
            let outcome = if job.media.is_empty() {
                let reason = if job.extracted == 0 {
                    "no media found".to_string()
                } else {
                    "all media already queued by an earlier candidate".to_string()
                };
                debug!(fingerprint = %job.fingerprint, %reason, "candidate skipped");
                CandidateOutcome::Skipped { reason }
            } else {
                CandidateOutcome::Processed {
                    items: std::mem::take(&mut items[index]),
                }
            };
            let candidate = CandidateReport {
                fingerprint: job.fingerprint.clone(),
                brand: job.metadata.brand.clone(),
                outcome,
            };
            observer.candidate_finished(&candidate);
            report.candidates.push(candidate);
        }
        until.max(from)
    }

    async fn dispatch(&self, job: &DownloadJob, item: &MediaItem, index: usize) -> ItemReport {
        let filename = filename::synthesize(item, &job.metadata, index);
        let request = TransferRequest::new(&item.url, &filename);

        let outcome = match self.service.transfer(&request).await {
            Ok(receipt) => self.confirm(job, &request, receipt, false).await,
            Err(error) => {
                warn!(url = %request.url, %error, "transfer failed, trying direct link");
                self.stats.increment_fallbacks();
                match self.service.open_direct(&request).await {
                    Ok(receipt) => self.confirm(job, &request, receipt, true).await,
                    Err(fallback_error) => {
                        warn!(url = %request.url, error = %fallback_error, "direct link failed");
                        self.stats.increment_failed();
                        ItemOutcome::Failed {
                            error: fallback_error.to_string(),
                        }
                    }
                }
            }
        };
        ItemReport {
            url: item.url.clone(),
            filename,
            outcome,
        }
    }

    async fn confirm(
        &self,
        job: &DownloadJob,
        request: &TransferRequest,
        receipt: TransferReceipt,
        via_fallback: bool,
    ) -> ItemOutcome {
        self.stats.increment_completed();
        if let Some(store) = &self.records {
            let record = DownloadRecord {
                ad_id: job.fingerprint.clone(),
                original_url: request.url.clone(),
                download_time: Utc::now(),
                filename: request.filename.clone(),
                transfer_id: receipt.id,
            };
            if let Err(error) = save_json(store.as_ref(), &record.key(), &record).await {
                warn!(%error, key = %record.key(), "failed to persist download record");
            }
        }
        ItemOutcome::Completed {
            transfer_id: receipt.id,
            path: receipt.path,
            via_fallback,
        }
    }
}
