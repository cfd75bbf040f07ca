//! Progress bar for download runs.

use std::time::Duration;

use ads_downloader_core::download::{BatchObserver, CandidateReport, ItemOutcome, ItemReport};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;

/// Advances a bar per finished item and logs failures.
pub(crate) struct ProgressObserver {
    bar: ProgressBar,
}

impl ProgressObserver {
    /// A visible bar over `total` items, or a hidden one when `quiet`.
    pub(crate) fn new(total: usize, quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(total as u64)
        };
        bar.set_style(
            ProgressStyle::with_template("{spinner} [{pos}/{len}] {wide_msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    pub(crate) fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl BatchObserver for ProgressObserver {
    fn item_finished(&mut self, report: &ItemReport) {
        self.bar.inc(1);
        match &report.outcome {
            ItemOutcome::Completed { via_fallback, .. } => {
                let suffix = if *via_fallback { " (direct link)" } else { "" };
                self.bar.set_message(format!("{}{suffix}", report.filename));
            }
            ItemOutcome::Failed { error } => {
                self.bar.suspend(|| {
                    warn!(url = %report.url, filename = %report.filename, %error, "item failed");
                });
            }
        }
    }

    fn candidate_finished(&mut self, report: &CandidateReport) {
        if report.items().is_empty() {
            self.bar.set_message(format!("{}: nothing to download", report.brand));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ads_downloader_core::Fingerprint;
    use ads_downloader_core::download::{CandidateOutcome, TransferId};

    #[test]
    fn test_hidden_bar_counts_items() {
        let mut observer = ProgressObserver::new(2, true);
        let item = ItemReport {
            url: "https://cdn.example/a.mp4".to_string(),
            filename: "acme_2024-06-15_video.mp4".to_string(),
            outcome: ItemOutcome::Completed {
                transfer_id: TransferId(0),
                path: None,
                via_fallback: false,
            },
        };
        observer.item_finished(&item);
        observer.candidate_finished(&CandidateReport {
            fingerprint: Fingerprint::new("fp"),
            brand: "Acme".to_string(),
            outcome: CandidateOutcome::Skipped {
                reason: "no media found".to_string(),
            },
        });
        assert_eq!(observer.bar.position(), 1);
        observer.finish();
    }
}
