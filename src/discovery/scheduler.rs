//! Debounced rescan scheduling.
//!
//! Tree-change batches and viewport signals each keep their own trailing-edge
//! deadline. Every new signal pushes its deadline out again; a rescan is due
//! once either deadline passes.

use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

/// Quiet period after tree-change batches before rescanning.
pub const MUTATION_DEBOUNCE: Duration = Duration::from_millis(1000);
/// Quiet period after scroll or resize before rescanning.
pub const VIEWPORT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Signals delivered by the hosting environment.
#[derive(Debug, Clone, PartialEq)]
pub enum HostSignal {
    /// A batch of regions was added to or removed from the tree.
    TreeChanged { added: usize, removed: usize },
    Scrolled,
    Resized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceConfig {
    pub mutation: Duration,
    pub viewport: Duration,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            mutation: MUTATION_DEBOUNCE,
            viewport: VIEWPORT_DEBOUNCE,
        }
    }
}

/// Tracks pending rescan deadlines.
#[derive(Debug, Clone, Default)]
pub struct RescanScheduler {
    config: DebounceConfig,
    mutation_deadline: Option<Instant>,
    viewport_deadline: Option<Instant>,
}

impl RescanScheduler {
    #[must_use]
    pub fn new(config: DebounceConfig) -> Self {
        Self {
            config,
            mutation_deadline: None,
            viewport_deadline: None,
        }
    }

    /// Records a host signal received at `now`.
    pub fn notify(&mut self, signal: &HostSignal, now: Instant) {
        match signal {
            HostSignal::TreeChanged { added: 0, removed: 0 } => {}
            HostSignal::TreeChanged { .. } => {
                self.mutation_deadline = Some(now + self.config.mutation);
            }
            HostSignal::Scrolled | HostSignal::Resized => {
                self.viewport_deadline = Some(now + self.config.viewport);
            }
        }
        trace!(?signal, deadline = ?self.next_deadline(), "rescan scheduled");
    }

    /// Earliest pending deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.mutation_deadline, self.viewport_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.next_deadline().is_some()
    }

    /// Clears deadlines that have passed and reports whether a rescan is due.
    pub fn poll_due(&mut self, now: Instant) -> bool {
        let mut due = false;
        for deadline in [&mut self.mutation_deadline, &mut self.viewport_deadline] {
            if deadline.is_some_and(|d| d <= now) {
                *deadline = None;
                due = true;
            }
        }
        due
    }

    /// Drops every pending deadline.
    pub fn clear(&mut self) {
        self.mutation_deadline = None;
        self.viewport_deadline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_mutation_burst_debounces_to_one_rescan() {
        let mut scheduler = RescanScheduler::default();
        let changed = HostSignal::TreeChanged {
            added: 2,
            removed: 0,
        };

        scheduler.notify(&changed, Instant::now());
        tokio::time::advance(Duration::from_millis(600)).await;
        scheduler.notify(&changed, Instant::now());
        tokio::time::advance(Duration::from_millis(600)).await;

        // Second signal pushed the deadline out.
        assert!(!scheduler.poll_due(Instant::now()));
        tokio::time::advance(Duration::from_millis(400)).await;
        assert!(scheduler.poll_due(Instant::now()));
        assert!(!scheduler.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scroll_uses_shorter_window() {
        let mut scheduler = RescanScheduler::default();
        let start = Instant::now();
        scheduler.notify(&HostSignal::TreeChanged { added: 1, removed: 0 }, start);
        scheduler.notify(&HostSignal::Scrolled, start);

        assert_eq!(scheduler.next_deadline(), Some(start + VIEWPORT_DEBOUNCE));
        assert!(scheduler.poll_due(start + VIEWPORT_DEBOUNCE));
        assert_eq!(scheduler.next_deadline(), Some(start + MUTATION_DEBOUNCE));
    }

    #[test]
    fn test_empty_batch_is_ignored() {
        let mut scheduler = RescanScheduler::default();
        scheduler.notify(
            &HostSignal::TreeChanged {
                added: 0,
                removed: 0,
            },
            Instant::now(),
        );
        assert!(!scheduler.is_pending());
    }
}
