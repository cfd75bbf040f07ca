//! Filter overlay over discovered candidates.
//!
//! Filtering is a projection: it flips the overlay-hidden flag of candidate
//! regions and records which fingerprints matched. It never removes anything
//! from the discovered set, so clearing always restores every candidate.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::extract::{AdMetadata, AdStatus, MediaKind};
use crate::identity::Fingerprint;
use crate::tree::{ContentTree, NodeId};

/// Date window presets, resolved against "today".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatePreset {
    #[default]
    All,
    Today,
    /// The last 7 days.
    Week,
    /// One calendar month back.
    Month,
    #[serde(rename = "3months")]
    ThreeMonths,
    /// Uses the criteria's explicit start and end dates.
    Custom,
}

/// Inclusive date range; an open side is unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    /// Whether `date` falls within the range, end day included.
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.is_none_or(|start| date >= start) && self.end.is_none_or(|end| date <= end)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaFilter {
    #[default]
    All,
    Video,
    Image,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    Active,
    Inactive,
}

/// User-defined filter. The default value is neutral and matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterCriteria {
    pub date_filter: DatePreset,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub media_filter: MediaFilter,
    pub status_filter: StatusFilter,
    /// Case-insensitive substring of brand or account; empty disables it.
    pub brand_filter: String,
}

impl FilterCriteria {
    /// Effective date range, `None` when dates are not filtered.
    #[must_use]
    pub fn date_range(&self, today: NaiveDate) -> Option<DateRange> {
        let back = |start: Option<NaiveDate>| {
            Some(DateRange {
                start,
                end: Some(today),
            })
        };
        match self.date_filter {
            DatePreset::All => None,
            DatePreset::Today => back(Some(today)),
            DatePreset::Week => back(today.checked_sub_days(Days::new(7))),
            DatePreset::Month => back(today.checked_sub_months(Months::new(1))),
            DatePreset::ThreeMonths => back(today.checked_sub_months(Months::new(3))),
            DatePreset::Custom => Some(DateRange {
                start: self.start_date,
                end: self.end_date,
            }),
        }
    }

    /// Whether every field is neutral.
    #[must_use]
    pub fn is_neutral(&self) -> bool {
        self.date_filter == DatePreset::All
            && self.media_filter == MediaFilter::All
            && self.status_filter == StatusFilter::All
            && self.brand_filter.trim().is_empty()
    }

    /// Evaluates all clauses against one candidate.
    #[must_use]
    pub fn matches(&self, subject: &FilterSubject, today: NaiveDate) -> bool {
        let date_ok = self
            .date_range(today)
            .is_none_or(|range| range.contains(subject.metadata.date));
        let media_ok = match self.media_filter {
            MediaFilter::All => true,
            MediaFilter::Video => subject.media_kinds.contains(&MediaKind::Video),
            MediaFilter::Image => subject.media_kinds.contains(&MediaKind::Image),
        };
        let status_ok = match self.status_filter {
            StatusFilter::All => true,
            StatusFilter::Active => subject.metadata.status == AdStatus::Active,
            StatusFilter::Inactive => subject.metadata.status == AdStatus::Inactive,
        };
        let needle = self.brand_filter.trim().to_lowercase();
        let brand_ok = needle.is_empty()
            || subject.metadata.brand.to_lowercase().contains(&needle)
            || subject.metadata.account.to_lowercase().contains(&needle);

        date_ok && media_ok && status_ok && brand_ok
    }
}

/// Facts about one discovered candidate that the filter looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSubject {
    pub node: NodeId,
    pub fingerprint: Fingerprint,
    pub metadata: AdMetadata,
    pub media_kinds: BTreeSet<MediaKind>,
}

/// Result of applying or clearing a filter. Counts are per candidate, so
/// cards sharing a fingerprint each count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOutcome {
    pub matched_count: usize,
    pub total_count: usize,
}

/// Active criteria and the fingerprints they matched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    criteria: Option<FilterCriteria>,
    matched: BTreeSet<Fingerprint>,
}

impl FilterState {
    #[must_use]
    pub fn criteria(&self) -> Option<&FilterCriteria> {
        self.criteria.as_ref()
    }

    #[must_use]
    pub fn matched(&self) -> &BTreeSet<Fingerprint> {
        &self.matched
    }

    #[must_use]
    pub fn is_match(&self, fingerprint: &Fingerprint) -> bool {
        self.matched.contains(fingerprint)
    }

    /// Applies `criteria` to every subject and updates overlay visibility.
    #[instrument(skip_all)]
    pub fn apply(
        &mut self,
        tree: &mut ContentTree,
        subjects: &[FilterSubject],
        criteria: FilterCriteria,
        today: NaiveDate,
    ) -> FilterOutcome {
        self.matched.clear();
        let mut matched_count = 0;
        for subject in subjects {
            let keep = criteria.matches(subject, today);
            tree.set_overlay_hidden(subject.node, !keep);
            if keep {
                matched_count += 1;
                self.matched.insert(subject.fingerprint.clone());
            }
        }
        let outcome = FilterOutcome {
            matched_count,
            total_count: subjects.len(),
        };
        debug!(
            matched = outcome.matched_count,
            total = outcome.total_count,
            "filter applied"
        );
        self.criteria = (!criteria.is_neutral()).then_some(criteria);
        outcome
    }

    /// Resets to neutral criteria and shows every candidate.
    pub fn clear(&mut self, tree: &mut ContentTree, subjects: &[FilterSubject]) -> FilterOutcome {
        self.criteria = None;
        self.matched.clear();
        for subject in subjects {
            tree.set_overlay_hidden(subject.node, false);
            self.matched.insert(subject.fingerprint.clone());
        }
        FilterOutcome {
            matched_count: subjects.len(),
            total_count: subjects.len(),
        }
    }

    /// Drops criteria and matches without touching the tree.
    pub fn reset(&mut self) {
        self.criteria = None;
        self.matched.clear();
    }
}

/// Aggregates over all discovered candidates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterStats {
    pub total: usize,
    /// Candidates holding at least one item of each kind.
    pub by_media_kind: BTreeMap<MediaKind, usize>,
    pub by_status: BTreeMap<AdStatus, usize>,
    /// Distinct brand and account values.
    pub brands: BTreeSet<String>,
    pub min_date: Option<NaiveDate>,
    pub max_date: Option<NaiveDate>,
}

impl FilterStats {
    #[must_use]
    pub fn collect(subjects: &[FilterSubject]) -> Self {
        let mut stats = Self {
            total: subjects.len(),
            ..Self::default()
        };
        for subject in subjects {
            for kind in &subject.media_kinds {
                *stats.by_media_kind.entry(*kind).or_default() += 1;
            }
            *stats.by_status.entry(subject.metadata.status).or_default() += 1;
            stats.brands.insert(subject.metadata.brand.clone());
            stats.brands.insert(subject.metadata.account.clone());
            let date = subject.metadata.date;
            stats.min_date = Some(stats.min_date.map_or(date, |d| d.min(date)));
            stats.max_date = Some(stats.max_date.map_or(date, |d| d.max(date)));
        }
        stats
    }
}
