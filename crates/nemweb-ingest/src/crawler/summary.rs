use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use super::definition::SelectionMode;

/// Phases of one crawler run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    ListingFetched,
    EntriesSelected,
    Processing,
    Completed,
    PartiallyFailed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::PartiallyFailed)
    }
}

/// Result of processing one listed file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EntryOutcome {
    Processed {
        url: String,
        /// History interval recorded, if the filename carried one
        interval: Option<NaiveDateTime>,
        records: usize,
        inserted: u64,
    },
    Failed {
        url: String,
        error: String,
    },
}

impl EntryOutcome {
    pub fn url(&self) -> &str {
        match self {
            EntryOutcome::Processed { url, .. } | EntryOutcome::Failed { url, .. } => url,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, EntryOutcome::Failed { .. })
    }
}

/// What a run did, reported to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub crawler: String,
    pub mode: SelectionMode,
    pub state: RunState,
    /// Entries on the listing after filtering
    pub listed: usize,
    /// Entries selected for processing
    pub candidates: usize,
    pub processed: usize,
    /// Rows written to the sink
    pub inserted: u64,
    pub errors: usize,
    /// Selected entries never submitted because the run was cancelled
    pub cancelled: usize,
    /// Stored watermark after the run
    pub watermark: Option<NaiveDateTime>,
    pub server_latest: Option<NaiveDateTime>,
    pub duration: Duration,
    pub outcomes: Vec<EntryOutcome>,
}

impl RunSummary {
    pub(crate) fn new(run_id: Uuid, crawler: &str, mode: SelectionMode) -> Self {
        Self {
            run_id,
            crawler: crawler.to_string(),
            mode,
            state: RunState::Idle,
            listed: 0,
            candidates: 0,
            processed: 0,
            inserted: 0,
            errors: 0,
            cancelled: 0,
            watermark: None,
            server_latest: None,
            duration: Duration::ZERO,
            outcomes: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == RunState::Completed
    }

    pub fn failures(&self) -> impl Iterator<Item = &EntryOutcome> {
        self.outcomes.iter().filter(|o| o.is_failed())
    }
}
