//! Batch records tracked by the registry.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Number of pipeline stages every batch goes through.
pub const STEP_COUNT: u8 = 8;

/// Lifecycle status of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    #[default]
    Active,
    Completed,
    Archived,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Archived => "archived",
        }
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Filter for listing batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    /// Active batches only.
    #[default]
    Active,
    /// Archived batches only.
    Archived,
    /// Everything, including completed batches.
    All,
}

impl StatusFilter {
    pub fn matches(&self, status: BatchStatus) -> bool {
        match self {
            Self::Active => status == BatchStatus::Active,
            Self::Archived => status == BatchStatus::Archived,
            Self::All => true,
        }
    }
}

/// Completion state of one step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepStatus {
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Local>>,
}

/// One unit of work: a metadata table plus its images, tracked through
/// all pipeline stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    /// Unique identifier (UUID v4).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Batch root directory.
    pub root: PathBuf,
    pub status: BatchStatus,
    pub created_at: DateTime<Local>,
    pub last_accessed: DateTime<Local>,
    /// Step number (1-based) -> completion state.
    #[serde(default)]
    pub steps: BTreeMap<u8, StepStatus>,
}

impl Batch {
    /// Create a new active batch with every step pending.
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        let now = Local::now();
        let steps = (1..=STEP_COUNT).map(|n| (n, StepStatus::default())).collect();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            root: root.into(),
            status: BatchStatus::Active,
            created_at: now,
            last_accessed: now,
            steps,
        }
    }

    /// Whether the given step has completed.
    pub fn is_step_complete(&self, step: u8) -> bool {
        self.steps.get(&step).map(|s| s.completed).unwrap_or(false)
    }

    /// Record a step's completion state.
    pub fn set_step(&mut self, step: u8, completed: bool) {
        let entry = self.steps.entry(step).or_default();
        entry.completed = completed;
        entry.completed_at = completed.then(Local::now);
    }

    /// First step whose completion flag is false.
    pub fn next_pending_step(&self) -> Option<u8> {
        (1..=STEP_COUNT).find(|n| !self.is_step_complete(*n))
    }

    /// Whether every step has completed.
    pub fn all_steps_complete(&self) -> bool {
        self.next_pending_step().is_none()
    }

    /// Number of completed steps.
    pub fn completed_count(&self) -> usize {
        (1..=STEP_COUNT).filter(|n| self.is_step_complete(*n)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_batch_has_all_steps_pending() {
        let batch = Batch::new("Spring accession", "/archive/spring");
        assert_eq!(batch.status, BatchStatus::Active);
        assert_eq!(batch.steps.len(), STEP_COUNT as usize);
        assert_eq!(batch.next_pending_step(), Some(1));
        assert!(!batch.all_steps_complete());
    }

    #[test]
    fn next_pending_skips_completed_prefix() {
        let mut batch = Batch::new("b", "/tmp/b");
        for n in 1..=3 {
            batch.set_step(n, true);
        }
        assert_eq!(batch.next_pending_step(), Some(4));
        assert_eq!(batch.completed_count(), 3);
        assert!(batch.steps[&2].completed_at.is_some());
    }

    #[test]
    fn uncompleting_clears_timestamp() {
        let mut batch = Batch::new("b", "/tmp/b");
        batch.set_step(5, true);
        batch.set_step(5, false);
        assert!(!batch.is_step_complete(5));
        assert!(batch.steps[&5].completed_at.is_none());
    }

    #[test]
    fn batch_serializes_round_trip() {
        let mut batch = Batch::new("b", "/tmp/b");
        batch.set_step(1, true);
        let json = serde_json::to_string(&batch).unwrap();
        assert!(json.contains("\"status\":\"active\""));
        let back: Batch = serde_json::from_str(&json).unwrap();
        assert_eq!(back, batch);
    }

    #[test]
    fn status_filter_matches() {
        assert!(StatusFilter::Active.matches(BatchStatus::Active));
        assert!(!StatusFilter::Active.matches(BatchStatus::Completed));
        assert!(StatusFilter::Archived.matches(BatchStatus::Archived));
        assert!(StatusFilter::All.matches(BatchStatus::Completed));
    }
}
