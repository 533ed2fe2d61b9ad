use serde::{Deserialize, Serialize};

/// Duration payload as the backend reports it, e.g. `{"minutes": 90}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DurationHint {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minutes: Option<i64>,
}

/// A bounded-or-open span of elapsed time within which task effort is
/// recorded. Timestamps stay in their wire form; `domain::window` parses
/// them when a concrete instant range is needed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkPeriod {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    #[serde(default)]
    pub break_time_total_minutes: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<DurationHint>,
}

impl WorkPeriod {
    pub fn is_ongoing(&self) -> bool {
        self.end.is_none()
    }
}

/// Task reference embedded in a remote slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TaskRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breadcrumbs: Option<String>,
}

/// A single remote record assigning a contiguous time range to one task.
/// Any field except `id` may arrive malformed or absent; consumers skip
/// slots they cannot interpret instead of failing the whole operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawSlot {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<TaskRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<DurationHint>,
}

impl RawSlot {
    pub fn task_id(&self) -> Option<&str> {
        self.task
            .as_ref()
            .and_then(|task| task.id.as_deref())
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

/// The user-facing aggregate of "how long was spent on task X", independent
/// of how many raw slots compose it. Rebuilt from remote state on every
/// read; never persisted by the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskDuration {
    pub task_id: String,
    pub task_name: String,
    #[serde(default)]
    pub task_breadcrumbs: String,
    pub duration_minutes: i64,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub source_slot_ids: Vec<String>,
}

impl TaskDuration {
    pub fn new(task_id: &str, task_name: &str, duration_minutes: i64, breadcrumbs: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            task_name: task_name.to_string(),
            task_breadcrumbs: breadcrumbs.to_string(),
            duration_minutes,
            deleted: false,
            source_slot_ids: Vec::new(),
        }
    }

    /// Flags this entry for removal on the next sync instead of dropping it
    /// from the in-memory list, so callers can still render it as pending.
    pub fn mark_for_deletion(&mut self) {
        self.deleted = true;
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.task_id.trim().is_empty() {
            return Err("task_duration.task_id must not be empty".to_string());
        }
        if self.duration_minutes < 0 {
            return Err("task_duration.duration_minutes must be >= 0".to_string());
        }
        Ok(())
    }
}

/// Planner output: one positioned slot per task. `end - start` always equals
/// `duration_minutes`; layout chooses position, never length.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeSlot {
    pub task_id: String,
    pub start: chrono::DateTime<chrono::Utc>,
    pub end: chrono::DateTime<chrono::Utc>,
    pub duration_minutes: i64,
}

/// Caller-facing allocation totals for one work period.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AllocationSummary {
    pub task_durations: Vec<TaskDuration>,
    pub window_minutes: i64,
    pub total_minutes: i64,
    pub net_minutes: i64,
    pub remaining_minutes: i64,
    pub fully_allocated: bool,
    pub over_allocated: bool,
}
