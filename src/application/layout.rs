use crate::domain::models::{TaskDuration, TimeSlot};
use crate::domain::window::TimeWindow;
use chrono::Duration;

/// Deterministic slot layout for a set of desired task durations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotPlan {
    pub slots: Vec<TimeSlot>,
    /// Tasks whose slot ends past the window end. The planner never
    /// truncates a requested duration; surfacing the overflow to a human is
    /// the caller's job.
    pub overflowing: Vec<String>,
}

/// Packs tasks back-to-back from the window start.
///
/// Deleted and zero-duration tasks are filtered out, the rest are sorted by
/// `(task_name, task_id)` descending in byte order. The fixed sort is what
/// makes repeated planning runs over an unchanged set byte-identical, which
/// in turn lets reconciliation detect "no change needed". A slot may never
/// start at or after the window end (it is clamped to end minus one
/// minute), but it may end past it.
pub fn plan_slots(window: &TimeWindow, tasks: &[TaskDuration]) -> SlotPlan {
    let mut sorted: Vec<&TaskDuration> = tasks
        .iter()
        .filter(|task| !task.deleted && task.duration_minutes > 0)
        .collect();
    sorted.sort_by(|a, b| {
        (b.task_name.as_str(), b.task_id.as_str()).cmp(&(a.task_name.as_str(), a.task_id.as_str()))
    });

    let max_start = window.end - Duration::minutes(1);
    let mut cursor = window.start;
    let mut slots = Vec::with_capacity(sorted.len());
    let mut overflowing = Vec::new();

    for task in sorted {
        let start = cursor.min(max_start);
        let end = start + Duration::minutes(task.duration_minutes);

        if end > window.end {
            log::warn!(
                "task {} extends beyond window end ({} > {}), slots will overlap the boundary",
                task.task_id,
                end,
                window.end
            );
            overflowing.push(task.task_id.clone());
        }

        slots.push(TimeSlot {
            task_id: task.task_id.clone(),
            start,
            end,
            duration_minutes: task.duration_minutes,
        });
        cursor = end;
    }

    SlotPlan { slots, overflowing }
}
