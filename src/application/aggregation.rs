use crate::domain::models::{RawSlot, TaskDuration};
use crate::domain::window::parse_instant;
use std::collections::HashMap;

/// Collapses raw remote slots into one duration-bearing entry per task.
///
/// Slots without a resolvable task id are skipped; malformed remote data is
/// tolerated, not fatal. Per slot the backend-supplied duration wins,
/// otherwise the duration is `end - start` in whole minutes; slots whose
/// timestamps cannot be parsed are skipped individually. Tasks that sum to
/// zero minutes are dropped entirely, they carry no information and would
/// falsely appear allocated.
pub fn aggregate_slots(slots: &[RawSlot]) -> Vec<TaskDuration> {
    let mut order: Vec<String> = Vec::new();
    let mut by_task: HashMap<String, TaskDuration> = HashMap::new();

    for slot in slots {
        let Some(task_id) = slot.task_id() else {
            log::warn!("slot {} has no task id, skipping", slot.id);
            continue;
        };

        let entry = by_task.entry(task_id.to_string()).or_insert_with(|| {
            order.push(task_id.to_string());
            let task = slot.task.as_ref();
            TaskDuration::new(
                task_id,
                task.and_then(|t| t.name.as_deref()).unwrap_or(""),
                0,
                task.and_then(|t| t.breadcrumbs.as_deref()).unwrap_or(""),
            )
        });

        let Some(minutes) = slot_minutes(slot) else {
            log::warn!(
                "slot {} for task {task_id} has no usable duration, skipping",
                slot.id
            );
            continue;
        };

        entry.duration_minutes += minutes;
        entry.source_slot_ids.push(slot.id.clone());
    }

    order
        .into_iter()
        .filter_map(|task_id| by_task.remove(&task_id))
        .filter(|task| task.duration_minutes > 0)
        .collect()
}

fn slot_minutes(slot: &RawSlot) -> Option<i64> {
    if let Some(minutes) = slot.duration.as_ref().and_then(|hint| hint.minutes) {
        return Some(minutes);
    }
    let start = parse_instant(slot.start.as_deref()?)?;
    let end = parse_instant(slot.end.as_deref()?)?;
    Some((end - start).num_minutes())
}
