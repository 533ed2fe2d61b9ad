use crate::application::aggregation::aggregate_slots;
use crate::application::layout::plan_slots;
use crate::domain::models::{AllocationSummary, RawSlot, TaskDuration, TimeSlot, WorkPeriod};
use crate::domain::window::{parse_instant, resolve_window, TimeWindow};
use crate::infrastructure::error::EngineError;
use crate::infrastructure::slot_backend::SlotBackend;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Slot boundaries within this distance of the desired position are left
/// alone; serialization rounding must not cause write traffic.
const UPDATE_TOLERANCE_MS: i64 = 1_000;

/// Allocation totals within this many minutes of the net window count as
/// fully allocated.
const ALLOCATION_TOLERANCE_MINUTES: f64 = 0.5;

/// Replacement length for remote slots whose start lies after their end.
const INVERTED_SLOT_FALLBACK_MINUTES: i64 = 15;

/// Mutation counts of one reconciliation run. A converged state reports
/// all zeroes, which is what the idempotence guarantee is measured by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl ReconcileStats {
    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.updated == 0 && self.deleted == 0
    }
}

/// Bridges the remote slot-based store and the user-facing task-duration
/// model: aggregates existing slots per task, plans a deterministic slot
/// layout for a desired duration set, and converges remote state onto it
/// with the minimal number of backend calls.
///
/// The service is stateless between calls; the remote store is the sole
/// source of truth and every operation re-fetches it. Callers must not run
/// two reconciliations for the same work period concurrently, there is no
/// optimistic-concurrency protection against the store changing between
/// the fetch and mutate steps.
pub struct TimeAllocationService<B: SlotBackend> {
    backend: Arc<B>,
    now_provider: NowProvider,
}

impl<B: SlotBackend> TimeAllocationService<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    fn resolve(&self, period: &WorkPeriod) -> Result<TimeWindow, EngineError> {
        resolve_window(period, (self.now_provider)())
    }

    /// Fetches and aggregates the period's remote slots into the
    /// caller-facing summary.
    pub async fn summarize(&self, period: &WorkPeriod) -> Result<AllocationSummary, EngineError> {
        let window = self.resolve(period)?;
        let slots = self.backend.fetch_slots_in_window(&window).await?;
        let task_durations = aggregate_slots(&slots);
        Ok(build_summary(
            &window,
            period.break_time_total_minutes,
            task_durations,
        ))
    }

    pub async fn get_task_durations(
        &self,
        period: &WorkPeriod,
    ) -> Result<Vec<TaskDuration>, EngineError> {
        Ok(self.summarize(period).await?.task_durations)
    }

    /// Adds minutes to a task. Additive when the task is already present in
    /// the period; the name (and a non-empty breadcrumb path) are refreshed
    /// from the arguments either way.
    pub async fn add_task_duration(
        &self,
        period: &WorkPeriod,
        task_id: &str,
        task_name: &str,
        minutes: i64,
        breadcrumbs: &str,
    ) -> Result<AllocationSummary, EngineError> {
        let mut tasks = self.get_task_durations(period).await?;

        match tasks.iter_mut().find(|task| task.task_id == task_id) {
            Some(existing) => {
                log::info!(
                    "adding {minutes}m to task {task_id} ({}m before)",
                    existing.duration_minutes
                );
                existing.duration_minutes += minutes;
                existing.task_name = task_name.to_string();
                if !breadcrumbs.is_empty() {
                    existing.task_breadcrumbs = breadcrumbs.to_string();
                }
            }
            None => {
                log::info!("adding new task {task_id} with {minutes}m");
                tasks.push(TaskDuration::new(task_id, task_name, minutes, breadcrumbs));
            }
        }

        self.reconcile(period, period, &tasks).await?;
        self.summarize(period).await
    }

    /// Replaces a task's duration. Unlike `add_task_duration` this does not
    /// sum, and the task must already exist in the period.
    pub async fn update_task_duration(
        &self,
        period: &WorkPeriod,
        task_id: &str,
        minutes: i64,
        task_name: Option<&str>,
    ) -> Result<AllocationSummary, EngineError> {
        let mut tasks = self.get_task_durations(period).await?;

        let task = tasks
            .iter_mut()
            .find(|task| task.task_id == task_id)
            .ok_or_else(|| EngineError::UnknownTask(task_id.to_string()))?;
        log::info!(
            "updating task {task_id}: {}m -> {minutes}m",
            task.duration_minutes
        );
        task.duration_minutes = minutes;
        if let Some(name) = task_name {
            task.task_name = name.to_string();
        }

        self.reconcile(period, period, &tasks).await?;
        self.summarize(period).await
    }

    /// Removes a task's time from the period. A no-op summary when the task
    /// is not present.
    pub async fn delete_task_duration(
        &self,
        period: &WorkPeriod,
        task_id: &str,
    ) -> Result<AllocationSummary, EngineError> {
        let tasks = self.get_task_durations(period).await?;

        if tasks.iter().any(|task| task.task_id == task_id) {
            let remaining: Vec<TaskDuration> = tasks
                .into_iter()
                .filter(|task| task.task_id != task_id)
                .collect();
            log::info!("deleting task {task_id} from period {}", period.id);
            self.reconcile(period, period, &remaining).await?;
        }

        self.summarize(period).await
    }

    /// Replaces the period's whole allocation with the given task set.
    pub async fn replace_task_durations(
        &self,
        period: &WorkPeriod,
        tasks: &[TaskDuration],
    ) -> Result<AllocationSummary, EngineError> {
        self.reconcile(period, period, tasks).await?;
        self.summarize(period).await
    }

    /// Converges remote slot state onto the desired task set with the
    /// minimal set of create/update/delete calls.
    ///
    /// `source` and `target` are normally the same period. They differ when
    /// the period's own boundaries were just edited: existing slots are
    /// then re-read under the old boundaries (`source`) and laid out
    /// against the new ones (`target`), so already-allocated time survives
    /// the move.
    ///
    /// Mutations run sequentially against a single fetched snapshot. A
    /// failed call halts the run with prior mutations left in place; the
    /// algorithm converges the remainder on the next invocation.
    pub async fn reconcile(
        &self,
        source: &WorkPeriod,
        target: &WorkPeriod,
        desired_tasks: &[TaskDuration],
    ) -> Result<ReconcileStats, EngineError> {
        let source_window = self.resolve(source)?;
        let target_window = self.resolve(target)?;
        if source.id != target.id || source_window != target_window {
            log::info!(
                "re-reading slots under old boundaries {} .. {} before syncing against {} .. {}",
                source_window.start,
                source_window.end,
                target_window.start,
                target_window.end
            );
        }

        let fetched = self.backend.fetch_slots_in_window(&source_window).await?;

        // One slot per task. Later duplicates are remote noise from earlier
        // partial writes; their time is discarded, not merged.
        let mut current: Vec<RawSlot> = Vec::with_capacity(fetched.len());
        let mut duplicates: Vec<RawSlot> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for slot in fetched {
            let Some(task_id) = slot.task_id().map(ToOwned::to_owned) else {
                continue;
            };
            if seen.insert(task_id) {
                current.push(slot);
            } else {
                duplicates.push(slot);
            }
        }

        let plan = plan_slots(&target_window, desired_tasks);

        let mut stats = ReconcileStats::default();
        for duplicate in duplicates {
            log::info!(
                "deleting duplicate slot {} for task {:?}",
                duplicate.id,
                duplicate.task_id()
            );
            self.backend.delete_slot(&duplicate.id).await?;
            stats.deleted += 1;
        }

        let current_by_task: HashMap<&str, &RawSlot> = current
            .iter()
            .filter_map(|slot| slot.task_id().map(|task_id| (task_id, slot)))
            .collect();
        let desired_by_task: HashSet<&str> =
            plan.slots.iter().map(|slot| slot.task_id.as_str()).collect();

        // Stale tasks first, in fetch order.
        for slot in &current {
            let Some(task_id) = slot.task_id() else {
                continue;
            };
            if !desired_by_task.contains(task_id) {
                log::info!("deleting slot {} for removed task {task_id}", slot.id);
                self.backend.delete_slot(&slot.id).await?;
                stats.deleted += 1;
            }
        }

        // Then creates and updates, in planned (deterministic) order.
        for desired in &plan.slots {
            match current_by_task.get(desired.task_id.as_str()) {
                Some(existing) => {
                    if slot_needs_update(existing, desired) {
                        log::info!(
                            "moving slot {} for task {} to {} .. {}",
                            existing.id,
                            desired.task_id,
                            desired.start,
                            desired.end
                        );
                        self.backend
                            .update_slot(&existing.id, Some(desired.start), Some(desired.end))
                            .await?;
                        stats.updated += 1;
                    }
                }
                None => {
                    log::info!(
                        "creating slot for task {} at {} .. {}",
                        desired.task_id,
                        desired.start,
                        desired.end
                    );
                    self.backend
                        .create_slot(&desired.task_id, desired.start, desired.end)
                        .await?;
                    stats.created += 1;
                }
            }
        }

        log::info!(
            "differential update completed: {} created, {} updated, {} deleted",
            stats.created,
            stats.updated,
            stats.deleted
        );
        Ok(stats)
    }

    /// Repairs remote slots that escape their window: starts before the
    /// window start are clamped to it (this one intentionally shrinks the
    /// duration), inverted ranges get a fixed fallback length. Slots ending
    /// after the window end are left alone, durations are preserved on that
    /// side. A backend failure on one slot skips it and continues the pass.
    pub async fn sanitize_slots(&self, period: &WorkPeriod) -> Result<Vec<RawSlot>, EngineError> {
        let window = self.resolve(period)?;
        let slots = self.backend.fetch_slots_in_window(&window).await?;

        let mut result = Vec::with_capacity(slots.len());
        for slot in slots {
            let parsed = slot
                .start
                .as_deref()
                .and_then(parse_instant)
                .zip(slot.end.as_deref().and_then(parse_instant));
            let Some((mut start, mut end)) = parsed else {
                continue;
            };

            let mut needs_adjustment = false;
            if start < window.start {
                log::info!(
                    "slot {} starts before its window, clamping to {}",
                    slot.id,
                    window.start
                );
                start = window.start;
                needs_adjustment = true;
            }
            if start > end {
                log::warn!(
                    "slot {} has start after end, forcing a {INVERTED_SLOT_FALLBACK_MINUTES} minute duration",
                    slot.id
                );
                end = start + Duration::minutes(INVERTED_SLOT_FALLBACK_MINUTES);
                needs_adjustment = true;
            }

            if needs_adjustment {
                match self
                    .backend
                    .update_slot(&slot.id, Some(start), Some(end))
                    .await
                {
                    Ok(updated) => result.push(updated),
                    Err(error) => {
                        log::error!("failed repairing slot {}: {error}", slot.id);
                    }
                }
            } else {
                result.push(slot);
            }
        }
        Ok(result)
    }
}

/// Repairs overlapping work periods by truncating the earlier period's end
/// to the next period's start. Pure list pass, no backend calls; periods
/// whose timestamps cannot be parsed are passed through unchanged.
pub fn sanitize_periods(periods: Vec<WorkPeriod>) -> Vec<WorkPeriod> {
    if periods.is_empty() {
        return Vec::new();
    }

    let mut sorted = periods;
    sorted.sort_by(|a, b| {
        a.start
            .as_deref()
            .unwrap_or("")
            .cmp(b.start.as_deref().unwrap_or(""))
    });

    let mut sanitized: Vec<WorkPeriod> = Vec::with_capacity(sorted.len());
    for current in sorted {
        if let Some(previous) = sanitized.last_mut() {
            let boundaries = previous
                .end
                .as_deref()
                .and_then(parse_instant)
                .zip(current.start.as_deref().and_then(parse_instant));
            if let Some((previous_end, current_start)) = boundaries {
                if current_start < previous_end {
                    log::warn!(
                        "work periods {} and {} overlap, truncating the earlier one",
                        previous.id,
                        current.id
                    );
                    previous.end = current.start.clone();
                }
            }
        }
        sanitized.push(current);
    }
    sanitized
}

fn build_summary(
    window: &TimeWindow,
    break_minutes: i64,
    task_durations: Vec<TaskDuration>,
) -> AllocationSummary {
    let window_minutes = window.minutes();
    let net_minutes = window_minutes - break_minutes;
    let total_minutes: i64 = task_durations
        .iter()
        .map(|task| task.duration_minutes)
        .sum();
    let remaining_minutes = net_minutes - total_minutes;

    let over_allocated =
        total_minutes as f64 > net_minutes as f64 + ALLOCATION_TOLERANCE_MINUTES;
    let fully_allocated = (net_minutes - total_minutes).abs() as f64
        <= ALLOCATION_TOLERANCE_MINUTES
        && !over_allocated;

    AllocationSummary {
        task_durations,
        window_minutes,
        total_minutes,
        net_minutes,
        remaining_minutes,
        fully_allocated,
        over_allocated,
    }
}

/// A slot is rewritten only when either boundary strays more than the
/// tolerance from its planned position. Unparsable current boundaries
/// always trigger a rewrite.
fn slot_needs_update(current: &RawSlot, desired: &TimeSlot) -> bool {
    let parsed = current
        .start
        .as_deref()
        .and_then(parse_instant)
        .zip(current.end.as_deref().and_then(parse_instant));
    let Some((current_start, current_end)) = parsed else {
        return true;
    };

    let start_diff = (current_start - desired.start).num_milliseconds().abs();
    let end_diff = (current_end - desired.end).num_milliseconds().abs();
    start_diff > UPDATE_TOLERANCE_MS || end_diff > UPDATE_TOLERANCE_MS
}
