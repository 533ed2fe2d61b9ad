//! Task-time consolidation engine.
//!
//! Bridges two models of a working day: the user-facing "N minutes on task
//! T" view and a remote backend that stores absolutely-timed slots. The
//! engine aggregates remote slots into per-task durations, plans a
//! deterministic slot layout for a desired duration set, and converges the
//! backend onto that layout with a differential update, so an unchanged
//! allocation costs zero write calls.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::aggregation::aggregate_slots;
pub use application::allocation::{sanitize_periods, ReconcileStats, TimeAllocationService};
pub use application::layout::{plan_slots, SlotPlan};
pub use domain::models::{
    AllocationSummary, DurationHint, RawSlot, TaskDuration, TaskRef, TimeSlot, WorkPeriod,
};
pub use domain::window::{parse_instant, resolve_window, TimeWindow};
pub use infrastructure::config::{ensure_default_config, load_backend_config, BackendConfig};
pub use infrastructure::error::EngineError;
pub use infrastructure::logging::init_logging;
pub use infrastructure::slot_backend::{HttpSlotBackend, SlotBackend};
