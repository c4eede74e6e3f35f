//! Workstream scheduling.
//!
//! Two cooperating views over the same task set:
//!
//! - [`readiness::ReadinessScheduler`] decides, per role, which workstream
//!   to run next, preferring lanes whose progress unblocks the most others.
//! - [`workstream::WorkstreamScheduler`] tracks per-lane execution state
//!   and enforces that each lane runs its tasks one at a time.
//!
//! Both enforce the same per-role concurrency caps.

pub mod readiness;
pub mod workstream;

use thiserror::Error;

use crate::model::WorkstreamKey;
use crate::resolver::ResolverError;

/// Errors from scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Cycle(#[from] ResolverError),

    #[error("workstream {0} is not tracked")]
    UnknownWorkstream(WorkstreamKey),

    #[error("task {0:?} is not tracked by any workstream")]
    UnknownTask(String),

    #[error("workstream {key} is already {status}")]
    InvalidWorkstreamState { key: WorkstreamKey, status: String },
}
