//! Scheduling-progress monitor.
//!
//! Watches a single evaluation from submission to terminal state, reporting
//! each observed change exactly once and classifying the outcome:
//!
//! - **Snapshots** ([`snapshot`]): immutable observations of an evaluation
//!   and its allocations.
//! - **Diff engine** ([`diff`]): pure comparison of two snapshots into
//!   change events.
//! - **Diagnostics** ([`diagnostics`]): placement failure breakdowns.
//! - **Monitor** ([`monitor`]): the poll loop, driven against an injected
//!   [`EvaluationSource`] and [`OutputSink`].
//!
//! # Exit status
//!
//! - `0`: the evaluation completed and every allocation was placed
//! - `1`: API error, timeout or cancellation
//! - `2`: the evaluation settled but some allocations could not be placed

pub mod api;
pub mod client;
pub mod diagnostics;
pub mod diff;
pub mod error;
pub mod monitor;
pub mod sink;
pub mod snapshot;

pub use api::{
    Allocation, AllocationMetric, AllocationStub, ClientStatus, DesiredStatus, EvalStatus,
    Evaluation, QueryMeta, QueryOptions, Trigger,
};
pub use client::{ApiError, EvaluationSource};
pub use diagnostics::{dump_allocation_status, format_placement_failure};
pub use diff::{diff, MonitorEvent};
pub use error::MonitorError;
pub use monitor::{ExitStatus, Monitor, MonitorConfig, PollState, Prefetched};
pub use sink::{Level, MemorySink, OutputSink};
pub use snapshot::{AllocationSnapshot, EvaluationSnapshot};
