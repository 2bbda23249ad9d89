//! Poll loop that follows an evaluation until it settles.
//!
//! The loop is an explicit state machine:
//!
//! - **Fetching**: read the evaluation and its allocations, reusing
//!   whatever the previous wait already returned
//! - **Diffing**: diff against the retained snapshot and write events
//! - **Waiting**: block until the evaluation or its allocations change
//!   (or sleep when the server reports no index)
//! - **Following**: switch to a follow-up evaluation
//! - **Terminal** / **Error** / **TimedOut**: resolve the exit status
//!
//! Awaiting states race an interrupt (deadline or cancellation) so an
//! in-flight request is dropped as soon as the session is stopped.

use std::future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::api::{
    Allocation, AllocationStub, DesiredStatus, EvalStatus, Evaluation, QueryMeta, QueryOptions,
};
use crate::client::EvaluationSource;
use crate::diff::diff;
use crate::error::MonitorError;
use crate::sink::OutputSink;
use crate::snapshot::{AllocationSnapshot, EvaluationSnapshot};

/// Default sleep between polls when blocking queries are unavailable.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default upper bound for one blocking query.
pub const DEFAULT_BLOCKING_WAIT: Duration = Duration::from_secs(5);

/// Monitor configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Sleep between polls when the server reports no index. Also the
    /// minimum spacing between polls when a blocking query returns early
    /// without progress.
    pub poll_interval: Duration,

    /// How long the server may hold a blocking query.
    pub blocking_wait: Duration,

    /// Give up after this long without a terminal evaluation.
    pub timeout: Option<Duration>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            blocking_wait: DEFAULT_BLOCKING_WAIT,
            timeout: None,
        }
    }
}

/// Classified result of a monitoring session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// The evaluation completed and every allocation was placed.
    Success,

    /// API error, timeout or cancellation.
    Error,

    /// The evaluation settled but some placements failed.
    SchedulingFailure,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Error => 1,
            Self::SchedulingFailure => 2,
        }
    }
}

/// One fetch of an evaluation and its allocations.
#[derive(Debug, Clone)]
pub struct Observation {
    pub evaluation: Evaluation,
    pub snapshot: EvaluationSnapshot,

    /// Index reported by the evaluation read; zero if none.
    pub eval_index: u64,

    /// Index reported by the allocation listing; zero if none.
    pub alloc_index: u64,
}

/// Records a blocking wait already returned, reused by the next fetch.
#[derive(Debug, Default)]
pub struct Prefetched {
    pub evaluation: Option<(Evaluation, QueryMeta)>,
    pub allocations: Option<(Vec<AllocationStub>, QueryMeta)>,
}

/// State of the poll loop.
#[derive(Debug)]
pub enum PollState {
    Fetching {
        eval_id: String,
        prefetched: Prefetched,
    },
    Diffing(Box<Observation>),
    Waiting {
        eval_id: String,
        eval_index: u64,
        alloc_index: u64,
    },
    Following { finished: Evaluation, next_eval_id: String },
    Terminal { evaluation: Evaluation },
    Error(MonitorError),
    TimedOut(MonitorError),
}

impl PollState {
    /// Where to go once an observation has been diffed.
    pub fn after_observation(evaluation: Evaluation, eval_index: u64, alloc_index: u64) -> Self {
        if !evaluation.status.is_terminal() {
            return Self::Waiting {
                eval_id: evaluation.id,
                eval_index,
                alloc_index,
            };
        }

        match evaluation.follow_up() {
            Some(next) => {
                let next_eval_id = next.to_string();
                Self::Following {
                    finished: evaluation,
                    next_eval_id,
                }
            }
            None => Self::Terminal { evaluation },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Fetching { .. } => "fetching",
            Self::Diffing(_) => "diffing",
            Self::Waiting { .. } => "waiting",
            Self::Following { .. } => "following",
            Self::Terminal { .. } => "terminal",
            Self::Error(_) => "error",
            Self::TimedOut(_) => "timed_out",
        }
    }
}

enum Interrupt {
    Deadline,
    Cancelled,
}

/// Watches one evaluation (and its follow-ups) until it settles.
///
/// The monitor owns the retained snapshot; callers must not drive two
/// sessions on the same instance concurrently (`&mut self` enforces it).
pub struct Monitor<C, S> {
    client: C,
    sink: S,
    config: MonitorConfig,
    cancel: Option<watch::Receiver<bool>>,
    previous: Option<EvaluationSnapshot>,
    scheduling_failure: bool,
}

impl<C, S> Monitor<C, S>
where
    C: EvaluationSource,
    S: OutputSink,
{
    pub fn new(client: C, sink: S, config: MonitorConfig) -> Self {
        Self {
            client,
            sink,
            config,
            cancel: None,
            previous: None,
            scheduling_failure: false,
        }
    }

    /// Stop the session once `true` is sent on the channel.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Diff a snapshot against the retained one, write the resulting
    /// events, and retain the new snapshot.
    pub fn update(&mut self, snapshot: EvaluationSnapshot) {
        let events = diff(self.previous.as_ref(), &snapshot);
        for event in &events {
            for line in event.lines() {
                self.sink.output(&line);
            }
        }

        if snapshot.has_scheduling_failure() {
            self.scheduling_failure = true;
        }
        self.previous = Some(snapshot);
    }

    /// Follow an evaluation until it reaches a terminal state, writing every
    /// observed change to the sink.
    pub async fn monitor(&mut self, eval_id: &str) -> ExitStatus {
        self.previous = None;
        self.scheduling_failure = false;

        self.sink
            .info(&format!("Monitoring evaluation \"{}\"", eval_id));
        info!(eval_id, "Monitoring evaluation");

        let started = Instant::now();
        // A deadline past the end of the clock is no deadline.
        let deadline = self
            .config
            .timeout
            .and_then(|timeout| started.checked_add(timeout));
        let interrupt = interrupted(deadline, self.cancel.clone());
        tokio::pin!(interrupt);

        let mut state = PollState::Fetching {
            eval_id: eval_id.to_string(),
            prefetched: Prefetched::default(),
        };

        loop {
            debug!(state = state.name(), "Poll loop transition");

            state = match state {
                PollState::Fetching {
                    eval_id,
                    prefetched,
                } => {
                    tokio::select! {
                        result = self.observe(&eval_id, prefetched) => match result {
                            Ok(observation) => PollState::Diffing(Box::new(observation)),
                            Err(err) => PollState::Error(err),
                        },
                        reason = &mut interrupt => PollState::TimedOut(interrupt_error(reason, &eval_id, started)),
                    }
                }
                PollState::Diffing(observation) => {
                    let Observation {
                        evaluation,
                        snapshot,
                        eval_index,
                        alloc_index,
                    } = *observation;
                    self.update(snapshot);
                    PollState::after_observation(evaluation, eval_index, alloc_index)
                }
                PollState::Waiting {
                    eval_id,
                    eval_index,
                    alloc_index,
                } => {
                    tokio::select! {
                        result = self.wait_for_change(&eval_id, eval_index, alloc_index) => match result {
                            Ok(prefetched) => PollState::Fetching { eval_id, prefetched },
                            Err(err) => PollState::Error(err),
                        },
                        reason = &mut interrupt => PollState::TimedOut(interrupt_error(reason, &eval_id, started)),
                    }
                }
                PollState::Following {
                    finished,
                    next_eval_id,
                } => {
                    info!(
                        eval_id = %finished.id,
                        next_eval_id = %next_eval_id,
                        "Following chained evaluation"
                    );
                    self.report_finished(&finished);
                    self.sink
                        .info(&format!("Monitoring evaluation \"{}\"", next_eval_id));
                    self.previous = None;
                    PollState::Fetching {
                        eval_id: next_eval_id,
                        prefetched: Prefetched::default(),
                    }
                }
                PollState::Terminal { evaluation } => {
                    self.report_finished(&evaluation);
                    return self.classify(evaluation.status);
                }
                PollState::Error(err) | PollState::TimedOut(err) => {
                    if err.is_interrupt() {
                        info!(error = %err, "Monitoring interrupted");
                    } else {
                        warn!(error = %err, "Monitoring stopped");
                    }
                    self.sink.error(&err.to_string());
                    return ExitStatus::Error;
                }
            };
        }
    }

    async fn observe(
        &self,
        eval_id: &str,
        prefetched: Prefetched,
    ) -> Result<Observation, MonitorError> {
        let (evaluation, eval_meta) = match prefetched.evaluation {
            Some(found) => found,
            None => self
                .client
                .evaluation(eval_id, &QueryOptions::default())
                .await
                .map_err(MonitorError::ReadEvaluation)?,
        };

        let (stubs, meta) = match prefetched.allocations {
            Some(found) => found,
            None => self
                .client
                .allocations(&evaluation.id, &QueryOptions::default())
                .await
                .map_err(MonitorError::ReadAllocations)?,
        };

        let mut allocations = Vec::with_capacity(stubs.len());
        for stub in stubs {
            let full_detail = if stub.desired_status == DesiredStatus::Failed {
                Some(self.full_allocation(&stub.id).await?)
            } else {
                None
            };
            allocations.push(AllocationSnapshot::from_stub(stub, full_detail));
        }

        debug!(
            eval_id = %evaluation.id,
            status = %evaluation.status,
            allocations = allocations.len(),
            eval_index = eval_meta.last_index,
            alloc_index = meta.last_index,
            "Fetched evaluation"
        );

        Ok(Observation {
            snapshot: EvaluationSnapshot::new(&evaluation, allocations),
            evaluation,
            eval_index: eval_meta.last_index,
            alloc_index: meta.last_index,
        })
    }

    /// Full record for a failed allocation, reusing one already retained.
    async fn full_allocation(&self, alloc_id: &str) -> Result<Allocation, MonitorError> {
        let retained = self
            .previous
            .as_ref()
            .and_then(|previous| previous.allocation(alloc_id))
            .and_then(|alloc| alloc.full_detail.clone());
        if let Some(detail) = retained {
            return Ok(detail);
        }

        self.client
            .allocation(alloc_id)
            .await
            .map_err(|source| MonitorError::QueryAllocation {
                alloc_id: alloc_id.to_string(),
                source,
            })
    }

    /// Block until the evaluation or its allocation listing moves past the
    /// given index, returning whichever record answered first.
    async fn wait_for_change(
        &self,
        eval_id: &str,
        eval_index: u64,
        alloc_index: u64,
    ) -> Result<Prefetched, MonitorError> {
        if eval_index == 0 && alloc_index == 0 {
            debug!(
                poll_interval_ms = self.config.poll_interval.as_millis() as u64,
                "No index reported, sleeping before next poll"
            );
            tokio::time::sleep(self.config.poll_interval).await;
            return Ok(Prefetched::default());
        }

        let started = Instant::now();
        let eval_query = QueryOptions::blocking(eval_index, self.config.blocking_wait);
        let alloc_query = QueryOptions::blocking(alloc_index, self.config.blocking_wait);

        let changed = tokio::select! {
            result = self.client.evaluation(eval_id, &eval_query), if eval_index > 0 => {
                let (evaluation, meta) = result.map_err(MonitorError::ReadEvaluation)?;
                (meta.last_index > eval_index).then(|| {
                    debug!(eval_index = meta.last_index, "Evaluation changed");
                    Prefetched {
                        evaluation: Some((evaluation, meta)),
                        allocations: None,
                    }
                })
            }
            result = self.client.allocations(eval_id, &alloc_query), if alloc_index > 0 => {
                let (stubs, meta) = result.map_err(MonitorError::ReadAllocations)?;
                (meta.last_index > alloc_index).then(|| {
                    debug!(alloc_index = meta.last_index, "Allocations changed");
                    Prefetched {
                        evaluation: None,
                        allocations: Some((stubs, meta)),
                    }
                })
            }
            else => None,
        };

        match changed {
            Some(prefetched) => Ok(prefetched),
            None => {
                // A server that ignores the index answers at once with nothing new.
                let remaining = self.config.poll_interval.saturating_sub(started.elapsed());
                tokio::time::sleep(remaining).await;
                Ok(Prefetched::default())
            }
        }
    }

    fn report_finished(&mut self, evaluation: &Evaluation) {
        info!(
            eval_id = %evaluation.id,
            status = %evaluation.status,
            "Evaluation finished"
        );
        self.sink.info(&format!(
            "Evaluation \"{}\" finished with status \"{}\"",
            evaluation.id, evaluation.status
        ));
    }

    fn classify(&self, status: EvalStatus) -> ExitStatus {
        if self.scheduling_failure || matches!(status, EvalStatus::Failed | EvalStatus::Canceled) {
            ExitStatus::SchedulingFailure
        } else {
            ExitStatus::Success
        }
    }
}

fn interrupt_error(reason: Interrupt, eval_id: &str, started: Instant) -> MonitorError {
    match reason {
        Interrupt::Deadline => MonitorError::TimedOut {
            eval_id: eval_id.to_string(),
            elapsed: started.elapsed(),
        },
        Interrupt::Cancelled => MonitorError::Cancelled {
            eval_id: eval_id.to_string(),
        },
    }
}

async fn interrupted(deadline: Option<Instant>, cancel: Option<watch::Receiver<bool>>) -> Interrupt {
    let deadline_reached = async {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => future::pending::<()>().await,
        }
    };

    let cancel_requested = async {
        let Some(mut cancel) = cancel else {
            return future::pending::<()>().await;
        };
        loop {
            if *cancel.borrow_and_update() {
                return;
            }
            if cancel.changed().await.is_err() {
                // Sender gone without cancelling: never fires.
                return future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = deadline_reached => Interrupt::Deadline,
        _ = cancel_requested => Interrupt::Cancelled,
    }
}
