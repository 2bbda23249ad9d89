//! Structural diff between successive evaluation snapshots.
//!
//! `diff` is pure: it holds no state between calls. The caller keeps the
//! previous snapshot and replaces it after every call.

use std::fmt;

use crate::api::{ClientStatus, DesiredStatus, EvalStatus, Trigger};
use crate::diagnostics::allocation_status_lines;
use crate::snapshot::{AllocationSnapshot, EvaluationSnapshot};

/// A change observed between two snapshots.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    /// The evaluation's trigger was seen for the first time.
    Triggered(Trigger),

    /// First observation of an evaluation that is already past pending.
    StatusObserved(EvalStatus),

    StatusChanged {
        from: EvalStatus,
        to: EvalStatus,
    },

    AllocationCreated {
        id: String,
        node: String,
        group: String,
    },

    /// An allocation older than the evaluation was touched by it.
    AllocationModified {
        id: String,
        node: String,
        group: String,
    },

    /// Desired and/or client status of a known allocation moved.
    AllocationUpdated {
        id: String,
        desired: Option<(DesiredStatus, DesiredStatus)>,
        client: Option<(ClientStatus, ClientStatus)>,
        description: String,
    },

    SchedulingError {
        group: String,
        desired: DesiredStatus,
        desired_description: String,
        client: ClientStatus,
        client_description: String,
        /// Placement diagnostics, when the full allocation was available.
        diagnostics: Option<Vec<String>>,
    },
}

impl MonitorEvent {
    /// Render the event as whole output lines.
    pub fn lines(&self) -> Vec<String> {
        match self {
            Self::SchedulingError {
                group,
                desired,
                desired_description,
                client,
                client_description,
                diagnostics,
            } => {
                let mut lines = vec![
                    format!("Scheduling error for group \"{}\"", group),
                    format!(
                        "  Desired status \"{}\"{}",
                        desired,
                        parenthesized(desired_description)
                    ),
                    format!(
                        "  Client status \"{}\"{}",
                        client,
                        parenthesized(client_description)
                    ),
                ];
                if let Some(diagnostics) = diagnostics {
                    lines.extend(diagnostics.iter().map(|line| format!("  {}", line)));
                }
                lines
            }
            other => vec![other.to_string()],
        }
    }
}

impl fmt::Display for MonitorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Triggered(trigger) => write!(f, "Evaluation triggered by {}", trigger),
            Self::StatusObserved(status) => write!(f, "Evaluation status is \"{}\"", status),
            Self::StatusChanged { from, to } => {
                write!(f, "Evaluation status changed: \"{}\" -> \"{}\"", from, to)
            }
            Self::AllocationCreated { id, node, group } => write!(
                f,
                "Allocation \"{}\" created: node \"{}\", group \"{}\"",
                id, node, group
            ),
            Self::AllocationModified { id, node, group } => write!(
                f,
                "Allocation \"{}\" modified: node \"{}\", group \"{}\"",
                id, node, group
            ),
            Self::AllocationUpdated {
                id,
                desired,
                client,
                description,
            } => {
                let mut changes = Vec::with_capacity(2);
                if let Some((old, new)) = desired {
                    changes.push(format!("desired \"{}\" -> \"{}\"", old, new));
                }
                if let Some((old, new)) = client {
                    changes.push(format!("client \"{}\" -> \"{}\"", old, new));
                }
                write!(
                    f,
                    "Allocation \"{}\" status changed: {}{}",
                    id,
                    changes.join(", "),
                    parenthesized(description)
                )
            }
            Self::SchedulingError { .. } => f.write_str(&self.lines().join("\n")),
        }
    }
}

fn parenthesized(text: &str) -> String {
    if text.is_empty() {
        String::new()
    } else {
        format!(" ({})", text)
    }
}

/// Compute the events that lead from `previous` to `current`.
///
/// Returns nothing when the two snapshots describe the same state.
pub fn diff(previous: Option<&EvaluationSnapshot>, current: &EvaluationSnapshot) -> Vec<MonitorEvent> {
    let mut events = Vec::new();

    let previous_trigger = previous.map(|p| &p.trigger).unwrap_or(&Trigger::None);
    if current.trigger != Trigger::None && current.trigger != *previous_trigger {
        events.push(MonitorEvent::Triggered(current.trigger.clone()));
    }

    match previous {
        None if current.status != EvalStatus::Pending => {
            events.push(MonitorEvent::StatusObserved(current.status));
        }
        Some(previous) if previous.status != current.status => {
            events.push(MonitorEvent::StatusChanged {
                from: previous.status,
                to: current.status,
            });
        }
        _ => {}
    }

    for alloc in current.allocations.values() {
        match previous.and_then(|p| p.allocation(&alloc.id)) {
            None => first_sighting(current, alloc, &mut events),
            Some(existing) => {
                if let Some(event) = status_update(existing, alloc) {
                    events.push(event);
                }
            }
        }
    }

    events
}

fn first_sighting(
    current: &EvaluationSnapshot,
    alloc: &AllocationSnapshot,
    events: &mut Vec<MonitorEvent>,
) {
    let (id, node, group) = (alloc.id.clone(), alloc.node.clone(), alloc.task_group.clone());
    if current.predates(alloc) {
        events.push(MonitorEvent::AllocationModified { id, node, group });
    } else {
        events.push(MonitorEvent::AllocationCreated { id, node, group });
    }

    if alloc.is_scheduling_failure() {
        events.push(MonitorEvent::SchedulingError {
            group: alloc.task_group.clone(),
            desired: alloc.desired_status,
            desired_description: alloc.desired_description.clone(),
            client: alloc.client_status,
            client_description: alloc.client_description.clone(),
            diagnostics: alloc.full_detail.as_ref().map(allocation_status_lines),
        });
    }
}

fn status_update(existing: &AllocationSnapshot, alloc: &AllocationSnapshot) -> Option<MonitorEvent> {
    let desired = (existing.desired_status != alloc.desired_status)
        .then_some((existing.desired_status, alloc.desired_status));
    let client = (existing.client_status != alloc.client_status)
        .then_some((existing.client_status, alloc.client_status));

    if desired.is_none() && client.is_none() {
        return None;
    }

    Some(MonitorEvent::AllocationUpdated {
        id: alloc.id.clone(),
        desired,
        client,
        description: alloc.client_description.clone(),
    })
}
