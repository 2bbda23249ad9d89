//! Point-in-time observations of an evaluation and its allocations.

use std::collections::BTreeMap;

use crate::api::{
    Allocation, AllocationStub, ClientStatus, DesiredStatus, EvalStatus, Evaluation, Trigger,
};

/// One observation of an allocation.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationSnapshot {
    pub id: String,
    pub task_group: String,

    /// Node the allocation is placed on; empty when unplaced.
    pub node: String,

    pub desired_status: DesiredStatus,
    pub desired_description: String,
    pub client_status: ClientStatus,
    pub client_description: String,

    /// Index at which the allocation was created. Never changes.
    pub create_index: u64,

    /// Full record, attached only for allocations the scheduler failed to place.
    pub full_detail: Option<Allocation>,
}

impl AllocationSnapshot {
    pub fn from_stub(stub: AllocationStub, full_detail: Option<Allocation>) -> Self {
        Self {
            id: stub.id,
            task_group: stub.task_group,
            node: stub.node_id,
            desired_status: stub.desired_status,
            desired_description: stub.desired_description,
            client_status: stub.client_status,
            client_description: stub.client_description,
            create_index: stub.create_index,
            full_detail,
        }
    }

    pub fn is_scheduling_failure(&self) -> bool {
        self.desired_status == DesiredStatus::Failed
    }
}

/// One observation of an evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationSnapshot {
    pub id: String,
    pub status: EvalStatus,
    pub trigger: Trigger,

    /// Create index of the evaluation. Allocations created before it
    /// existed before the evaluation ran.
    pub index: u64,

    pub allocations: BTreeMap<String, AllocationSnapshot>,
}

impl EvaluationSnapshot {
    pub fn new(evaluation: &Evaluation, allocations: Vec<AllocationSnapshot>) -> Self {
        Self {
            id: evaluation.id.clone(),
            status: evaluation.status,
            trigger: evaluation.trigger(),
            index: evaluation.create_index,
            allocations: allocations
                .into_iter()
                .map(|alloc| (alloc.id.clone(), alloc))
                .collect(),
        }
    }

    pub fn allocation(&self, id: &str) -> Option<&AllocationSnapshot> {
        self.allocations.get(id)
    }

    /// Returns true if any allocation could not be placed.
    pub fn has_scheduling_failure(&self) -> bool {
        self.allocations
            .values()
            .any(AllocationSnapshot::is_scheduling_failure)
    }

    /// Returns true if the allocation was created before this evaluation.
    pub fn predates(&self, alloc: &AllocationSnapshot) -> bool {
        alloc.create_index < self.index
    }
}
