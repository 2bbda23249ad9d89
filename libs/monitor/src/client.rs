//! Read-only API the monitor needs from the orchestrator.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::api::{Allocation, AllocationStub, Evaluation, QueryMeta, QueryOptions};

/// Errors surfaced by an [`EvaluationSource`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The server answered with a non-success status.
    #[error("unexpected response ({status}): {message}")]
    Status { status: u16, message: String },

    /// The response body could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(String),
}

/// Source of evaluation and allocation records.
///
/// Implementations own transport, authentication and blocking-query
/// mechanics. A blocking query (`QueryOptions::is_blocking`) should hold the
/// request until the resource index moves past `wait_index` or `wait_time`
/// elapses.
#[async_trait]
pub trait EvaluationSource: Send + Sync {
    /// Read one evaluation.
    async fn evaluation(
        &self,
        eval_id: &str,
        query: &QueryOptions,
    ) -> Result<(Evaluation, QueryMeta), ApiError>;

    /// List the allocations created or touched by an evaluation.
    async fn allocations(
        &self,
        eval_id: &str,
        query: &QueryOptions,
    ) -> Result<(Vec<AllocationStub>, QueryMeta), ApiError>;

    /// Read the full record of one allocation.
    async fn allocation(&self, alloc_id: &str) -> Result<Allocation, ApiError>;
}

#[async_trait]
impl<T: EvaluationSource + ?Sized> EvaluationSource for Arc<T> {
    async fn evaluation(
        &self,
        eval_id: &str,
        query: &QueryOptions,
    ) -> Result<(Evaluation, QueryMeta), ApiError> {
        (**self).evaluation(eval_id, query).await
    }

    async fn allocations(
        &self,
        eval_id: &str,
        query: &QueryOptions,
    ) -> Result<(Vec<AllocationStub>, QueryMeta), ApiError> {
        (**self).allocations(eval_id, query).await
    }

    async fn allocation(&self, alloc_id: &str) -> Result<Allocation, ApiError> {
        (**self).allocation(alloc_id).await
    }
}

#[async_trait]
impl<T: EvaluationSource + ?Sized> EvaluationSource for &T {
    async fn evaluation(
        &self,
        eval_id: &str,
        query: &QueryOptions,
    ) -> Result<(Evaluation, QueryMeta), ApiError> {
        (**self).evaluation(eval_id, query).await
    }

    async fn allocations(
        &self,
        eval_id: &str,
        query: &QueryOptions,
    ) -> Result<(Vec<AllocationStub>, QueryMeta), ApiError> {
        (**self).allocations(eval_id, query).await
    }

    async fn allocation(&self, alloc_id: &str) -> Result<Allocation, ApiError> {
        (**self).allocation(alloc_id).await
    }
}
