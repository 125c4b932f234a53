//! Transport boundary
//!
//! A `JobServiceStub` performs exactly one network call per method and
//! reports failures as a canonical `StatusCode`. Retrying, option merging and
//! error classification all happen above this layer.

use async_trait::async_trait;
use quarry_core::domain::job::Job;
use quarry_core::dto::job::{
    InsertJobRequest, JobList, JobRequest, ListJobsRequest, QueryResultsPage, QueryResultsRequest,
};
use quarry_core::status::StatusCode;
use std::fmt::Debug;
use thiserror::Error;

use crate::options::Options;

/// Failure reported by a transport
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct TransportError {
    pub code: StatusCode,
    pub message: String,
}

impl TransportError {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Result of a single transport call
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Single-call access to the job service
///
/// Every method receives the effective options of the call so transports can
/// honor the endpoint, timeout and credentials it carries.
#[async_trait]
pub trait JobServiceStub: Send + Sync + Debug {
    async fn insert_job(&self, options: &Options, request: &InsertJobRequest) -> TransportResult<Job>;

    async fn get_job(&self, options: &Options, request: &JobRequest) -> TransportResult<Job>;

    async fn delete_job(&self, options: &Options, request: &JobRequest) -> TransportResult<()>;

    async fn cancel_job(&self, options: &Options, request: &JobRequest) -> TransportResult<Job>;

    async fn list_jobs(&self, options: &Options, request: &ListJobsRequest) -> TransportResult<JobList>;

    async fn get_query_results(
        &self,
        options: &Options,
        request: &QueryResultsRequest,
    ) -> TransportResult<QueryResultsPage>;
}
