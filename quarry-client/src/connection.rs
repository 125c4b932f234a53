//! Connection abstraction
//!
//! A `Connection` exposes the job lifecycle operations of one client. It is
//! shared by every call the client makes and by every workflow in flight, so
//! implementations must be safe for concurrent use.

use std::sync::Arc;

use async_trait::async_trait;
use quarry_core::domain::job::Job;
use quarry_core::dto::job::{
    InsertJobRequest, JobList, JobRequest, ListJobsRequest, QueryResultsPage, QueryResultsRequest,
};
use std::fmt::Debug;

use crate::connection_impl::{ConnectionImpl, job_service_default_options};
use crate::error::Result;
use crate::options::Options;
use crate::rest_stub::RestJobServiceStub;
use crate::tracing_connection::make_tracing_connection;

/// Job lifecycle operations
///
/// Each method takes per-call `Options`; implementations layer them over
/// their own defaults before doing any work.
#[async_trait]
pub trait Connection: Send + Sync + Debug {
    /// Client-wide options, not merged with any call
    fn options(&self) -> Options;

    /// Fetches the current state of a job
    async fn get_job(&self, request: &JobRequest, options: Options) -> Result<Job>;

    /// Deletes a job's metadata
    ///
    /// Deleting a job that no longer exists succeeds.
    async fn delete_job(&self, request: &JobRequest, options: Options) -> Result<()>;

    /// Asks the service to cancel a running job
    async fn cancel_job(&self, request: &JobRequest, options: Options) -> Result<Job>;

    /// Creates a job and returns it as first reported by the service
    async fn insert_job(&self, request: &InsertJobRequest, options: Options) -> Result<Job>;

    /// Lists one page of jobs
    async fn list_jobs(&self, request: &ListJobsRequest, options: Options) -> Result<JobList>;

    /// Fetches one page of a finished query's rows
    async fn get_query_results(
        &self,
        request: &QueryResultsRequest,
        options: Options,
    ) -> Result<QueryResultsPage>;
}

/// Builds the default connection for `options`.
///
/// The connection talks REST through `RestJobServiceStub` and is wrapped in
/// a `TracingConnection` when `tracing_enabled` is set.
pub fn make_connection(options: Options) -> Result<Arc<dyn Connection>> {
    options.validate()?;

    let stub = Arc::new(RestJobServiceStub::new());
    let connection: Arc<dyn Connection> =
        Arc::new(ConnectionImpl::new(stub, job_service_default_options(), options));

    Ok(make_tracing_connection(connection))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_connection_keeps_options() {
        let options = Options::new().with_endpoint("http://localhost:9050");
        let connection = make_connection(options.clone()).unwrap();
        assert_eq!(connection.options(), options);
    }

    #[test]
    fn test_make_connection_rejects_invalid_options() {
        let err = make_connection(Options::new().with_endpoint("localhost:1")).unwrap_err();
        assert!(matches!(err, crate::error::ClientError::Invalid(_)));
    }

    #[test]
    fn test_make_connection_with_tracing() {
        let connection = make_connection(Options::new().with_tracing(true)).unwrap();
        assert!(format!("{:?}", connection).starts_with("TracingConnection"));
    }
}
