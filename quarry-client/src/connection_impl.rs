//! Production `Connection`
//!
//! `ConnectionImpl` is a single-call boundary: it validates the request,
//! merges options, invokes the stub once and translates the transport status
//! into a `ClientError`. It never retries and never caches job state.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use quarry_core::domain::job::Job;
use quarry_core::dto::job::{
    InsertJobRequest, JobList, JobRequest, ListJobsRequest, QueryResultsPage, QueryResultsRequest,
};
use tracing::debug;

use crate::connection::Connection;
use crate::error::{ClientError, Result};
use crate::options::{DEFAULT_ENDPOINT, Options};
use crate::stub::{JobServiceStub, TransportError};

/// Defaults of the job service layer, below the client-wide options
pub fn job_service_default_options() -> Options {
    Options::new()
        .with_endpoint(DEFAULT_ENDPOINT)
        .with_request_timeout(Duration::from_secs(60))
}

#[derive(Debug)]
pub struct ConnectionImpl {
    stub: Arc<dyn JobServiceStub>,
    job_options: Options,
    options: Options,
}

impl ConnectionImpl {
    /// Creates a connection over `stub`.
    ///
    /// # Arguments
    /// * `stub` - Transport used for every call
    /// * `job_options` - Job service defaults, the lowest-precedence layer
    /// * `options` - Client-wide options, layered over `job_options`
    pub fn new(stub: Arc<dyn JobServiceStub>, job_options: Options, options: Options) -> Self {
        Self {
            stub,
            job_options,
            options,
        }
    }

    /// Layers the call's options over the client-wide and job service ones
    fn effective_options(&self, call: Options) -> Options {
        Options::merge(&call, &Options::merge(&self.options, &self.job_options))
    }

    fn translate(err: TransportError, effective: &Options) -> ClientError {
        ClientError::from_status(err.code, err.message, &effective.resolved_retryable_statuses())
    }
}

fn validate_job_request(request: &JobRequest) -> Result<()> {
    if request.project_id.is_empty() {
        return Err(ClientError::Invalid("project_id must not be empty".to_string()));
    }
    if request.job_id.is_empty() {
        return Err(ClientError::Invalid("job_id must not be empty".to_string()));
    }
    Ok(())
}

fn validate_project(project_id: &str) -> Result<()> {
    if project_id.is_empty() {
        return Err(ClientError::Invalid("project_id must not be empty".to_string()));
    }
    Ok(())
}

#[async_trait]
impl Connection for ConnectionImpl {
    fn options(&self) -> Options {
        self.options.clone()
    }

    async fn get_job(&self, request: &JobRequest, options: Options) -> Result<Job> {
        validate_job_request(request)?;
        let effective = self.effective_options(options);

        self.stub
            .get_job(&effective, request)
            .await
            .map_err(|e| Self::translate(e, &effective))
    }

    async fn delete_job(&self, request: &JobRequest, options: Options) -> Result<()> {
        validate_job_request(request)?;
        let effective = self.effective_options(options);

        match self.stub.delete_job(&effective, request).await {
            Ok(()) => Ok(()),
            Err(e) => match Self::translate(e, &effective) {
                ClientError::NotFound(message) => {
                    debug!(
                        "Job {} already deleted, treating as success: {}",
                        request.job_id, message
                    );
                    Ok(())
                }
                other => Err(other),
            },
        }
    }

    async fn cancel_job(&self, request: &JobRequest, options: Options) -> Result<Job> {
        validate_job_request(request)?;
        let effective = self.effective_options(options);

        self.stub
            .cancel_job(&effective, request)
            .await
            .map_err(|e| Self::translate(e, &effective))
    }

    async fn insert_job(&self, request: &InsertJobRequest, options: Options) -> Result<Job> {
        validate_project(&request.project_id)?;
        let effective = self.effective_options(options);

        self.stub
            .insert_job(&effective, request)
            .await
            .map_err(|e| Self::translate(e, &effective))
    }

    async fn list_jobs(&self, request: &ListJobsRequest, options: Options) -> Result<JobList> {
        validate_project(&request.project_id)?;
        let effective = self.effective_options(options);

        self.stub
            .list_jobs(&effective, request)
            .await
            .map_err(|e| Self::translate(e, &effective))
    }

    async fn get_query_results(
        &self,
        request: &QueryResultsRequest,
        options: Options,
    ) -> Result<QueryResultsPage> {
        validate_job_request(&JobRequest::from(&request.job))?;
        let effective = self.effective_options(options);

        self.stub
            .get_query_results(&effective, request)
            .await
            .map_err(|e| Self::translate(e, &effective))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{RecordedCall, ScriptedStub};
    use quarry_core::domain::job::{JobReference, JobState};
    use quarry_core::status::StatusCode;

    fn connection(stub: Arc<ScriptedStub>) -> ConnectionImpl {
        ConnectionImpl::new(
            stub,
            job_service_default_options(),
            Options::new()
                .with_endpoint("http://client:1")
                .with_billing_project("client-project"),
        )
    }

    #[tokio::test]
    async fn test_get_job_merges_call_options() {
        let stub = Arc::new(ScriptedStub::new());
        stub.push_get_job(Ok(Job::new(JobReference::new("p", "j1"), JobState::Done)));
        let conn = connection(stub.clone());

        let job = conn
            .get_job(
                &JobRequest::new("p", "j1"),
                Options::new().with_endpoint("http://call:2"),
            )
            .await
            .unwrap();
        assert_eq!(job.state, JobState::Done);

        let calls = stub.calls();
        assert_eq!(calls.len(), 1);
        let (call, effective) = &calls[0];
        assert_eq!(call, &RecordedCall::GetJob(JobRequest::new("p", "j1")));
        assert_eq!(effective.endpoint.as_deref(), Some("http://call:2"));
        assert_eq!(effective.billing_project.as_deref(), Some("client-project"));
        assert_eq!(effective.request_timeout, Some(Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn test_options_returns_client_layer_only() {
        let conn = connection(Arc::new(ScriptedStub::new()));
        let options = conn.options();
        assert_eq!(options.endpoint.as_deref(), Some("http://client:1"));
        assert_eq!(options.request_timeout, None);
    }

    #[tokio::test]
    async fn test_get_missing_job_is_not_found_without_retry() {
        let stub = Arc::new(ScriptedStub::new());
        stub.push_get_job(Err(TransportError::new(StatusCode::NotFound, "Not found: Job p:missing")));
        let conn = connection(stub.clone());

        let err = conn
            .get_job(&JobRequest::new("p", "missing"), Options::new())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(stub.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_transient_translation_uses_call_retryable_set() {
        let stub = Arc::new(ScriptedStub::new());
        stub.push_get_job(Err(TransportError::new(StatusCode::Internal, "backend error")));
        stub.push_get_job(Err(TransportError::new(StatusCode::Internal, "backend error")));
        let conn = connection(stub);
        let request = JobRequest::new("p", "j1");

        let err = conn.get_job(&request, Options::new()).await.unwrap_err();
        assert!(matches!(err, ClientError::Service { code: StatusCode::Internal, .. }));

        let err = conn
            .get_job(&request, Options::new().with_retryable_statuses([StatusCode::Internal]))
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_malformed_request_is_invalid_without_network_call() {
        let stub = Arc::new(ScriptedStub::new());
        let conn = connection(stub.clone());

        let err = conn
            .get_job(&JobRequest::new("p", ""), Options::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Invalid(_)));

        let err = conn
            .delete_job(&JobRequest::new("", "j1"), Options::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Invalid(_)));
        assert!(stub.calls().is_empty());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let stub = Arc::new(ScriptedStub::new());
        stub.push_delete_job(Ok(()));
        stub.push_delete_job(Err(TransportError::new(StatusCode::NotFound, "already deleted")));
        stub.push_delete_job(Err(TransportError::new(StatusCode::NotFound, "already deleted")));
        let conn = connection(stub.clone());
        let request = JobRequest::new("p", "j1");

        for _ in 0..3 {
            conn.delete_job(&request, Options::new()).await.unwrap();
        }
        assert_eq!(stub.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_delete_surfaces_other_errors() {
        let stub = Arc::new(ScriptedStub::new());
        stub.push_delete_job(Err(TransportError::new(StatusCode::PermissionDenied, "nope")));
        let conn = connection(stub);

        let err = conn
            .delete_job(&JobRequest::new("p", "j1"), Options::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::PermissionDenied(_)));
    }
}
