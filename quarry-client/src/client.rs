//! Client facade over a `Connection`

use std::sync::Arc;

use quarry_core::domain::job::{Job, JobConfiguration, JobReference};
use quarry_core::dto::job::{InsertJobRequest, JobRequest, ListJobsRequest};
use tracing::info;
use uuid::Uuid;

use crate::connection::{Connection, make_connection};
use crate::error::{ClientError, Result};
use crate::future::JobFuture;
use crate::job_stream::JobStream;
use crate::options::Options;
use crate::poller::JobPoller;
use crate::rows::RowSequence;

/// Outcome of a successful `Client::submit_query_and_poll`
#[derive(Debug, Clone)]
pub struct QueryResponse {
    /// The finished job
    pub job: Job,
    /// Result rows, fetched on demand
    pub rows: RowSequence,
}

/// Job service client
///
/// Every method takes per-call `Options`. They are layered over the client's
/// own options, which the connection in turn layers over its defaults.
#[derive(Debug, Clone)]
pub struct Client {
    connection: Arc<dyn Connection>,
    options: Options,
}

impl Client {
    /// Create a client on top of an existing connection
    pub fn new(connection: Arc<dyn Connection>) -> Self {
        Self {
            connection,
            options: Options::new(),
        }
    }

    /// Create a client with the default REST connection
    ///
    /// # Example
    /// ```no_run
    /// use quarry_client::{Client, Options};
    ///
    /// # async fn example() -> quarry_client::Result<()> {
    /// let client = Client::connect(
    ///     Options::new()
    ///         .with_billing_project("my-project")
    ///         .with_access_token("ya29.token"),
    /// )?;
    ///
    /// let response = client
    ///     .submit_query_and_poll("SELECT 1", Options::new())
    ///     .await?;
    /// let rows = response.rows.collect_rows().await?;
    /// println!("{} row(s)", rows.len());
    /// # Ok(())
    /// # }
    /// ```
    pub fn connect(options: Options) -> Result<Self> {
        Ok(Self::new(make_connection(options)?))
    }

    /// Set client-level options layered between calls and the connection
    ///
    /// Fails with `ClientError::Invalid` when the options, layered over the
    /// connection's, do not validate.
    pub fn with_options(mut self, options: Options) -> Result<Self> {
        Options::merge(&options, &self.connection.options()).validate()?;
        self.options = options;
        Ok(self)
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    fn call_options(&self, options: Options) -> Options {
        Options::merge(&options, &self.options)
    }

    // =============================================================================
    // Job Lifecycle
    // =============================================================================

    /// Get a job's current state
    pub async fn get_job(&self, request: &JobRequest, options: Options) -> Result<Job> {
        self.connection
            .get_job(request, self.call_options(options))
            .await
    }

    /// Delete a job
    ///
    /// Deleting a job that is already gone succeeds.
    pub async fn delete_job(&self, request: &JobRequest, options: Options) -> Result<()> {
        self.connection
            .delete_job(request, self.call_options(options))
            .await
    }

    /// Request cancellation of a running job
    ///
    /// # Returns
    /// The job as reported right after the request; it usually still runs
    pub async fn cancel_job(&self, request: &JobRequest, options: Options) -> Result<Job> {
        self.connection
            .cancel_job(request, self.call_options(options))
            .await
    }

    /// List a project's jobs
    ///
    /// # Returns
    /// A stream that fetches pages as it is read, following page tokens until
    /// the service reports no more
    pub fn list_jobs(&self, request: ListJobsRequest, options: Options) -> JobStream {
        JobStream::new(
            Arc::clone(&self.connection),
            request,
            self.call_options(options),
        )
    }

    /// Create a job without waiting for it
    pub async fn insert_job(&self, request: &InsertJobRequest, options: Options) -> Result<Job> {
        self.connection
            .insert_job(request, self.call_options(options))
            .await
    }

    // =============================================================================
    // Polling Workflows
    // =============================================================================

    /// Create a job and poll it until it finishes
    pub fn insert_job_and_poll(&self, request: InsertJobRequest, options: Options) -> JobFuture<Job> {
        self.poller(options).submit(request)
    }

    /// Poll an existing job until it finishes
    pub fn await_job(&self, reference: JobReference, options: Options) -> JobFuture<Job> {
        self.poller(options).await_job(reference)
    }

    /// Run a query and wait for its rows
    ///
    /// The query runs in the `billing_project` option's project under a
    /// client-generated job id.
    ///
    /// # Returns
    /// A future resolving to the finished job and a lazy row sequence, or to
    /// `ClientError::Invalid` when no billing project is configured
    pub fn submit_query_and_poll(
        &self,
        query: impl Into<String>,
        options: Options,
    ) -> JobFuture<QueryResponse> {
        let options = self.call_options(options);
        let billing_project = Options::merge(&options, &self.connection.options()).billing_project;
        let project = match billing_project {
            Some(project) if !project.is_empty() => project,
            _ => {
                return JobFuture::ready(Err(ClientError::Invalid(
                    "billing_project is required to submit a query".to_string(),
                )));
            }
        };

        let job_id = format!("quarry_{}", Uuid::new_v4());
        info!("Submitting query job {} in project {}", job_id, project);
        let request =
            InsertJobRequest::new(project, JobConfiguration::query(query)).with_job_id(job_id);

        let connection = Arc::clone(&self.connection);
        JobPoller::new(Arc::clone(&connection), options.clone())
            .submit(request)
            .then(move |result| {
                let job = result?;
                let rows = RowSequence::new(connection, job.reference.clone(), options);
                Ok(QueryResponse { job, rows })
            })
    }

    fn poller(&self, options: Options) -> JobPoller {
        JobPoller::new(Arc::clone(&self.connection), self.call_options(options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{RecordedCall, ScriptedConnection};
    use quarry_core::domain::job::JobState;
    use quarry_core::domain::rows::Row;
    use quarry_core::dto::job::{JobList, QueryResultsPage};
    use serde_json::json;
    use std::time::Duration;

    fn fast() -> Options {
        Options::new()
            .with_initial_poll_interval(Duration::from_millis(100))
            .with_jitter(false)
    }

    fn inserted_request(mock: &ScriptedConnection) -> InsertJobRequest {
        mock.calls()
            .into_iter()
            .find_map(|(call, _)| match call {
                RecordedCall::InsertJob(request) => Some(request),
                _ => None,
            })
            .expect("insert_job call")
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_query_polls_until_done_and_returns_rows() {
        let mock = Arc::new(ScriptedConnection::new());
        let reference = JobReference::new("billing", "J1");
        mock.push_insert_job(Ok(Job::new(reference.clone(), JobState::Pending)));
        mock.push_get_job(Ok(Job::new(reference.clone(), JobState::Running)));
        mock.push_get_job(Ok(Job::new(reference.clone(), JobState::Running)));
        mock.push_get_job(Ok(Job::new(reference.clone(), JobState::Done)));
        mock.push_query_results(Ok(QueryResultsPage {
            rows: vec![
                Row::new(vec![json!("a")]),
                Row::new(vec![json!("b")]),
                Row::new(vec![json!("c")]),
            ],
            total_rows: Some(3),
            job_complete: true,
            ..Default::default()
        }));

        let client = Client::new(mock.clone()).with_options(fast().with_billing_project("billing"))
            .unwrap();
        let response = client
            .submit_query_and_poll("SELECT x FROM t", Options::new())
            .await
            .unwrap();

        assert_eq!(response.job.reference, reference);
        assert_eq!(response.rows.clone().collect_rows().await.unwrap().len(), 3);
        assert_eq!(mock.get_job_calls(), 3);

        let request = inserted_request(&mock);
        assert_eq!(request.project_id, "billing");
        assert!(request.job_id.as_deref().unwrap().starts_with("quarry_"));
        assert_eq!(
            request.configuration.query.unwrap().query,
            "SELECT x FROM t"
        );
    }

    #[tokio::test]
    async fn test_submit_query_requires_billing_project() {
        let mock = Arc::new(ScriptedConnection::new());
        let client = Client::new(mock.clone());

        let result = client.submit_query_and_poll("SELECT 1", Options::new()).await;

        assert!(matches!(result, Err(ClientError::Invalid(_))));
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_billing_project_may_come_from_connection() {
        let mock = Arc::new(
            ScriptedConnection::new().with_options(Options::new().with_billing_project("conn")),
        );
        mock.push_insert_job(Ok(Job::new(JobReference::new("conn", "J"), JobState::Done)));

        let client = Client::new(mock.clone());
        let response = client
            .submit_query_and_poll("SELECT 1", Options::new())
            .await
            .unwrap();

        assert_eq!(response.job.reference.project_id, "conn");
        assert_eq!(inserted_request(&mock).project_id, "conn");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_query_resolves_cancelled() {
        let mock = Arc::new(ScriptedConnection::new());
        mock.set_get_job_fallback(Ok(Job::new(JobReference::new("p", "J"), JobState::Running)));

        let client = Client::new(mock.clone()).with_options(fast().with_billing_project("p"))
            .unwrap();
        let future = client.submit_query_and_poll("SELECT 1", Options::new());
        future.cancel();

        assert!(matches!(future.await, Err(ClientError::Cancelled)));
        assert_eq!(mock.get_job_calls(), 0);
    }

    #[tokio::test]
    async fn test_get_job_not_found_is_not_retried() {
        let mock = Arc::new(ScriptedConnection::new());
        mock.push_get_job(Err(ClientError::NotFound("job missing".to_string())));

        let client = Client::new(mock.clone());
        let result = client
            .get_job(&JobRequest::new("p", "missing"), Options::new())
            .await;

        assert_eq!(result, Err(ClientError::NotFound("job missing".to_string())));
        assert_eq!(mock.get_job_calls(), 1);
    }

    #[tokio::test]
    async fn test_call_options_override_client_options() {
        let mock = Arc::new(ScriptedConnection::new());
        mock.push_delete_job(Ok(()));

        let client = Client::new(mock.clone()).with_options(
            Options::new()
                .with_billing_project("client")
                .with_request_timeout(Duration::from_secs(5)),
        )
        .unwrap();
        client
            .delete_job(
                &JobRequest::new("p", "j"),
                Options::new().with_billing_project("call"),
            )
            .await
            .unwrap();

        let (_, options) = &mock.calls()[0];
        assert_eq!(options.billing_project.as_deref(), Some("call"));
        assert_eq!(options.request_timeout, Some(Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_list_jobs_streams_every_page() {
        let mock = Arc::new(ScriptedConnection::new());
        let done = |id: &str| Job::new(JobReference::new("p", id), JobState::Done);
        mock.push_list_jobs(Ok(JobList {
            jobs: vec![done("a")],
            next_page_token: Some("next".to_string()),
        }));
        mock.push_list_jobs(Ok(JobList {
            jobs: vec![done("b")],
            next_page_token: None,
        }));

        let client = Client::new(mock.clone());
        let request = ListJobsRequest {
            project_id: "p".to_string(),
            ..Default::default()
        };
        let jobs = client
            .list_jobs(request, Options::new())
            .collect_jobs()
            .await
            .unwrap();

        assert_eq!(jobs.len(), 2);
        assert_eq!(mock.calls().len(), 2);
    }

    #[test]
    fn test_with_options_rejects_invalid_options() {
        let mock = Arc::new(ScriptedConnection::new());
        let result = Client::new(mock).with_options(
            Options::new().with_initial_poll_interval(Duration::ZERO),
        );
        assert!(matches!(result, Err(ClientError::Invalid(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_job_rejects_zero_interval_call_options() {
        let mock = Arc::new(ScriptedConnection::new());
        mock.set_get_job_fallback(Ok(Job::new(JobReference::new("p", "J"), JobState::Running)));

        let client = Client::new(mock.clone());
        let result = client
            .await_job(
                JobReference::new("p", "J"),
                Options::new()
                    .with_initial_poll_interval(Duration::ZERO)
                    .with_jitter(false),
            )
            .await;

        assert!(matches!(result, Err(ClientError::Invalid(_))));
        assert_eq!(mock.get_job_calls(), 0);
    }
}
