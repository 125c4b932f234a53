//! Scripted test doubles
//!
//! `ScriptedStub` stands in for the transport below `ConnectionImpl`;
//! `ScriptedConnection` stands in for a whole `Connection` above the poll
//! engine. Both answer from per-operation queues and record every call
//! together with the options it received.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use quarry_core::domain::job::Job;
use quarry_core::dto::job::{
    InsertJobRequest, JobList, JobRequest, ListJobsRequest, QueryResultsPage, QueryResultsRequest,
};
use quarry_core::status::StatusCode;

use crate::connection::Connection;
use crate::error::{ClientError, Result};
use crate::options::Options;
use crate::stub::{JobServiceStub, TransportError, TransportResult};

/// A call observed by a test double
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    InsertJob(InsertJobRequest),
    GetJob(JobRequest),
    DeleteJob(JobRequest),
    CancelJob(JobRequest),
    ListJobs(ListJobsRequest),
    GetQueryResults(QueryResultsRequest),
}

/// Queue of scripted responses with an optional repeating fallback
#[derive(Debug)]
struct Script<T> {
    queue: Mutex<VecDeque<T>>,
    fallback: Mutex<Option<T>>,
}

impl<T> Default for Script<T> {
    fn default() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(None),
        }
    }
}

impl<T: Clone> Script<T> {
    fn push(&self, response: T) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(response);
    }

    fn set_fallback(&self, response: T) {
        *self.fallback.lock().unwrap_or_else(PoisonError::into_inner) = Some(response);
    }

    fn next(&self) -> Option<T> {
        let scripted = self
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        scripted.or_else(|| {
            self.fallback
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        })
    }
}

#[derive(Debug, Default)]
struct CallLog(Mutex<Vec<(RecordedCall, Options)>>);

impl CallLog {
    fn record(&self, call: RecordedCall, options: &Options) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((call, options.clone()));
    }

    fn snapshot(&self) -> Vec<(RecordedCall, Options)> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

fn unscripted_transport(operation: &str) -> TransportError {
    TransportError::new(
        StatusCode::Internal,
        format!("no scripted response for {}", operation),
    )
}

fn unscripted(operation: &str) -> ClientError {
    ClientError::Internal(format!("no scripted response for {}", operation))
}

/// Scripted `JobServiceStub`
#[derive(Debug, Default)]
pub struct ScriptedStub {
    calls: CallLog,
    insert_job: Script<TransportResult<Job>>,
    get_job: Script<TransportResult<Job>>,
    delete_job: Script<TransportResult<()>>,
    cancel_job: Script<TransportResult<Job>>,
    list_jobs: Script<TransportResult<JobList>>,
    query_results: Script<TransportResult<QueryResultsPage>>,
}

impl ScriptedStub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_insert_job(&self, response: TransportResult<Job>) {
        self.insert_job.push(response);
    }

    pub fn push_get_job(&self, response: TransportResult<Job>) {
        self.get_job.push(response);
    }

    pub fn push_delete_job(&self, response: TransportResult<()>) {
        self.delete_job.push(response);
    }

    pub fn push_cancel_job(&self, response: TransportResult<Job>) {
        self.cancel_job.push(response);
    }

    pub fn push_list_jobs(&self, response: TransportResult<JobList>) {
        self.list_jobs.push(response);
    }

    pub fn push_query_results(&self, response: TransportResult<QueryResultsPage>) {
        self.query_results.push(response);
    }

    /// Calls received so far, with the effective options of each
    pub fn calls(&self) -> Vec<(RecordedCall, Options)> {
        self.calls.snapshot()
    }
}

#[async_trait]
impl JobServiceStub for ScriptedStub {
    async fn insert_job(&self, options: &Options, request: &InsertJobRequest) -> TransportResult<Job> {
        self.calls.record(RecordedCall::InsertJob(request.clone()), options);
        self.insert_job
            .next()
            .unwrap_or_else(|| Err(unscripted_transport("insert_job")))
    }

    async fn get_job(&self, options: &Options, request: &JobRequest) -> TransportResult<Job> {
        self.calls.record(RecordedCall::GetJob(request.clone()), options);
        self.get_job
            .next()
            .unwrap_or_else(|| Err(unscripted_transport("get_job")))
    }

    async fn delete_job(&self, options: &Options, request: &JobRequest) -> TransportResult<()> {
        self.calls.record(RecordedCall::DeleteJob(request.clone()), options);
        self.delete_job
            .next()
            .unwrap_or_else(|| Err(unscripted_transport("delete_job")))
    }

    async fn cancel_job(&self, options: &Options, request: &JobRequest) -> TransportResult<Job> {
        self.calls.record(RecordedCall::CancelJob(request.clone()), options);
        self.cancel_job
            .next()
            .unwrap_or_else(|| Err(unscripted_transport("cancel_job")))
    }

    async fn list_jobs(&self, options: &Options, request: &ListJobsRequest) -> TransportResult<JobList> {
        self.calls.record(RecordedCall::ListJobs(request.clone()), options);
        self.list_jobs
            .next()
            .unwrap_or_else(|| Err(unscripted_transport("list_jobs")))
    }

    async fn get_query_results(
        &self,
        options: &Options,
        request: &QueryResultsRequest,
    ) -> TransportResult<QueryResultsPage> {
        self.calls
            .record(RecordedCall::GetQueryResults(request.clone()), options);
        self.query_results
            .next()
            .unwrap_or_else(|| Err(unscripted_transport("get_query_results")))
    }
}

type Hook = Arc<dyn Fn() + Send + Sync>;

/// Scripted `Connection`
#[derive(Default)]
pub struct ScriptedConnection {
    options: Options,
    calls: CallLog,
    insert_job: Script<Result<Job>>,
    get_job: Script<Result<Job>>,
    delete_job: Script<Result<()>>,
    cancel_job: Script<Result<Job>>,
    list_jobs: Script<Result<JobList>>,
    query_results: Script<Result<QueryResultsPage>>,
    on_get_job: Mutex<Option<Hook>>,
}

impl std::fmt::Debug for ScriptedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedConnection")
            .field("options", &self.options)
            .field("calls", &self.calls)
            .finish_non_exhaustive()
    }
}

impl ScriptedConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the value returned by `Connection::options`
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn push_insert_job(&self, response: Result<Job>) {
        self.insert_job.push(response);
    }

    pub fn push_get_job(&self, response: Result<Job>) {
        self.get_job.push(response);
    }

    /// Answer used by `get_job` once its queue is empty
    pub fn set_get_job_fallback(&self, response: Result<Job>) {
        self.get_job.set_fallback(response);
    }

    pub fn push_delete_job(&self, response: Result<()>) {
        self.delete_job.push(response);
    }

    pub fn push_cancel_job(&self, response: Result<Job>) {
        self.cancel_job.push(response);
    }

    pub fn push_list_jobs(&self, response: Result<JobList>) {
        self.list_jobs.push(response);
    }

    pub fn push_query_results(&self, response: Result<QueryResultsPage>) {
        self.query_results.push(response);
    }

    /// Runs `hook` at the start of every `get_job` call, before it answers
    pub fn on_get_job(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_get_job.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(hook));
    }

    /// Calls received so far, with the per-call options of each
    pub fn calls(&self) -> Vec<(RecordedCall, Options)> {
        self.calls.snapshot()
    }

    /// Number of `get_job` calls received so far
    pub fn get_job_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|(call, _)| matches!(call, RecordedCall::GetJob(_)))
            .count()
    }
}

#[async_trait]
impl Connection for ScriptedConnection {
    fn options(&self) -> Options {
        self.options.clone()
    }

    async fn get_job(&self, request: &JobRequest, options: Options) -> Result<Job> {
        self.calls.record(RecordedCall::GetJob(request.clone()), &options);
        let hook = self
            .on_get_job
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(hook) = hook {
            hook();
        }
        self.get_job.next().unwrap_or_else(|| Err(unscripted("get_job")))
    }

    async fn delete_job(&self, request: &JobRequest, options: Options) -> Result<()> {
        self.calls.record(RecordedCall::DeleteJob(request.clone()), &options);
        self.delete_job
            .next()
            .unwrap_or_else(|| Err(unscripted("delete_job")))
    }

    async fn cancel_job(&self, request: &JobRequest, options: Options) -> Result<Job> {
        self.calls.record(RecordedCall::CancelJob(request.clone()), &options);
        self.cancel_job
            .next()
            .unwrap_or_else(|| Err(unscripted("cancel_job")))
    }

    async fn insert_job(&self, request: &InsertJobRequest, options: Options) -> Result<Job> {
        self.calls.record(RecordedCall::InsertJob(request.clone()), &options);
        self.insert_job
            .next()
            .unwrap_or_else(|| Err(unscripted("insert_job")))
    }

    async fn list_jobs(&self, request: &ListJobsRequest, options: Options) -> Result<JobList> {
        self.calls.record(RecordedCall::ListJobs(request.clone()), &options);
        self.list_jobs
            .next()
            .unwrap_or_else(|| Err(unscripted("list_jobs")))
    }

    async fn get_query_results(
        &self,
        request: &QueryResultsRequest,
        options: Options,
    ) -> Result<QueryResultsPage> {
        self.calls
            .record(RecordedCall::GetQueryResults(request.clone()), &options);
        self.query_results
            .next()
            .unwrap_or_else(|| Err(unscripted("get_query_results")))
    }
}
