//! Job domain types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fully qualified address of a job.
///
/// The job id is assigned when the job is inserted and never changes after
/// that; the location is optional because the service can infer it for most
/// projects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobReference {
    pub project_id: String,
    pub job_id: String,
    pub location: Option<String>,
}

impl JobReference {
    pub fn new(project_id: impl Into<String>, job_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            job_id: job_id.into(),
            location: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

impl std::fmt::Display for JobReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{}:{}.{}", self.project_id, location, self.job_id),
            None => write!(f, "{}.{}", self.project_id, self.job_id),
        }
    }
}

/// Lifecycle state reported by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Running,
    Done,
    Error,
}

impl JobState {
    /// `Done` and `Error` end a poll loop.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Done => "DONE",
            Self::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Error reported by the service for a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub reason: String,
    pub message: String,
    pub location: Option<String>,
}

impl ErrorDetail {
    pub fn new(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            message: message.into(),
            location: None,
        }
    }
}

impl std::fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.reason, self.message)
    }
}

/// Destination of a job's output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableReference {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
}

/// Query part of a job configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryJobConfig {
    pub query: String,
    pub use_legacy_sql: bool,
    pub destination_table: Option<TableReference>,
}

impl QueryJobConfig {
    /// A standard-SQL query with no explicit destination
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            use_legacy_sql: false,
            destination_table: None,
        }
    }
}

/// What a job should do
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfiguration {
    pub query: Option<QueryJobConfig>,
    pub labels: BTreeMap<String, String>,
    pub dry_run: bool,
}

impl JobConfiguration {
    pub fn query(query: impl Into<String>) -> Self {
        Self {
            query: Some(QueryJobConfig::new(query)),
            ..Default::default()
        }
    }
}

/// Job record as observed by the client
///
/// The client never changes `state`; new values only arrive by fetching the
/// job again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub reference: JobReference,
    pub state: JobState,
    /// Set when the job failed as a whole
    pub error_result: Option<ErrorDetail>,
    /// Non-fatal errors collected while the job ran
    #[serde(default)]
    pub errors: Vec<ErrorDetail>,
    #[serde(default)]
    pub configuration: JobConfiguration,
    pub destination_table: Option<TableReference>,
    pub creation_time: Option<chrono::DateTime<chrono::Utc>>,
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
}

/// How a fetched job should be interpreted by a poll loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    InProgress,
    Succeeded,
    Failed(ErrorDetail),
}

impl Job {
    /// A job in `state` with no error, configuration or timestamps
    pub fn new(reference: JobReference, state: JobState) -> Self {
        Self {
            reference,
            state,
            error_result: None,
            errors: Vec::new(),
            configuration: JobConfiguration::default(),
            destination_table: None,
            creation_time: None,
            end_time: None,
        }
    }

    pub fn with_error(mut self, detail: ErrorDetail) -> Self {
        self.error_result = Some(detail);
        self
    }

    /// Classifies the job for polling.
    ///
    /// `Done` counts as success only when no `error_result` is populated; a
    /// `Done` job carrying an error detail is a failure. An `Error` job with
    /// no detail gets a synthesized one so callers always see a reason.
    pub fn outcome(&self) -> JobOutcome {
        if !self.state.is_terminal() {
            return JobOutcome::InProgress;
        }
        match (self.state, &self.error_result) {
            (_, Some(detail)) => JobOutcome::Failed(detail.clone()),
            (JobState::Done, None) => JobOutcome::Succeeded,
            (_, None) => JobOutcome::Failed(ErrorDetail::new(
                "unknown",
                format!("job {} reported ERROR without details", self.reference.job_id),
            )),
        }
    }
}
