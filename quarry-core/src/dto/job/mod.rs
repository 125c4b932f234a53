//! Job DTOs

use serde::{Deserialize, Serialize};

use crate::domain::job::{Job, JobConfiguration, JobReference, JobState};
use crate::domain::rows::{FieldSchema, Row};

/// Addresses an existing job for get, delete and cancel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    pub project_id: String,
    pub job_id: String,
    pub location: Option<String>,
}

impl JobRequest {
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

impl From<&JobReference> for JobRequest {
    fn from(reference: &JobReference) -> Self {
        Self {
            project_id: reference.project_id.clone(),
            job_id: reference.job_id.clone(),
            location: reference.location.clone(),
        }
    }
}

/// Creates a new job
///
/// A `job_id` chosen by the caller makes the insert addressable even when the
/// response is lost; the service assigns one when it is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertJobRequest {
    pub project_id: String,
    pub job_id: Option<String>,
    pub location: Option<String>,
    pub configuration: JobConfiguration,
}

impl InsertJobRequest {
    pub fn new(project_id: impl Into<String>, configuration: JobConfiguration) -> Self {
        Self {
            project_id: project_id.into(),
            job_id: None,
            location: None,
            configuration,
        }
    }

    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }
}

/// Lists the jobs of a project, newest first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListJobsRequest {
    pub project_id: String,
    pub state_filter: Option<JobState>,
    pub max_results: Option<u32>,
    pub page_token: Option<String>,
}

/// One page of `ListJobsRequest` results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobList {
    pub jobs: Vec<Job>,
    pub next_page_token: Option<String>,
}

/// Fetches one page of a finished query's rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResultsRequest {
    pub job: JobReference,
    pub page_token: Option<String>,
    pub max_results: Option<u32>,
}

/// One page of query result rows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResultsPage {
    pub schema: Vec<FieldSchema>,
    pub rows: Vec<Row>,
    pub total_rows: Option<u64>,
    pub page_token: Option<String>,
    pub job_complete: bool,
}
