//! REST transport for the job service
//!
//! Talks to a BigQuery v2 style `jobs` API over HTTP with JSON bodies. Each
//! method sends one request; the endpoint, timeout and bearer token come from
//! the effective options of the call.

use async_trait::async_trait;
use quarry_core::domain::job::Job;
use quarry_core::dto::job::{
    InsertJobRequest, JobList, JobRequest, ListJobsRequest, QueryResultsPage, QueryResultsRequest,
};
use quarry_core::status::StatusCode;
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;

use crate::options::Options;
use crate::stub::{JobServiceStub, TransportError, TransportResult};

/// `JobServiceStub` backed by `reqwest`
#[derive(Debug, Clone, Default)]
pub struct RestJobServiceStub {
    /// HTTP client instance
    client: Client,
}

impl RestJobServiceStub {
    /// Create a stub with a default HTTP client
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// Create a stub with a custom HTTP client
    ///
    /// This allows you to configure proxies, TLS settings, connection pools,
    /// etc. Per-request timeouts still come from `Options::request_timeout`.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Appends `segments` to `{endpoint}/bigquery/v2/projects`.
    ///
    /// Each segment is percent-encoded, so ids containing `/`, `?` or `#`
    /// stay within their own path segment.
    fn api_url(options: &Options, segments: &[&str]) -> TransportResult<Url> {
        let endpoint = options.resolved_endpoint();
        let mut url = Url::parse(&endpoint).map_err(|e| {
            TransportError::new(
                StatusCode::InvalidArgument,
                format!("invalid endpoint '{}': {}", endpoint, e),
            )
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                TransportError::new(
                    StatusCode::InvalidArgument,
                    format!("endpoint '{}' cannot carry a path", endpoint),
                )
            })?
            .pop_if_empty()
            .extend(["bigquery", "v2", "projects"])
            .extend(segments);
        Ok(url)
    }

    fn jobs_url(options: &Options, project_id: &str) -> TransportResult<Url> {
        Self::api_url(options, &[project_id, "jobs"])
    }

    fn job_url(options: &Options, request: &JobRequest, action: Option<&str>) -> TransportResult<Url> {
        let mut segments = vec![request.project_id.as_str(), "jobs", request.job_id.as_str()];
        segments.extend(action);
        Self::api_url(options, &segments)
    }

    /// Builds a request carrying the call's timeout and credentials
    fn request(&self, method: Method, url: Url, options: &Options) -> RequestBuilder {
        let mut builder = self.client.request(method, url);
        if let Some(timeout) = options.request_timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(token) = &options.access_token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    fn location_query(location: &Option<String>) -> Vec<(&'static str, String)> {
        location
            .iter()
            .map(|location| ("location", location.clone()))
            .collect()
    }

    /// Sends the request and rejects non-success statuses
    async fn send(builder: RequestBuilder) -> TransportResult<reqwest::Response> {
        let response = builder.send().await.map_err(from_reqwest)?;
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(TransportError::new(
                StatusCode::from_http(status.as_u16()),
                error_message(&error_text),
            ));
        }

        Ok(response)
    }

    /// Handle an API response and deserialize JSON
    async fn handle_response<T: DeserializeOwned>(builder: RequestBuilder) -> TransportResult<T> {
        Self::send(builder)
            .await?
            .json()
            .await
            .map_err(|e| {
                TransportError::new(
                    StatusCode::Internal,
                    format!("Failed to parse JSON response: {}", e),
                )
            })
    }
}

#[async_trait]
impl JobServiceStub for RestJobServiceStub {
    async fn insert_job(&self, options: &Options, request: &InsertJobRequest) -> TransportResult<Job> {
        let url = Self::jobs_url(options, &request.project_id)?;
        let body = wire::InsertJob::from(request);
        let job: wire::Job =
            Self::handle_response(self.request(Method::POST, url, options).json(&body)).await?;

        job.into_domain()
    }

    async fn get_job(&self, options: &Options, request: &JobRequest) -> TransportResult<Job> {
        let url = Self::job_url(options, request, None)?;
        let job: wire::Job = Self::handle_response(
            self.request(Method::GET, url, options)
                .query(&Self::location_query(&request.location)),
        )
        .await?;

        job.into_domain()
    }

    async fn delete_job(&self, options: &Options, request: &JobRequest) -> TransportResult<()> {
        let url = Self::job_url(options, request, Some("delete"))?;
        Self::send(
            self.request(Method::DELETE, url, options)
                .query(&Self::location_query(&request.location)),
        )
        .await?;

        Ok(())
    }

    async fn cancel_job(&self, options: &Options, request: &JobRequest) -> TransportResult<Job> {
        let url = Self::job_url(options, request, Some("cancel"))?;
        let response: wire::CancelResponse = Self::handle_response(
            self.request(Method::POST, url, options)
                .query(&Self::location_query(&request.location)),
        )
        .await?;

        response.job.into_domain()
    }

    async fn list_jobs(&self, options: &Options, request: &ListJobsRequest) -> TransportResult<JobList> {
        let url = Self::jobs_url(options, &request.project_id)?;
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(state) = request.state_filter {
            query.push(("stateFilter", state.to_string().to_lowercase()));
        }
        if let Some(max) = request.max_results {
            query.push(("maxResults", max.to_string()));
        }
        if let Some(token) = &request.page_token {
            query.push(("pageToken", token.clone()));
        }

        let response: wire::JobListResponse =
            Self::handle_response(self.request(Method::GET, url, options).query(&query)).await?;

        Ok(JobList {
            jobs: response
                .jobs
                .into_iter()
                .map(wire::Job::into_domain)
                .collect::<TransportResult<Vec<_>>>()?,
            next_page_token: response.next_page_token,
        })
    }

    async fn get_query_results(
        &self,
        options: &Options,
        request: &QueryResultsRequest,
    ) -> TransportResult<QueryResultsPage> {
        let url = Self::api_url(
            options,
            &[request.job.project_id.as_str(), "queries", request.job.job_id.as_str()],
        )?;
        let mut query = Self::location_query(&request.job.location);
        if let Some(token) = &request.page_token {
            query.push(("pageToken", token.clone()));
        }
        if let Some(max) = request.max_results {
            query.push(("maxResults", max.to_string()));
        }

        let response: wire::QueryResultsResponse =
            Self::handle_response(self.request(Method::GET, url, options).query(&query)).await?;

        Ok(response.into_domain())
    }
}

fn from_reqwest(err: reqwest::Error) -> TransportError {
    let code = if err.is_timeout() {
        StatusCode::DeadlineExceeded
    } else if err.is_connect() || err.is_request() {
        StatusCode::Unavailable
    } else if err.is_decode() {
        StatusCode::Internal
    } else {
        StatusCode::Unknown
    };
    TransportError::new(code, format!("HTTP request failed: {}", err))
}

/// Extracts `error.message` from a JSON error body, falling back to the raw text
fn error_message(body: &str) -> String {
    serde_json::from_str::<wire::ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| body.to_string())
}

/// JSON shapes of the REST API
mod wire {
    use std::collections::BTreeMap;

    use quarry_core::domain::job::{self as domain, JobState};
    use quarry_core::domain::rows::{FieldSchema, Row};
    use quarry_core::dto::job::{InsertJobRequest, QueryResultsPage};
    use quarry_core::status::StatusCode;
    use serde::{Deserialize, Serialize};

    use crate::stub::{TransportError, TransportResult};

    #[derive(Debug, Default, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct JobReference {
        pub project_id: String,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        pub job_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub location: Option<String>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ErrorProto {
        #[serde(default)]
        pub reason: String,
        #[serde(default)]
        pub message: String,
        #[serde(default)]
        pub location: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct JobStatus {
        pub state: String,
        pub error_result: Option<ErrorProto>,
        #[serde(default)]
        pub errors: Vec<ErrorProto>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct TableReference {
        pub project_id: String,
        pub dataset_id: String,
        pub table_id: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct QueryConfig {
        pub query: String,
        #[serde(default)]
        pub use_legacy_sql: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub destination_table: Option<TableReference>,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct JobConfiguration {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub query: Option<QueryConfig>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        pub labels: BTreeMap<String, String>,
        #[serde(default)]
        pub dry_run: bool,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct JobStatistics {
        pub creation_time: Option<String>,
        pub end_time: Option<String>,
    }

    /// Job resource; list responses put `state` and `errorResult` at the top level
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Job {
        pub job_reference: JobReference,
        pub status: Option<JobStatus>,
        pub state: Option<String>,
        pub error_result: Option<ErrorProto>,
        #[serde(default)]
        pub configuration: JobConfiguration,
        pub statistics: Option<JobStatistics>,
    }

    #[derive(Debug, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct InsertJob {
        pub job_reference: JobReference,
        pub configuration: JobConfiguration,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct JobListResponse {
        #[serde(default)]
        pub jobs: Vec<Job>,
        pub next_page_token: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct CancelResponse {
        pub job: Job,
    }

    #[derive(Debug, Deserialize)]
    pub struct Field {
        pub name: String,
        #[serde(rename = "type")]
        pub field_type: String,
    }

    #[derive(Debug, Default, Deserialize)]
    pub struct Schema {
        #[serde(default)]
        pub fields: Vec<Field>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Cell {
        #[serde(default)]
        pub v: serde_json::Value,
    }

    #[derive(Debug, Deserialize)]
    pub struct TableRow {
        #[serde(default)]
        pub f: Vec<Cell>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct QueryResultsResponse {
        #[serde(default)]
        pub schema: Schema,
        #[serde(default)]
        pub rows: Vec<TableRow>,
        pub total_rows: Option<String>,
        pub page_token: Option<String>,
        #[serde(default)]
        pub job_complete: bool,
    }

    #[derive(Debug, Deserialize)]
    pub struct ErrorBody {
        pub message: String,
    }

    #[derive(Debug, Deserialize)]
    pub struct ErrorEnvelope {
        pub error: ErrorBody,
    }

    fn parse_state(state: &str) -> TransportResult<JobState> {
        match state.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(JobState::Pending),
            "RUNNING" => Ok(JobState::Running),
            "DONE" => Ok(JobState::Done),
            "ERROR" => Ok(JobState::Error),
            other => Err(TransportError::new(
                StatusCode::Internal,
                format!("unknown job state '{}'", other),
            )),
        }
    }

    fn parse_millis(value: Option<String>) -> Option<chrono::DateTime<chrono::Utc>> {
        value
            .and_then(|v| v.parse::<i64>().ok())
            .and_then(chrono::DateTime::from_timestamp_millis)
    }

    impl From<ErrorProto> for domain::ErrorDetail {
        fn from(proto: ErrorProto) -> Self {
            Self {
                reason: proto.reason,
                message: proto.message,
                location: proto.location,
            }
        }
    }

    impl From<TableReference> for domain::TableReference {
        fn from(table: TableReference) -> Self {
            Self {
                project_id: table.project_id,
                dataset_id: table.dataset_id,
                table_id: table.table_id,
            }
        }
    }

    impl From<&domain::TableReference> for TableReference {
        fn from(table: &domain::TableReference) -> Self {
            Self {
                project_id: table.project_id.clone(),
                dataset_id: table.dataset_id.clone(),
                table_id: table.table_id.clone(),
            }
        }
    }

    impl From<&domain::JobConfiguration> for JobConfiguration {
        fn from(config: &domain::JobConfiguration) -> Self {
            Self {
                query: config.query.as_ref().map(|q| QueryConfig {
                    query: q.query.clone(),
                    use_legacy_sql: q.use_legacy_sql,
                    destination_table: q.destination_table.as_ref().map(TableReference::from),
                }),
                labels: config.labels.clone(),
                dry_run: config.dry_run,
            }
        }
    }

    impl From<&InsertJobRequest> for InsertJob {
        fn from(request: &InsertJobRequest) -> Self {
            Self {
                job_reference: JobReference {
                    project_id: request.project_id.clone(),
                    job_id: request.job_id.clone().unwrap_or_default(),
                    location: request.location.clone(),
                },
                configuration: JobConfiguration::from(&request.configuration),
            }
        }
    }

    impl Job {
        pub fn into_domain(self) -> TransportResult<domain::Job> {
            let (state, error_result, errors) = match self.status {
                Some(status) => (status.state, status.error_result, status.errors),
                None => (
                    self.state.ok_or_else(|| {
                        TransportError::new(StatusCode::Internal, "job response has no state")
                    })?,
                    self.error_result,
                    Vec::new(),
                ),
            };
            let (creation_time, end_time) = match self.statistics {
                Some(stats) => (parse_millis(stats.creation_time), parse_millis(stats.end_time)),
                None => (None, None),
            };

            let mut destination_table = None;
            let query = self.configuration.query.map(|q| {
                destination_table = q.destination_table.map(domain::TableReference::from);
                domain::QueryJobConfig {
                    query: q.query,
                    use_legacy_sql: q.use_legacy_sql,
                    destination_table: destination_table.clone(),
                }
            });

            Ok(domain::Job {
                reference: domain::JobReference {
                    project_id: self.job_reference.project_id,
                    job_id: self.job_reference.job_id,
                    location: self.job_reference.location,
                },
                state: parse_state(&state)?,
                error_result: error_result.map(Into::into),
                errors: errors.into_iter().map(Into::into).collect(),
                configuration: domain::JobConfiguration {
                    query,
                    labels: self.configuration.labels,
                    dry_run: self.configuration.dry_run,
                },
                destination_table,
                creation_time,
                end_time,
            })
        }
    }

    impl QueryResultsResponse {
        pub fn into_domain(self) -> QueryResultsPage {
            QueryResultsPage {
                schema: self
                    .schema
                    .fields
                    .into_iter()
                    .map(|f| FieldSchema {
                        name: f.name,
                        field_type: f.field_type,
                    })
                    .collect(),
                rows: self
                    .rows
                    .into_iter()
                    .map(|row| Row::new(row.f.into_iter().map(|cell| cell.v).collect()))
                    .collect(),
                total_rows: self.total_rows.and_then(|n| n.parse().ok()),
                page_token: self.page_token,
                job_complete: self.job_complete,
            }
        }
    }
}
