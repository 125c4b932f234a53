//! Lazily paginated job listing

use std::collections::VecDeque;
use std::sync::Arc;

use quarry_core::domain::job::Job;
use quarry_core::dto::job::ListJobsRequest;
use tracing::debug;

use crate::connection::Connection;
use crate::error::Result;
use crate::options::Options;

/// Jobs of a project, fetched one `list_jobs` page at a time
///
/// The request's `page_token` is the starting point; `max_results` sizes
/// each page.
#[derive(Debug, Clone)]
pub struct JobStream {
    connection: Arc<dyn Connection>,
    options: Options,
    request: ListJobsRequest,
    buffer: VecDeque<Job>,
    done: bool,
}

impl JobStream {
    pub fn new(connection: Arc<dyn Connection>, request: ListJobsRequest, options: Options) -> Self {
        Self {
            connection,
            options,
            request,
            buffer: VecDeque::new(),
            done: false,
        }
    }

    /// Returns the next job, fetching a page when the buffer is empty.
    ///
    /// A failed fetch is returned once and ends the stream.
    pub async fn next(&mut self) -> Option<Result<Job>> {
        loop {
            if let Some(job) = self.buffer.pop_front() {
                return Some(Ok(job));
            }
            if self.done {
                return None;
            }
            if let Err(e) = self.fetch_page().await {
                self.done = true;
                return Some(Err(e));
            }
        }
    }

    /// Drains the remaining jobs
    pub async fn collect_jobs(mut self) -> Result<Vec<Job>> {
        let mut jobs = Vec::new();
        while let Some(job) = self.next().await {
            jobs.push(job?);
        }
        Ok(jobs)
    }

    async fn fetch_page(&mut self) -> Result<()> {
        let page = self
            .connection
            .list_jobs(&self.request, self.options.clone())
            .await?;

        debug!(
            "Fetched {} job(s) for project {}",
            page.jobs.len(),
            self.request.project_id
        );

        self.buffer.extend(page.jobs);
        self.done = page.next_page_token.is_none();
        self.request.page_token = page.next_page_token;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use crate::mock::{RecordedCall, ScriptedConnection};
    use quarry_core::domain::job::{JobReference, JobState};
    use quarry_core::dto::job::JobList;

    fn page(ids: &[&str], token: Option<&str>) -> JobList {
        JobList {
            jobs: ids
                .iter()
                .map(|id| Job::new(JobReference::new("p", *id), JobState::Done))
                .collect(),
            next_page_token: token.map(str::to_string),
        }
    }

    fn request() -> ListJobsRequest {
        ListJobsRequest {
            project_id: "p".to_string(),
            max_results: Some(2),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_follows_page_tokens() {
        let mock = Arc::new(ScriptedConnection::new());
        mock.push_list_jobs(Ok(page(&["a", "b"], Some("t1"))));
        mock.push_list_jobs(Ok(page(&[], Some("t2"))));
        mock.push_list_jobs(Ok(page(&["c"], None)));

        let jobs = JobStream::new(mock.clone(), request(), Options::new())
            .collect_jobs()
            .await
            .unwrap();

        let ids: Vec<&str> = jobs.iter().map(|j| j.reference.job_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);

        let tokens: Vec<Option<String>> = mock
            .calls()
            .into_iter()
            .map(|(call, _)| match call {
                RecordedCall::ListJobs(request) => {
                    assert_eq!(request.max_results, Some(2));
                    request.page_token
                }
                other => panic!("unexpected call {:?}", other),
            })
            .collect();
        assert_eq!(
            tokens,
            vec![None, Some("t1".to_string()), Some("t2".to_string())]
        );
    }

    #[tokio::test]
    async fn test_pages_are_fetched_on_demand() {
        let mock = Arc::new(ScriptedConnection::new());
        mock.push_list_jobs(Ok(page(&["a", "b"], Some("t1"))));

        let mut jobs = JobStream::new(mock.clone(), request(), Options::new());
        assert!(mock.calls().is_empty());

        jobs.next().await.unwrap().unwrap();
        jobs.next().await.unwrap().unwrap();
        assert_eq!(mock.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_error_ends_stream() {
        let mock = Arc::new(ScriptedConnection::new());
        mock.push_list_jobs(Ok(page(&["a"], Some("t1"))));
        mock.push_list_jobs(Err(ClientError::PermissionDenied("denied".to_string())));

        let mut jobs = JobStream::new(mock.clone(), request(), Options::new());
        assert!(jobs.next().await.unwrap().is_ok());
        assert_eq!(
            jobs.next().await,
            Some(Err(ClientError::PermissionDenied("denied".to_string())))
        );
        assert_eq!(jobs.next().await, None);
    }
}
