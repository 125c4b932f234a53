//! Span-emitting `Connection` decorator
//!
//! Every operation runs inside an `info` span named
//! `quarry::Connection::<operation>` that carries the job address and records
//! the outcome on exit.

use std::sync::Arc;

use async_trait::async_trait;
use quarry_core::domain::job::Job;
use quarry_core::dto::job::{
    InsertJobRequest, JobList, JobRequest, ListJobsRequest, QueryResultsPage, QueryResultsRequest,
};
use tracing::{Instrument, Span, debug, info_span};

use crate::connection::Connection;
use crate::error::Result;
use crate::options::Options;

#[derive(Debug)]
pub struct TracingConnection {
    child: Arc<dyn Connection>,
}

impl TracingConnection {
    pub fn new(child: Arc<dyn Connection>) -> Self {
        Self { child }
    }
}

/// Wraps `connection` in a `TracingConnection` when its options enable tracing
pub fn make_tracing_connection(connection: Arc<dyn Connection>) -> Arc<dyn Connection> {
    if connection.options().resolved_tracing_enabled() {
        Arc::new(TracingConnection::new(connection))
    } else {
        connection
    }
}

fn end_span<T>(span: &Span, result: Result<T>) -> Result<T> {
    let _entered = span.enter();
    match &result {
        Ok(_) => debug!("call succeeded"),
        Err(e) => debug!(error = %e, "call failed"),
    }
    result
}

#[async_trait]
impl Connection for TracingConnection {
    fn options(&self) -> Options {
        self.child.options()
    }

    async fn get_job(&self, request: &JobRequest, options: Options) -> Result<Job> {
        let span = info_span!(
            "quarry::Connection::get_job",
            project_id = %request.project_id,
            job_id = %request.job_id
        );
        let result = self
            .child
            .get_job(request, options)
            .instrument(span.clone())
            .await;
        end_span(&span, result)
    }

    async fn delete_job(&self, request: &JobRequest, options: Options) -> Result<()> {
        let span = info_span!(
            "quarry::Connection::delete_job",
            project_id = %request.project_id,
            job_id = %request.job_id
        );
        let result = self
            .child
            .delete_job(request, options)
            .instrument(span.clone())
            .await;
        end_span(&span, result)
    }

    async fn cancel_job(&self, request: &JobRequest, options: Options) -> Result<Job> {
        let span = info_span!(
            "quarry::Connection::cancel_job",
            project_id = %request.project_id,
            job_id = %request.job_id
        );
        let result = self
            .child
            .cancel_job(request, options)
            .instrument(span.clone())
            .await;
        end_span(&span, result)
    }

    async fn insert_job(&self, request: &InsertJobRequest, options: Options) -> Result<Job> {
        let span = info_span!(
            "quarry::Connection::insert_job",
            project_id = %request.project_id,
            job_id = request.job_id.as_deref().unwrap_or("")
        );
        let result = self
            .child
            .insert_job(request, options)
            .instrument(span.clone())
            .await;
        end_span(&span, result)
    }

    async fn list_jobs(&self, request: &ListJobsRequest, options: Options) -> Result<JobList> {
        let span = info_span!("quarry::Connection::list_jobs", project_id = %request.project_id);
        let result = self
            .child
            .list_jobs(request, options)
            .instrument(span.clone())
            .await;
        end_span(&span, result)
    }

    async fn get_query_results(
        &self,
        request: &QueryResultsRequest,
        options: Options,
    ) -> Result<QueryResultsPage> {
        let span = info_span!(
            "quarry::Connection::get_query_results",
            project_id = %request.job.project_id,
            job_id = %request.job.job_id
        );
        let result = self
            .child
            .get_query_results(request, options)
            .instrument(span.clone())
            .await;
        end_span(&span, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use crate::mock::ScriptedConnection;
    use quarry_core::domain::job::{JobReference, JobState};
    use std::sync::Mutex;
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    /// Collects the names of created spans
    struct SpanNames(Arc<Mutex<Vec<String>>>);

    impl<S: tracing::Subscriber> Layer<S> for SpanNames {
        fn on_new_span(
            &self,
            attrs: &tracing::span::Attributes<'_>,
            _id: &tracing::span::Id,
            _ctx: Context<'_, S>,
        ) {
            self.0.lock().unwrap().push(attrs.metadata().name().to_string());
        }
    }

    fn capture() -> (Arc<Mutex<Vec<String>>>, tracing::subscriber::DefaultGuard) {
        let names = Arc::new(Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::registry().with(SpanNames(names.clone()));
        (names, tracing::subscriber::set_default(subscriber))
    }

    #[tokio::test]
    async fn test_tracing_enabled_emits_spans() {
        let (names, _guard) = capture();
        let mock = Arc::new(ScriptedConnection::new().with_options(Options::new().with_tracing(true)));
        mock.push_get_job(Err(ClientError::NotFound("gone".to_string())));
        let conn = make_tracing_connection(mock.clone());

        let err = conn
            .get_job(&JobRequest::new("p", "j1"), Options::new())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(
            names
                .lock()
                .unwrap()
                .contains(&"quarry::Connection::get_job".to_string())
        );
    }

    #[tokio::test]
    async fn test_tracing_disabled_emits_no_spans() {
        let (names, _guard) = capture();
        let mock = Arc::new(ScriptedConnection::new());
        mock.push_get_job(Ok(Job::new(JobReference::new("p", "j1"), JobState::Done)));
        let conn = make_tracing_connection(mock.clone());

        conn.get_job(&JobRequest::new("p", "j1"), Options::new())
            .await
            .unwrap();
        assert!(
            !names
                .lock()
                .unwrap()
                .contains(&"quarry::Connection::get_job".to_string())
        );
    }

    #[tokio::test]
    async fn test_decorator_forwards_calls_and_options() {
        let mock = Arc::new(ScriptedConnection::new().with_options(Options::new().with_tracing(true)));
        mock.push_delete_job(Ok(()));
        let conn = TracingConnection::new(mock.clone());

        conn.delete_job(
            &JobRequest::new("p", "j1"),
            Options::new().with_billing_project("call"),
        )
        .await
        .unwrap();

        let calls = mock.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1.billing_project.as_deref(), Some("call"));
        assert_eq!(conn.options(), mock.options());
    }
}
