//! Job poller
//!
//! Drives the submit-then-poll workflow of a single job on its own task and
//! publishes the terminal outcome through a `JobFuture`.

use std::sync::Arc;

use quarry_core::domain::job::{Job, JobOutcome, JobReference};
use quarry_core::dto::job::{InsertJobRequest, JobRequest};
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::connection::Connection;
use crate::error::{ClientError, Result};
use crate::future::{JobFuture, Promise};
use crate::options::{Options, PollingPolicy};

/// Starts polling workflows against one connection
#[derive(Debug, Clone)]
pub struct JobPoller {
    connection: Arc<dyn Connection>,
    options: Options,
    policy: PollingPolicy,
    /// Set when the merged options fail validation; every workflow resolves to it
    invalid: Option<ClientError>,
}

/// Workflow state
#[derive(Debug)]
enum Phase {
    Submitting(InsertJobRequest),
    Polling(JobReference),
    Resolved(Result<Job>),
}

impl JobPoller {
    /// Creates a poller.
    ///
    /// `options` is the per-call layer forwarded with every connection call;
    /// the poll schedule is resolved from it merged over the connection's own
    /// options. If that merged snapshot is invalid, every workflow started by
    /// this poller resolves to `ClientError::Invalid` without a network call.
    pub fn new(connection: Arc<dyn Connection>, options: Options) -> Self {
        let merged = Options::merge(&options, &connection.options());
        let invalid = merged.validate().err();
        Self {
            connection,
            options,
            policy: merged.polling_policy(),
            invalid,
        }
    }

    pub fn policy(&self) -> &PollingPolicy {
        &self.policy
    }

    /// Inserts a job and polls it until it finishes
    pub fn submit(&self, request: InsertJobRequest) -> JobFuture<Job> {
        self.spawn(Phase::Submitting(request))
    }

    /// Polls an existing job until it finishes
    pub fn await_job(&self, reference: JobReference) -> JobFuture<Job> {
        self.spawn(Phase::Polling(reference))
    }

    fn spawn(&self, phase: Phase) -> JobFuture<Job> {
        if let Some(err) = &self.invalid {
            warn!("Refusing to start workflow: {}", err);
            return JobFuture::ready(Err(err.clone()));
        }

        let (promise, future) = Promise::channel();
        let workflow = Workflow {
            connection: Arc::clone(&self.connection),
            options: self.options.clone(),
            policy: self.policy.clone(),
            token: promise.cancellation_token(),
        };

        tokio::spawn(async move {
            let result = workflow.run(phase).await;
            promise.set_value(result);
        });

        future
    }
}

struct Workflow {
    connection: Arc<dyn Connection>,
    options: Options,
    policy: PollingPolicy,
    token: CancellationToken,
}

impl Workflow {
    async fn run(self, mut phase: Phase) -> Result<Job> {
        loop {
            phase = match phase {
                Phase::Submitting(request) => self.submit(request).await,
                Phase::Polling(reference) => Phase::Resolved(self.poll(reference).await),
                Phase::Resolved(result) => return result,
            };
        }
    }

    async fn submit(&self, request: InsertJobRequest) -> Phase {
        if self.token.is_cancelled() {
            info!("Submission to project {} cancelled", request.project_id);
            return Phase::Resolved(Err(ClientError::Cancelled));
        }

        match self.connection.insert_job(&request, self.options.clone()).await {
            Ok(job) => match job.outcome() {
                JobOutcome::InProgress => {
                    info!("Submitted job {} ({})", job.reference, job.state);
                    Phase::Polling(job.reference)
                }
                outcome => {
                    info!("Job {} finished on submission", job.reference);
                    Phase::Resolved(finish(job, outcome))
                }
            },
            Err(e) => {
                warn!("Failed to submit job to project {}: {}", request.project_id, e);
                Phase::Resolved(Err(e))
            }
        }
    }

    async fn poll(&self, reference: JobReference) -> Result<Job> {
        let request = JobRequest::from(&reference);
        let started = Instant::now();
        let mut backoff = Backoff::new(self.policy.clone());
        let mut attempts: u32 = 0;
        let mut last_error: Option<ClientError> = None;

        loop {
            if self.token.is_cancelled() {
                info!("Polling of job {} cancelled after {} attempt(s)", reference, attempts);
                return Err(ClientError::Cancelled);
            }

            let elapsed = started.elapsed();
            let out_of_attempts = self.policy.max_attempts.is_some_and(|max| attempts >= max);
            if out_of_attempts || elapsed >= self.policy.max_duration {
                warn!(
                    "Giving up on job {} after {} attempt(s) in {:?}",
                    reference, attempts, elapsed
                );
                return Err(ClientError::Exhausted {
                    attempts,
                    elapsed,
                    last_error: last_error.map(Box::new),
                });
            }

            let delay = backoff
                .next_delay()
                .min(self.policy.max_duration - elapsed);
            tokio::select! {
                biased;
                _ = self.token.cancelled() => {
                    info!("Polling of job {} cancelled while waiting", reference);
                    return Err(ClientError::Cancelled);
                }
                _ = sleep(delay) => {}
            }

            attempts += 1;
            debug!("Polling job {} (attempt {})", reference, attempts);

            match self.connection.get_job(&request, self.options.clone()).await {
                Ok(job) => match job.outcome() {
                    JobOutcome::InProgress => {
                        debug!("Job {} is {}", reference, job.state);
                    }
                    outcome => {
                        info!("Job {} finished after {} poll(s)", reference, attempts);
                        return finish(job, outcome);
                    }
                },
                Err(e) if e.is_transient() => {
                    debug!("Transient error polling job {}: {}", reference, e);
                    last_error = Some(e);
                }
                Err(e) => {
                    warn!("Polling job {} failed: {}", reference, e);
                    return Err(e);
                }
            }
        }
    }
}

fn finish(job: Job, outcome: JobOutcome) -> Result<Job> {
    match outcome {
        JobOutcome::Failed(detail) => Err(ClientError::JobFailed {
            job_id: job.reference.job_id,
            detail,
        }),
        JobOutcome::Succeeded | JobOutcome::InProgress => Ok(job),
    }
}
