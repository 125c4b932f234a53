//! Quarry job client
//!
//! Submits long-running jobs to a BigQuery-style job service, polls them until
//! they finish and hands the outcome back through a chainable `JobFuture`.
//!
//! The crate is layered:
//! - `Connection` exposes the job lifecycle operations. `ConnectionImpl`
//!   merges options and translates transport errors, `TracingConnection`
//!   wraps it in spans.
//! - `JobPoller` runs the submit-then-poll workflow with backoff, a retry
//!   budget and cancellation.
//! - `Client` ties both together and layers client-level options.
//!
//! # Example
//!
//! ```no_run
//! use quarry_client::{Client, Options};
//! use quarry_core::dto::job::JobRequest;
//!
//! #[tokio::main]
//! async fn main() -> quarry_client::Result<()> {
//!     let client = Client::connect(Options::new().with_access_token("ya29.token"))?;
//!
//!     let job = client
//!         .get_job(&JobRequest::new("my-project", "my-job"), Options::new())
//!         .await?;
//!
//!     println!("{} is {}", job.reference, job.state);
//!     Ok(())
//! }
//! ```

pub mod backoff;
pub mod client;
pub mod connection;
pub mod connection_impl;
pub mod error;
pub mod future;
pub mod job_stream;
pub mod options;
pub mod poller;
pub mod rest_stub;
pub mod rows;
pub mod stub;
pub mod tracing_connection;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

// Re-export commonly used types
pub use client::{Client, QueryResponse};
pub use connection::{Connection, make_connection};
pub use error::{ClientError, Result};
pub use future::{JobFuture, Promise};
pub use job_stream::JobStream;
pub use options::Options;
pub use poller::JobPoller;
pub use rows::RowSequence;
