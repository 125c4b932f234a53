//! Configuration module
//!
//! Turns CLI settings into client `Options`.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use quarry_client::{Client, Options};
use tracing::debug;

/// CLI configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Job service endpoint, client default when unset
    pub endpoint: Option<String>,
    /// Project owning the jobs
    pub project: Option<String>,
    /// Bearer token sent with every request
    pub access_token: Option<String>,
    /// Job location
    pub location: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_wait_secs: Option<u64>,
    pub max_polls: Option<u32>,
    /// Wrap the connection in the tracing decorator
    pub trace: bool,
}

impl Config {
    /// Client-wide options for these settings
    pub fn options(&self) -> Options {
        Options {
            endpoint: self.endpoint.clone(),
            request_timeout: self.timeout_secs.map(Duration::from_secs),
            access_token: self.access_token.clone(),
            billing_project: self.project.clone(),
            max_poll_duration: self.max_wait_secs.map(Duration::from_secs),
            max_poll_attempts: self.max_polls,
            tracing_enabled: self.trace.then_some(true),
            ..Options::default()
        }
    }

    /// Project to operate on
    pub fn project(&self) -> Result<&str> {
        match self.project.as_deref() {
            Some(project) if !project.is_empty() => Ok(project),
            _ => bail!("No project configured; pass --project or set QUARRY_PROJECT"),
        }
    }

    /// Builds a client with the default REST connection
    pub fn client(&self) -> Result<Client> {
        let options = self.options();
        debug!("Using job service at {}", options.resolved_endpoint());
        Client::connect(options).context("Invalid client configuration")
    }
}
