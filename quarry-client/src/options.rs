//! Client configuration
//!
//! `Options` carries one optional value per recognized setting. Connections
//! keep a client-wide `Options`; every call may pass another one whose set
//! fields take precedence. Unset fields resolve to the defaults documented on
//! each getter.

use std::collections::BTreeSet;
use std::time::Duration;

use quarry_core::status::StatusCode;

use crate::error::{ClientError, Result};

/// Endpoint used when no `endpoint` option is set
pub const DEFAULT_ENDPOINT: &str = "https://bigquery.googleapis.com";

const DEFAULT_INITIAL_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_MAX_POLL_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_MAX_POLL_DURATION: Duration = Duration::from_secs(30 * 60);
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Layered client configuration
#[derive(Clone, Default, PartialEq)]
pub struct Options {
    /// Base URL of the job service
    pub endpoint: Option<String>,
    /// Per-request timeout enforced by the transport
    pub request_timeout: Option<Duration>,
    /// Bearer token sent with every request
    pub access_token: Option<String>,
    /// Project that submitted queries run in and are billed to
    pub billing_project: Option<String>,
    /// Upper bound on the total time spent polling one job
    pub max_poll_duration: Option<Duration>,
    /// Upper bound on the number of status checks for one job
    pub max_poll_attempts: Option<u32>,
    /// Delay before the first status check
    pub initial_poll_interval: Option<Duration>,
    /// Largest delay between two status checks
    pub max_poll_interval: Option<Duration>,
    /// Growth factor applied to the delay after each unfinished poll
    pub backoff_multiplier: Option<f64>,
    /// Randomize poll delays
    pub jitter: Option<bool>,
    /// Transport statuses classified as transient
    pub retryable_statuses: Option<BTreeSet<StatusCode>>,
    /// Wrap connections in a span-emitting decorator
    pub tracing_enabled: Option<bool>,
}

/// Poll schedule and budget resolved from `Options`
#[derive(Debug, Clone, PartialEq)]
pub struct PollingPolicy {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
    pub jitter: bool,
    pub max_duration: Duration,
    pub max_attempts: Option<u32>,
}

fn pick<T: Clone>(preferred: &Option<T>, fallback: &Option<T>) -> Option<T> {
    preferred.as_ref().or(fallback.as_ref()).cloned()
}

impl Options {
    /// Creates an empty set of options
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges two layers into a new snapshot.
    ///
    /// Every field set in `preferred` wins; the rest come from `fallback`.
    /// Neither input is modified.
    pub fn merge(preferred: &Options, fallback: &Options) -> Options {
        Options {
            endpoint: pick(&preferred.endpoint, &fallback.endpoint),
            request_timeout: pick(&preferred.request_timeout, &fallback.request_timeout),
            access_token: pick(&preferred.access_token, &fallback.access_token),
            billing_project: pick(&preferred.billing_project, &fallback.billing_project),
            max_poll_duration: pick(&preferred.max_poll_duration, &fallback.max_poll_duration),
            max_poll_attempts: pick(&preferred.max_poll_attempts, &fallback.max_poll_attempts),
            initial_poll_interval: pick(
                &preferred.initial_poll_interval,
                &fallback.initial_poll_interval,
            ),
            max_poll_interval: pick(&preferred.max_poll_interval, &fallback.max_poll_interval),
            backoff_multiplier: pick(&preferred.backoff_multiplier, &fallback.backoff_multiplier),
            jitter: pick(&preferred.jitter, &fallback.jitter),
            retryable_statuses: pick(&preferred.retryable_statuses, &fallback.retryable_statuses),
            tracing_enabled: pick(&preferred.tracing_enabled, &fallback.tracing_enabled),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_billing_project(mut self, project: impl Into<String>) -> Self {
        self.billing_project = Some(project.into());
        self
    }

    pub fn with_max_poll_duration(mut self, duration: Duration) -> Self {
        self.max_poll_duration = Some(duration);
        self
    }

    pub fn with_max_poll_attempts(mut self, attempts: u32) -> Self {
        self.max_poll_attempts = Some(attempts);
        self
    }

    pub fn with_initial_poll_interval(mut self, interval: Duration) -> Self {
        self.initial_poll_interval = Some(interval);
        self
    }

    pub fn with_max_poll_interval(mut self, interval: Duration) -> Self {
        self.max_poll_interval = Some(interval);
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = Some(multiplier);
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = Some(jitter);
        self
    }

    pub fn with_retryable_statuses(mut self, codes: impl IntoIterator<Item = StatusCode>) -> Self {
        self.retryable_statuses = Some(codes.into_iter().collect());
        self
    }

    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.tracing_enabled = Some(enabled);
        self
    }

    /// Base URL without a trailing slash, `DEFAULT_ENDPOINT` when unset
    pub fn resolved_endpoint(&self) -> String {
        self.endpoint
            .as_deref()
            .unwrap_or(DEFAULT_ENDPOINT)
            .trim_end_matches('/')
            .to_string()
    }

    /// Statuses treated as transient; defaults to Unavailable,
    /// ResourceExhausted and DeadlineExceeded
    pub fn resolved_retryable_statuses(&self) -> BTreeSet<StatusCode> {
        self.retryable_statuses.clone().unwrap_or_else(|| {
            [
                StatusCode::Unavailable,
                StatusCode::ResourceExhausted,
                StatusCode::DeadlineExceeded,
            ]
            .into_iter()
            .collect()
        })
    }

    pub fn resolved_tracing_enabled(&self) -> bool {
        self.tracing_enabled.unwrap_or(false)
    }

    /// Resolves the poll schedule, filling unset fields with defaults
    pub fn polling_policy(&self) -> PollingPolicy {
        PollingPolicy {
            initial_interval: self
                .initial_poll_interval
                .unwrap_or(DEFAULT_INITIAL_POLL_INTERVAL),
            max_interval: self.max_poll_interval.unwrap_or(DEFAULT_MAX_POLL_INTERVAL),
            multiplier: self.backoff_multiplier.unwrap_or(DEFAULT_BACKOFF_MULTIPLIER),
            jitter: self.jitter.unwrap_or(true),
            max_duration: self.max_poll_duration.unwrap_or(DEFAULT_MAX_POLL_DURATION),
            max_attempts: self.max_poll_attempts,
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(endpoint) = &self.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(ClientError::Invalid(
                    "endpoint must start with http:// or https://".to_string(),
                ));
            }
        }

        if self.request_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ClientError::Invalid(
                "request_timeout must be greater than 0".to_string(),
            ));
        }

        if self.max_poll_attempts == Some(0) {
            return Err(ClientError::Invalid(
                "max_poll_attempts must be greater than 0".to_string(),
            ));
        }

        let policy = self.polling_policy();
        if policy.initial_interval.is_zero() {
            return Err(ClientError::Invalid(
                "initial_poll_interval must be greater than 0".to_string(),
            ));
        }
        if policy.max_interval < policy.initial_interval {
            return Err(ClientError::Invalid(
                "max_poll_interval must not be smaller than initial_poll_interval".to_string(),
            ));
        }
        if !policy.multiplier.is_finite() || policy.multiplier < 1.0 {
            return Err(ClientError::Invalid(
                "backoff_multiplier must be a finite number >= 1.0".to_string(),
            ));
        }

        Ok(())
    }
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("endpoint", &self.endpoint)
            .field("request_timeout", &self.request_timeout)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("billing_project", &self.billing_project)
            .field("max_poll_duration", &self.max_poll_duration)
            .field("max_poll_attempts", &self.max_poll_attempts)
            .field("initial_poll_interval", &self.initial_poll_interval)
            .field("max_poll_interval", &self.max_poll_interval)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("jitter", &self.jitter)
            .field("retryable_statuses", &self.retryable_statuses)
            .field("tracing_enabled", &self.tracing_enabled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_value_wins() {
        let defaults = Options::new()
            .with_endpoint("http://default:1")
            .with_billing_project("default-project");
        let call = Options::new().with_endpoint("http://call:2");

        let merged = Options::merge(&call, &defaults);
        assert_eq!(merged.endpoint.as_deref(), Some("http://call:2"));
        assert_eq!(merged.billing_project.as_deref(), Some("default-project"));
        assert_eq!(merged.jitter, None);
    }

    #[test]
    fn test_merge_leaves_inputs_untouched() {
        let defaults = Options::new().with_max_poll_attempts(3);
        let call = Options::new().with_jitter(false);
        let defaults_before = defaults.clone();
        let call_before = call.clone();

        let _ = Options::merge(&call, &defaults);
        assert_eq!(defaults, defaults_before);
        assert_eq!(call, call_before);
    }

    #[test]
    fn test_polling_policy_defaults() {
        let policy = Options::new().polling_policy();
        assert_eq!(policy.initial_interval, Duration::from_secs(1));
        assert_eq!(policy.max_interval, Duration::from_secs(30));
        assert_eq!(policy.multiplier, 2.0);
        assert!(policy.jitter);
        assert_eq!(policy.max_duration, Duration::from_secs(1800));
        assert_eq!(policy.max_attempts, None);
    }

    #[test]
    fn test_resolved_endpoint_trims_trailing_slash() {
        assert_eq!(Options::new().resolved_endpoint(), DEFAULT_ENDPOINT);
        let options = Options::new().with_endpoint("http://localhost:9050/");
        assert_eq!(options.resolved_endpoint(), "http://localhost:9050");
    }

    #[test]
    fn test_default_retryable_statuses() {
        let codes = Options::new().resolved_retryable_statuses();
        assert!(codes.contains(&StatusCode::Unavailable));
        assert!(codes.contains(&StatusCode::ResourceExhausted));
        assert!(!codes.contains(&StatusCode::NotFound));
    }

    #[test]
    fn test_options_validation() {
        assert!(Options::new().validate().is_ok());
        assert!(Options::new().with_endpoint("localhost").validate().is_err());
        assert!(Options::new().with_max_poll_attempts(0).validate().is_err());
        assert!(Options::new().with_backoff_multiplier(0.5).validate().is_err());
        assert!(
            Options::new()
                .with_initial_poll_interval(Duration::from_secs(10))
                .with_max_poll_interval(Duration::from_secs(1))
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_debug_redacts_access_token() {
        let options = Options::new().with_access_token("secret-token");
        let rendered = format!("{:?}", options);
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("<redacted>"));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn arb_options() -> impl Strategy<Value = Options> {
            (
                proptest::option::of("http://[a-z]{1,8}"),
                proptest::option::of(1u64..600),
                proptest::option::of("[a-z]{1,12}"),
                proptest::option::of(1u32..20),
                proptest::option::of(any::<bool>()),
                proptest::option::of(1.0f64..4.0),
                proptest::option::of(any::<bool>()),
            )
                .prop_map(
                    |(endpoint, timeout, project, attempts, jitter, multiplier, tracing)| Options {
                        endpoint,
                        request_timeout: timeout.map(Duration::from_secs),
                        billing_project: project,
                        max_poll_attempts: attempts,
                        jitter,
                        backoff_multiplier: multiplier,
                        tracing_enabled: tracing,
                        ..Options::default()
                    },
                )
        }

        proptest! {
            /// Property: each merged field is the override's value when set, else the default's.
            #[test]
            fn merge_prefers_override(call in arb_options(), defaults in arb_options()) {
                let call_before = call.clone();
                let defaults_before = defaults.clone();
                let merged = Options::merge(&call, &defaults);

                prop_assert_eq!(&merged.endpoint, &call.endpoint.clone().or(defaults.endpoint.clone()));
                prop_assert_eq!(merged.request_timeout, call.request_timeout.or(defaults.request_timeout));
                prop_assert_eq!(&merged.billing_project, &call.billing_project.clone().or(defaults.billing_project.clone()));
                prop_assert_eq!(merged.max_poll_attempts, call.max_poll_attempts.or(defaults.max_poll_attempts));
                prop_assert_eq!(merged.jitter, call.jitter.or(defaults.jitter));
                prop_assert_eq!(merged.backoff_multiplier, call.backoff_multiplier.or(defaults.backoff_multiplier));
                prop_assert_eq!(merged.tracing_enabled, call.tracing_enabled.or(defaults.tracing_enabled));

                prop_assert_eq!(call, call_before);
                prop_assert_eq!(defaults, defaults_before);
            }
        }
    }
}
