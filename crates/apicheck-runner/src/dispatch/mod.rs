//! Endpoint dispatch: build a request from an endpoint description, send
//! it, and retry while the server answers with a transient status.
//!
//! ```text
//! ApiEndpoint + CallArgs ──build_request──▶ Request ──PreparedCall──▶ Transport
//!                                                                   │
//!             Transcript ◀── every attempt ── Response ◀────────────┘
//! ```

mod transport;

use std::time::Duration;

use thiserror::Error;

use apicheck_core::config::{Config, ConfigError, RetrySettings};
use apicheck_core::http::{Body, Method, PathArgs, PathError, PathTemplate, Request, RequestError, Response};
use apicheck_core::{ExtDict, Node, Transcript};

use crate::clock::{Clock, SystemClock};

pub use transport::{PreparedCall, ReqwestTransport, Transport, TransportSettings, normalize_proxy};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("URL scheme '{scheme}' is not supported (only http and https): {url}")]
    UnsupportedScheme { url: String, scheme: String },

    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("HTTP client setup failed: {0}")]
    Client(String),

    #[error("{method} {url} failed: {reason}")]
    Transport {
        method: String,
        url: String,
        reason: String,
    },

    #[error("\nERROR: unexpected HTTP response received after {attempts} attempt(s):\n{response}")]
    Exhausted {
        attempts: u32,
        response: Box<Response>,
    },
}

// ── Retry ──

/// Re-send while the status is transient, until `timeout` has passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub interval: Duration,
    pub transient: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&RetrySettings::default())
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            timeout: Duration::from_secs(settings.timeout_secs),
            interval: Duration::from_millis(settings.interval_ms),
            transient: settings.transient_statuses.clone(),
        }
    }

    /// Send once, whatever the status.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            timeout: Duration::ZERO,
            interval: Duration::ZERO,
            transient: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_transient(&self, status: u16) -> bool {
        self.transient.contains(&status)
    }
}

// ── Endpoints ──

/// One operation of a service: where it lives and its default headers
/// and cookies. Shared by every call; calls never modify it.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiEndpoint {
    pub base_url: String,
    pub method: Method,
    pub path: PathTemplate,
    pub headers: ExtDict,
    pub cookies: ExtDict,
    pub comment: Option<String>,
}

impl ApiEndpoint {
    /// # Errors
    ///
    /// Returns [`PathError::Malformed`] for an unbalanced path template.
    pub fn new(base_url: impl Into<String>, method: Method, path: &str) -> Result<Self, PathError> {
        Ok(Self {
            base_url: base_url.into(),
            method,
            path: PathTemplate::parse(path)?,
            headers: ExtDict::new(),
            cookies: ExtDict::new(),
            comment: None,
        })
    }

    /// Endpoint of a configured service in the active environment. The
    /// service's headers become the endpoint defaults.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Config`] for an unknown service or
    /// [`DispatchError::Path`] for a malformed template.
    pub fn for_service(config: &Config, service: &str, method: Method, path: &str) -> Result<Self, DispatchError> {
        let profile = config.service(service)?;
        let mut endpoint = Self::new(profile.url.clone(), method, path)?;
        for (name, value) in &profile.headers {
            endpoint.headers.insert(name.clone(), value.as_str());
        }
        Ok(endpoint)
    }

    #[must_use]
    pub fn with_headers(mut self, headers: ExtDict) -> Self {
        self.headers = headers;
        self
    }

    #[must_use]
    pub fn with_cookies(mut self, cookies: ExtDict) -> Self {
        self.cookies = cookies;
        self
    }

    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Request for one call. Call headers and cookies are laid over copies
    /// of the endpoint defaults; a `session` value sets the `session`
    /// cookie.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Path`] when the path arguments do not fill
    /// the template.
    pub fn build_request(&self, args: &CallArgs) -> Result<Request, DispatchError> {
        let path = self.path.render(&args.path)?;

        let headers = match &args.headers {
            Some(extra) => self.headers.add(extra),
            None => self.headers.clone(),
        };
        let mut cookies = match &args.cookies {
            Some(extra) => self.cookies.add(extra),
            None => self.cookies.clone(),
        };
        if let Some(session) = &args.session {
            cookies.insert("session", session.as_str());
        }

        let mut request = Request::build(self.method, self.base_url.clone(), path)
            .with_headers(headers)
            .with_cookies(cookies)
            .with_allow_redirects(args.allow_redirects);
        if let Some(params) = &args.params {
            request = request.with_params(params.clone());
        }
        if let Some(body) = &args.body {
            request = request.with_body(body.clone());
        }
        Ok(request)
    }
}

impl std::fmt::Display for ApiEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} - headers={}", self.method, self.path.as_str(), self.headers)
    }
}

/// Per-call arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    pub path: PathArgs,
    pub headers: Option<ExtDict>,
    pub cookies: Option<ExtDict>,
    pub session: Option<String>,
    pub params: Option<ExtDict>,
    pub body: Option<Body>,
    pub allow_redirects: bool,
    pub comment: Option<String>,
}

impl CallArgs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Positional path value.
    #[must_use]
    pub fn arg(mut self, value: impl ToString) -> Self {
        self.path = self.path.arg(value);
        self
    }

    /// Named path value.
    #[must_use]
    pub fn path_var(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.path = self.path.named(name, value);
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<Node>) -> Self {
        self.headers.get_or_insert_with(ExtDict::new).insert(name, value);
        self
    }

    #[must_use]
    pub fn with_headers(mut self, headers: ExtDict) -> Self {
        self.headers = Some(headers);
        self
    }

    #[must_use]
    pub fn with_cookies(mut self, cookies: ExtDict) -> Self {
        self.cookies = Some(cookies);
        self
    }

    #[must_use]
    pub fn session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    #[must_use]
    pub fn with_params(mut self, params: ExtDict) -> Self {
        self.params = Some(params);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    #[must_use]
    pub fn allow_redirects(mut self, allow: bool) -> Self {
        self.allow_redirects = allow;
        self
    }

    #[must_use]
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

// ── Dispatcher ──

/// Sends requests through a transport with the retry policy, recording
/// every attempt in the transcript.
pub struct Dispatcher<T, C = SystemClock> {
    transport: T,
    clock: C,
    policy: RetryPolicy,
    transcript: Option<Transcript>,
}

impl<T: Transport> Dispatcher<T, SystemClock> {
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            clock: SystemClock,
            policy: RetryPolicy::default(),
            transcript: None,
        }
    }
}

impl<T: Transport, C: Clock> Dispatcher<T, C> {
    #[must_use]
    pub fn with_clock<C2: Clock>(self, clock: C2) -> Dispatcher<T, C2> {
        Dispatcher {
            transport: self.transport,
            clock,
            policy: self.policy,
            transcript: self.transcript,
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_transcript(mut self, transcript: Transcript) -> Self {
        self.transcript = Some(transcript);
        self
    }

    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Build the request for `args` and send it.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::send`]; building can also fail on path arguments.
    pub fn call(&self, endpoint: &ApiEndpoint, args: &CallArgs) -> Result<Response, DispatchError> {
        let request = endpoint.build_request(args)?;
        let comment = args.comment.as_deref().or(endpoint.comment.as_deref());
        self.send(&request, comment)
    }

    /// Send until the status is not transient or the policy timeout passes.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::UnsupportedScheme`] before any network
    /// call for non-HTTP URLs, the transport error of a failed attempt, or
    /// [`DispatchError::Exhausted`] with the last response on timeout.
    pub fn send(&self, request: &Request, comment: Option<&str>) -> Result<Response, DispatchError> {
        let call = PreparedCall::from_request(request)?;
        let deadline = self.clock.now() + self.policy.timeout;
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            let response = self.transport.send(&call)?;
            tracing::debug!(
                method = %call.method,
                url = %call.url,
                status = response.status,
                attempt = attempts,
                "dispatched"
            );
            if let Some(transcript) = &self.transcript {
                transcript.append_http(request, &response, comment);
            }

            if !self.policy.is_transient(response.status) {
                return Ok(response);
            }
            if self.policy.timeout.is_zero() {
                return Err(exhausted(attempts, response));
            }
            self.clock.sleep(self.policy.interval);
            if self.clock.now() >= deadline {
                return Err(exhausted(attempts, response));
            }
        }
    }
}

fn exhausted(attempts: u32, response: Response) -> DispatchError {
    tracing::warn!(attempts, status = response.status, "transient status persisted past the retry timeout");
    DispatchError::Exhausted {
        attempts,
        response: Box::new(response),
    }
}
