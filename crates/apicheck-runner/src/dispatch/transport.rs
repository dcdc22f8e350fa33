//! Wire transport. [`ReqwestTransport`] is the real one; tests supply
//! their own [`Transport`] with scripted responses.

use std::time::Duration;

use reqwest::blocking::{Client, multipart};
use reqwest::redirect;
use url::Url;

use apicheck_core::config::Config;
use apicheck_core::http::{EncodedBody, Method, Request, Response, ResponseParts};
use apicheck_core::status::reason_phrase;

use super::DispatchError;

const MAX_REDIRECTS: usize = 10;

/// Sends one prepared call and returns the decoded response.
pub trait Transport {
    /// # Errors
    ///
    /// Returns [`DispatchError::Transport`] when no response was received.
    fn send(&self, call: &PreparedCall) -> Result<Response, DispatchError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, call: &PreparedCall) -> Result<Response, DispatchError> {
        (**self).send(call)
    }
}

/// A request resolved to what goes on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedCall {
    pub method: Method,
    pub url: Url,
    /// Includes the `Cookie` header when the request carries cookies.
    pub headers: Vec<(String, String)>,
    pub body: EncodedBody,
    pub allow_redirects: bool,
}

impl PreparedCall {
    /// # Errors
    ///
    /// Returns [`DispatchError::UnsupportedScheme`] for anything other than
    /// http/https, or [`DispatchError::Request`] when the URL or body cannot
    /// be encoded.
    pub fn from_request(request: &Request) -> Result<Self, DispatchError> {
        let url = request.full_url()?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(DispatchError::UnsupportedScheme {
                url: url.to_string(),
                scheme: url.scheme().to_string(),
            });
        }

        let mut headers = request.header_pairs();
        if let Some(cookie) = request.cookie_header() {
            headers.push(("Cookie".to_string(), cookie));
        }

        Ok(Self {
            method: request.method,
            url,
            headers,
            body: request.encode_body()?,
            allow_redirects: request.allow_redirects,
        })
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportSettings {
    pub timeout: Duration,
    pub proxy: Option<String>,
    pub accept_invalid_certs: bool,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl TransportSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: Duration::from_secs(config.http.timeout_secs),
            proxy: config.proxy.clone(),
            accept_invalid_certs: config.http.accept_invalid_certs,
        }
    }
}

/// Proxy addresses without a scheme are taken as plain HTTP proxies.
#[must_use]
pub fn normalize_proxy(proxy: &str) -> String {
    if proxy.contains("://") {
        proxy.to_string()
    } else {
        format!("http://{proxy}")
    }
}

/// Blocking reqwest transport. Keeps one client that follows redirects and
/// one that does not, since the policy is fixed per client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    following: Client,
    direct: Client,
}

impl ReqwestTransport {
    /// # Errors
    ///
    /// Returns [`DispatchError::Client`] for an invalid proxy or TLS setup.
    pub fn new(settings: &TransportSettings) -> Result<Self, DispatchError> {
        Ok(Self {
            following: build_client(settings, redirect::Policy::limited(MAX_REDIRECTS))?,
            direct: build_client(settings, redirect::Policy::none())?,
        })
    }
}

fn build_client(settings: &TransportSettings, policy: redirect::Policy) -> Result<Client, DispatchError> {
    let mut builder = Client::builder()
        .timeout(settings.timeout)
        .redirect(policy)
        .danger_accept_invalid_certs(settings.accept_invalid_certs);
    if let Some(proxy) = &settings.proxy {
        let proxy = reqwest::Proxy::all(normalize_proxy(proxy)).map_err(|e| DispatchError::Client(e.to_string()))?;
        builder = builder.proxy(proxy);
    }
    builder.build().map_err(|e| DispatchError::Client(e.to_string()))
}

impl Transport for ReqwestTransport {
    fn send(&self, call: &PreparedCall) -> Result<Response, DispatchError> {
        let failed = |reason: String| DispatchError::Transport {
            method: call.method.to_string(),
            url: call.url.to_string(),
            reason,
        };

        let client = if call.allow_redirects {
            &self.following
        } else {
            &self.direct
        };
        let method = reqwest::Method::from_bytes(call.method.as_str().as_bytes()).map_err(|e| failed(e.to_string()))?;

        let multipart_body = matches!(call.body, EncodedBody::Multipart(_));
        let mut builder = client.request(method, call.url.clone());
        for (name, value) in &call.headers {
            // reqwest writes its own boundary for multipart bodies
            if multipart_body && name.eq_ignore_ascii_case("content-type") {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match &call.body {
            EncodedBody::Empty => builder,
            EncodedBody::Bytes(bytes) => builder.body(bytes.clone()),
            EncodedBody::Multipart(fields) => {
                let form = fields
                    .iter()
                    .fold(multipart::Form::new(), |form, (name, value)| form.text(name.clone(), value.clone()));
                builder.multipart(form)
            }
        };

        let resp = builder.send().map_err(|e| failed(e.to_string()))?;

        let status = resp.status();
        let url = resp.url().to_string();
        let headers = resp
            .headers()
            .iter()
            .map(|(name, value)| (name.as_str().to_string(), String::from_utf8_lossy(value.as_bytes()).into_owned()))
            .collect();
        let cookies = resp
            .cookies()
            .map(|c| (c.name().to_string(), c.value().to_string()))
            .collect();
        let raw = resp.bytes().map_err(|e| failed(e.to_string()))?.to_vec();

        Ok(Response::from_parts(ResponseParts {
            status: status.as_u16(),
            reason: reason_phrase(status.as_u16())
                .or_else(|| status.canonical_reason())
                .unwrap_or_default()
                .to_string(),
            url,
            headers,
            cookies,
            raw,
        }))
    }
}
