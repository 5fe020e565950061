// crates/ad-serving-redemption/src/http.rs
// ============================================================================
// Module: HTTP Redemption Transport
// Description: Blocking reqwest transport for confirmation redemption.
// Purpose: Send redemption requests with strict scheme and size limits.
// Dependencies: ad-serving-core, reqwest, url
// ============================================================================

//! ## Overview
//! [`HttpRedemptionTransport`] sends a [`UrlRequest`] and returns the raw
//! status, headers, and body. Any status is returned as a response so the
//! core classifier decides between success, retry, and fatal failure.
//! Redirects are never followed. Oversized bodies and network failures
//! surface as [`TransportError::Transport`], which the core treats as
//! retryable.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::io::Read;
use std::time::Duration;

use ad_serving_core::RedemptionTransport;
use ad_serving_core::TransportError;
use ad_serving_core::UrlRequest;
use ad_serving_core::UrlRequestMethod;
use ad_serving_core::UrlResponse;
use reqwest::Method;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::redirect::Policy;
use thiserror::Error;
use url::Url;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Default request timeout in milliseconds.
const DEFAULT_TIMEOUT_MS: u64 = 10_000;
/// Default maximum response body size in bytes.
const DEFAULT_MAX_RESPONSE_BYTES: usize = 64 * 1024;

/// Transport limits.
///
/// # Invariants
/// - `max_response_bytes` is the largest body returned to the classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpTransportConfig {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Maximum accepted response body in bytes.
    pub max_response_bytes: usize,
    /// Allow plain `http://` URLs.
    pub allow_http: bool,
    /// `User-Agent` header value.
    pub user_agent: String,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
            allow_http: false,
            user_agent: concat!("ad-serving/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Transport construction errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum HttpTransportError {
    /// The HTTP client could not be built.
    #[error("http client error: {0}")]
    Client(String),
}

// ============================================================================
// SECTION: Transport
// ============================================================================

/// Blocking HTTP transport for redemption requests.
#[derive(Debug, Clone)]
pub struct HttpRedemptionTransport {
    /// HTTP client used for requests.
    client: Client,
    /// Transport limits.
    config: HttpTransportConfig,
}

impl HttpRedemptionTransport {
    /// Builds a transport with redirects disabled.
    ///
    /// # Errors
    ///
    /// Returns [`HttpTransportError`] when the HTTP client cannot be constructed.
    pub fn new(config: HttpTransportConfig) -> Result<Self, HttpTransportError> {
        let client = Client::builder()
            .redirect(Policy::none())
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|err| HttpTransportError::Client(err.to_string()))?;
        Ok(Self {
            client,
            config,
        })
    }

    /// Returns the transport limits.
    #[must_use]
    pub const fn config(&self) -> &HttpTransportConfig {
        &self.config
    }

    /// Parses `raw` and checks the scheme against the configured policy.
    fn checked_url(&self, raw: &str) -> Result<Url, TransportError> {
        let url = Url::parse(raw).map_err(|err| TransportError::InvalidRequest(err.to_string()))?;
        match url.scheme() {
            "https" => {}
            "http" if self.config.allow_http => {}
            scheme => {
                return Err(TransportError::InvalidRequest(format!(
                    "unsupported url scheme: {scheme}"
                )));
            }
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(TransportError::InvalidRequest("url has no host".to_string()));
        }
        if !url.username().is_empty() || url.password().is_some() {
            return Err(TransportError::InvalidRequest("url must not carry credentials".to_string()));
        }
        Ok(url)
    }

    /// Reads at most `max_response_bytes` of the body.
    fn read_body(&self, response: reqwest::blocking::Response) -> Result<String, TransportError> {
        let max_bytes = self.config.max_response_bytes;
        let limit = u64::try_from(max_bytes).unwrap_or(u64::MAX);
        if response.content_length().is_some_and(|length| length > limit) {
            return Err(TransportError::Transport("response exceeds size limit".to_string()));
        }
        let mut bytes = Vec::new();
        response
            .take(limit.saturating_add(1))
            .read_to_end(&mut bytes)
            .map_err(|err| TransportError::Transport(err.to_string()))?;
        if bytes.len() > max_bytes {
            return Err(TransportError::Transport("response exceeds size limit".to_string()));
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl RedemptionTransport for HttpRedemptionTransport {
    fn send(&self, request: &UrlRequest) -> Result<UrlResponse, TransportError> {
        let url = self.checked_url(&request.url)?;
        let method = match request.method {
            UrlRequestMethod::Get => Method::GET,
            UrlRequestMethod::Post => Method::POST,
        };
        let mut builder = self.client.request(method, url);
        for header in &request.headers {
            let (name, value) = header.split_once(':').ok_or_else(|| {
                TransportError::InvalidRequest(format!("malformed header: {header}"))
            })?;
            builder = builder.header(name.trim(), value.trim());
        }
        if !request.content.is_empty() {
            builder =
                builder.header(CONTENT_TYPE, request.content_type.as_str()).body(request.content.clone());
        }
        let response = builder.send().map_err(|err| TransportError::Transport(err.to_string()))?;
        let final_url = response.url().to_string();
        let status_code = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value.to_str().ok().map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect::<BTreeMap<_, _>>();
        let body = self.read_body(response)?;
        Ok(UrlResponse {
            url: final_url,
            status_code,
            body,
            headers,
        })
    }
}
