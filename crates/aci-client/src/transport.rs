//! HTTP transport seam
//!
//! [`Session`](crate::Session) talks to the APIC through the [`Transport`]
//! trait so tests can substitute a scripted transport. [`HttpTransport`] is
//! the real implementation on top of `reqwest`'s blocking client.

use crate::config::SessionConfig;
use crate::error::AciError;
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use tracing::debug;

/// Name of the APIC session cookie
pub const COOKIE_NAME: &str = "APIC-cookie";

/// Content type of `mo.json` posts and login bodies
pub const CONTENT_JSON: &str = "application/json";
/// Content type of `mo.xml` posts
pub const CONTENT_XML: &str = "application/xml";

/// HTTP methods the APIC API is driven with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Reads
    Get,
    /// Login, refresh, logout and configuration changes
    Post,
}

/// A single request to the APIC REST API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path below `/api/`, e.g. `class/fvTenant.json`
    pub path: String,
    /// Absolute URL without query string
    pub url: String,
    pub query: Vec<(String, String)>,
    pub body: Option<String>,
    pub content_type: Option<&'static str>,
    /// Session cookie value, if authenticated
    pub cookie: Option<String>,
}

impl ApiRequest {
    /// Build query string from parameters
    pub fn query_string(&self) -> String {
        self.query
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// URL including the encoded query string
    pub fn full_url(&self) -> String {
        if self.query.is_empty() {
            self.url.clone()
        } else {
            format!("{}?{}", self.url, self.query_string())
        }
    }
}

/// Raw APIC response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    /// HTTP status code
    pub status: u16,
    /// Raw body text
    pub body: String,
    /// Session cookie set by the response, if any
    pub cookie: Option<String>,
}

impl ApiResponse {
    /// Response without a session cookie
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            cookie: None,
        }
    }

    /// True for any 2xx status
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Blocking request/response exchange with an APIC
pub trait Transport {
    /// Lightweight reachability check; any HTTP answer counts as reachable
    fn probe(&self, base_url: &str) -> Result<(), AciError>;

    /// Send one request and return the raw response
    fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, AciError>;
}

/// `reqwest` blocking transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    probe_client: Client,
}

impl HttpTransport {
    /// Create a transport with the timeouts and TLS policy from `config`
    pub fn new(config: &SessionConfig) -> Result<Self, AciError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;
        let probe_client = Client::builder()
            .timeout(config.probe_timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;

        Ok(Self {
            client,
            probe_client,
        })
    }
}

impl Transport for HttpTransport {
    fn probe(&self, base_url: &str) -> Result<(), AciError> {
        debug!("Probing {}", base_url);
        self.probe_client
            .get(format!("{base_url}/"))
            .send()
            .map(|_| ())
            .map_err(|e| {
                debug!("Probe of {} failed: {}", base_url, e);
                AciError::UnreachableHost(base_url.to_string())
            })
    }

    fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, AciError> {
        let url = request.full_url();
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };
        if let Some(cookie) = &request.cookie {
            builder = builder.header(COOKIE, format!("{COOKIE_NAME}={cookie}"));
        }
        if let Some(content_type) = request.content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send()?;
        let status = response.status().as_u16();
        let cookie = session_cookie(
            response
                .headers()
                .get_all(SET_COOKIE)
                .iter()
                .filter_map(|value| value.to_str().ok()),
        );
        let body = response.text()?;

        Ok(ApiResponse {
            status,
            body,
            cookie,
        })
    }
}

/// Pick the APIC session cookie out of `Set-Cookie` header values
pub(crate) fn session_cookie<'a>(headers: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let prefix = format!("{COOKIE_NAME}=");
    headers.into_iter().find_map(|header| {
        header
            .split(';')
            .map(str::trim)
            .find_map(|part| part.strip_prefix(prefix.as_str()))
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    })
}
