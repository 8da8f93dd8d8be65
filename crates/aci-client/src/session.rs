//! Authenticated APIC session
//!
//! A [`Session`] moves between three phases:
//!
//! ```text
//! Disconnected --probe--> Connected --login--> Authenticated --logout--> Disconnected
//! ```
//!
//! Opening a session probes the controller and fails with
//! [`AciError::UnreachableHost`] when it does not answer. A request rejected
//! with 403 triggers exactly one re-login followed by exactly one retry when
//! auto-login is enabled; a second 403 is [`AciError::SessionExpired`].
//!
//! Every state transition takes `&mut self`, so a session has a single owner.
//! Callers that need to share one across threads wrap it in a `Mutex`.

use crate::address::Address;
use crate::config::SessionConfig;
use crate::document::ResponseDocument;
use crate::error::AciError;
use crate::query::Query;
use crate::transport::{ApiRequest, ApiResponse, CONTENT_JSON, CONTENT_XML, HttpTransport, Method, Transport};
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

const LOGIN_PATH: &str = "aaaLogin.json";
const REFRESH_PATH: &str = "mo/aaaRefresh.json";
const LOGOUT_PATH: &str = "mo/aaaLogout.json";
const POST_JSON_PATH: &str = "mo.json";
const POST_XML_PATH: &str = "mo.xml";
/// Any object every fabric has; reading it checks whether the cookie is accepted
const STATUS_PROBE_PATH: &str = "mo/topology/pod-1/node-1.json";

/// Phase of the session state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Logged out, or the controller has not been probed since
    Disconnected,
    /// Reachable but not logged in
    Connected,
    /// Holding a session cookie issued by a successful login
    Authenticated,
}

/// Who the controller a session talks to is, as reported by its `topSystem` object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    pub dn: String,
    /// Node id, e.g. 1 for the first APIC
    pub id: u32,
    pub pod: u32,
    pub name: String,
    /// `controller`, `leaf` or `spine`
    pub role: String,
}

/// Password wrapper that never prints its value
#[derive(Clone)]
struct Password(String);

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

/// Mutable session state: credentials, cookie and establishment time
#[derive(Debug, Clone)]
struct SessionState {
    username: Option<String>,
    password: Option<Password>,
    cookie: String,
    established_at: Option<DateTime<Utc>>,
    auto_login: bool,
    status: SessionStatus,
}

impl SessionState {
    fn clear_credentials(&mut self) {
        self.username = None;
        self.password = None;
    }

    fn clear_cookie(&mut self) {
        self.cookie.clear();
        self.established_at = None;
    }
}

/// Body for [`Session::post_payload`]
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Posted to `mo.json`
    Json(Value),
    /// Posted to `mo.xml`
    Markup(String),
}

impl Payload {
    /// Classify raw text: a leading `<` is markup, anything else must be JSON
    pub fn from_text(text: &str) -> Result<Self, AciError> {
        let trimmed = text.trim();
        if trimmed.starts_with('<') {
            Ok(Self::Markup(trimmed.to_string()))
        } else {
            Ok(Self::Json(serde_json::from_str(trimmed)?))
        }
    }

    fn path(&self) -> &'static str {
        match self {
            Self::Json(_) => POST_JSON_PATH,
            Self::Markup(_) => POST_XML_PATH,
        }
    }

    fn content_type(&self) -> &'static str {
        match self {
            Self::Json(_) => CONTENT_JSON,
            Self::Markup(_) => CONTENT_XML,
        }
    }

    fn body(&self) -> String {
        match self {
            Self::Json(value) => value.to_string(),
            Self::Markup(text) => text.clone(),
        }
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<&ResponseDocument> for Payload {
    /// A single-item document posts that item; otherwise the item list is posted
    fn from(document: &ResponseDocument) -> Self {
        match document.imdata() {
            [single] => Self::Json(single.to_json()),
            _ => Self::Json(document.imdata_json()),
        }
    }
}

/// An authenticated connection to one APIC
pub struct Session<T: Transport = HttpTransport> {
    address: Address,
    base_url: String,
    transport: T,
    state: SessionState,
}

impl<T: Transport> fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("base_url", &self.base_url)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Session<HttpTransport> {
    /// Open a session to `address` (literal or hostname) over HTTPS
    pub fn connect(address: &str, config: &SessionConfig) -> Result<Self, AciError> {
        let address = Address::new(address)?.with_gateway_rule(config.gateway_rule);
        let transport = HttpTransport::new(config)?;
        Self::with_transport(address, transport, config)
    }
}

impl<T: Transport> Session<T> {
    /// Open a session over an arbitrary transport; fails if the probe fails
    pub fn with_transport(address: Address, transport: T, config: &SessionConfig) -> Result<Self, AciError> {
        let base_url = format!("https://{}", address.authority());
        transport.probe(&base_url)?;
        info!("Connected to {}", base_url);

        Ok(Self {
            address,
            base_url,
            transport,
            state: SessionState {
                username: config.username.clone(),
                password: config.password.clone().map(Password),
                cookie: String::new(),
                established_at: None,
                auto_login: config.auto_login,
                status: SessionStatus::Connected,
            },
        })
    }

    /// Address the session was opened against
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// `https://<address>`, without the `/api` suffix
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Local view of the state machine; see [`Session::is_logged_in`] for the controller's view
    pub fn status(&self) -> SessionStatus {
        self.state.status
    }

    /// When the current cookie was issued
    pub fn established_at(&self) -> Option<DateTime<Utc>> {
        self.state.established_at
    }

    /// Stored username, if any
    pub fn username(&self) -> Option<&str> {
        self.state.username.as_deref()
    }

    /// True when both a username and a password are stored
    pub fn has_credentials(&self) -> bool {
        self.state.username.is_some() && self.state.password.is_some()
    }

    /// Whether a 403 triggers a re-login and retry
    pub fn auto_login(&self) -> bool {
        self.state.auto_login
    }

    /// Enable or disable the re-login on 403
    pub fn set_auto_login(&mut self, auto_login: bool) {
        self.state.auto_login = auto_login;
    }

    /// Forget stored credentials without touching the cookie
    pub fn clear_credentials(&mut self) {
        self.state.clear_credentials();
    }

    /// The underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Log in, optionally replacing the stored credentials
    ///
    /// A 401 clears the credentials and returns
    /// [`AciError::AuthenticationFailed`]; any other status of 400 or above is
    /// an [`AciError::HttpError`].
    pub fn login(&mut self, username: Option<&str>, password: Option<&str>) -> Result<ApiResponse, AciError> {
        if self.state.status == SessionStatus::Disconnected {
            self.transport.probe(&self.base_url)?;
            self.state.status = SessionStatus::Connected;
        }
        if let Some(username) = username {
            self.state.username = Some(username.to_string());
        }
        if let Some(password) = password {
            self.state.password = Some(Password(password.to_string()));
        }

        let (Some(username), Some(Password(password))) = (&self.state.username, &self.state.password) else {
            return Err(AciError::AuthenticationFailed(
                "no username and password available".to_string(),
            ));
        };
        let payload = json!({"aaaUser": {"attributes": {"name": username, "pwd": password}}});
        info!("Logging in to {} as {}", self.base_url, username);

        let response = self.send(Method::Post, LOGIN_PATH, &[], Some(payload.to_string()), Some(CONTENT_JSON))?;
        if response.status == 401 {
            warn!("Authentication to {} failed, clearing credentials", self.base_url);
            self.state.clear_credentials();
            self.state.clear_cookie();
            self.state.status = SessionStatus::Connected;
            return Err(AciError::AuthenticationFailed(response.body));
        }
        if response.status >= 400 {
            return Err(AciError::HttpError {
                status: response.status,
                body: response.body,
            });
        }

        let cookie = session_token(&response).ok_or_else(|| {
            AciError::AuthenticationFailed("login response carried no session token".to_string())
        })?;
        self.state.cookie = cookie;
        self.state.established_at = Some(Utc::now());
        self.state.status = SessionStatus::Authenticated;
        debug!("Session established with {}", self.base_url);
        Ok(response)
    }

    /// Re-validate the current cookie; failures are reported, never retried
    pub fn refresh(&mut self) -> Result<ApiResponse, AciError> {
        if self.state.cookie.is_empty() {
            return Err(AciError::SessionExpired("no session to refresh".to_string()));
        }
        debug!("Refreshing session with {}", self.base_url);

        let response = self.send(Method::Post, REFRESH_PATH, &[], None, None)?;
        if response.status == 403 {
            return Err(AciError::SessionExpired(response.body));
        }
        if response.status >= 400 {
            return Err(AciError::HttpError {
                status: response.status,
                body: response.body,
            });
        }
        if let Some(cookie) = session_token(&response) {
            self.state.cookie = cookie;
        }
        Ok(response)
    }

    /// Log out and forget credentials and cookie
    pub fn logout(&mut self) -> Result<ApiResponse, AciError> {
        let payload = json!({"aaaUser": {"attributes": {"name": self.state.username.clone().unwrap_or_default()}}});
        info!("Logging out of {}", self.base_url);

        let response = self.send(Method::Post, LOGOUT_PATH, &[], Some(payload.to_string()), Some(CONTENT_JSON))?;
        if response.status >= 400 {
            return Err(AciError::HttpError {
                status: response.status,
                body: response.body,
            });
        }
        self.state.clear_credentials();
        self.state.clear_cookie();
        self.state.status = SessionStatus::Disconnected;
        Ok(response)
    }

    /// Ask the controller whether the current cookie is still accepted
    ///
    /// A 401 or 403 answer is `false`; nothing is retried and no login is
    /// attempted, so the local state is left as it is.
    pub fn is_logged_in(&self) -> Result<bool, AciError> {
        if self.state.cookie.is_empty() {
            return Ok(false);
        }
        let response = self.send(Method::Get, STATUS_PROBE_PATH, &[], None, None)?;
        match response.status {
            401 | 403 => Ok(false),
            status if status >= 400 => Err(AciError::HttpError {
                status,
                body: response.body,
            }),
            _ => Ok(true),
        }
    }

    /// Look up the controller's own `topSystem` object by its out-of-band management address
    pub fn identity(&mut self) -> Result<NodeIdentity, AciError> {
        let ip = self.address.dotted_value();
        let mut query = Query::new("topSystem")?.with_filter(&format!("eq(topSystem.oobMgmtAddr, \"{ip}\")"));
        let document = query.execute(self)?;

        let Some(system) = document.imdata().first() else {
            return Err(AciError::NotFound(format!("no topSystem with management address {ip}")));
        };
        let field = |name: &str| {
            system
                .attribute(name)
                .map(str::to_string)
                .ok_or_else(|| AciError::parse(0, format!("topSystem has no {name} attribute")))
        };
        let number = |name: &str| {
            field(name)?
                .parse::<u32>()
                .map_err(|_| AciError::parse(0, format!("topSystem {name} is not a number")))
        };

        let identity = NodeIdentity {
            dn: field("dn")?,
            id: number("id")?,
            pod: number("podId")?,
            name: field("name")?,
            role: field("role")?,
        };
        debug!("{} is node {} ({}) in pod {}", self.base_url, identity.id, identity.name, identity.pod);
        Ok(identity)
    }

    /// GET `path` (below `/api/`) with query parameters
    pub fn get(&mut self, path: &str, parameters: &[(&str, &str)]) -> Result<ApiResponse, AciError> {
        let response = self.dispatch(Method::Get, path, parameters, None, None)?;
        check_status(response)
    }

    /// GET `path` and parse the body
    pub fn get_document(&mut self, path: &str, parameters: &[(&str, &str)]) -> Result<ResponseDocument, AciError> {
        let response = self.get(path, parameters)?;
        ResponseDocument::parse(&response.body)
    }

    /// POST a JSON value to `path`; only 200 is success
    pub fn post(&mut self, path: &str, payload: &Value) -> Result<ApiResponse, AciError> {
        self.post_raw(path, payload.to_string(), CONTENT_JSON)
    }

    /// POST a configuration payload to `mo.json` or `mo.xml` depending on its encoding
    pub fn post_payload(&mut self, payload: impl Into<Payload>) -> Result<ApiResponse, AciError> {
        let payload = payload.into();
        self.post_raw(payload.path(), payload.body(), payload.content_type())
    }

    /// POST a configuration file, substituting `{{name}}` placeholders from `variables`
    ///
    /// The encoding comes from the `.json`/`.xml` extension, or else from
    /// whichever of angle brackets and braces is more frequent.
    pub fn post_file(
        &mut self,
        path: impl AsRef<Path>,
        variables: &HashMap<String, String>,
    ) -> Result<ApiResponse, AciError> {
        let path = path.as_ref();
        let mut text = std::fs::read_to_string(path)?;
        for (name, value) in variables {
            text = text.replace(&format!("{{{{{name}}}}}"), value);
        }

        let markup = match path.extension().and_then(|e| e.to_str()) {
            Some("xml") => true,
            Some("json") => false,
            _ => count_of(&text, &['<', '>']) > count_of(&text, &['{', '}']),
        };
        debug!("Posting {} as {}", path.display(), if markup { "markup" } else { "json" });

        let payload = if markup {
            if count_of(&text, &['"']) > count_of(&text, &['\'']) {
                text = text.replace('"', "'");
            }
            Payload::Markup(text)
        } else {
            Payload::Json(serde_json::from_str(&text)?)
        };
        self.post_payload(payload)
    }

    /// True when `dn` names an existing object
    pub fn exists(&mut self, dn: &str) -> Result<bool, AciError> {
        match self.lookup(dn) {
            Ok(document) => Ok(!document.is_empty() && document.error().is_none()),
            Err(AciError::HttpError { status: 400 | 404, .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Class of the object named by `dn`
    pub fn class_of(&mut self, dn: &str) -> Result<String, AciError> {
        let document = match self.lookup(dn) {
            Err(AciError::HttpError { status: 400 | 404, .. }) => {
                return Err(AciError::NotFound(format!("{} does not exist", normalize_dn(dn))));
            }
            other => other?,
        };
        match document.imdata().first() {
            Some(object) if document.error().is_none() => Ok(object.class().to_string()),
            _ => Err(AciError::NotFound(format!("{} does not exist", normalize_dn(dn)))),
        }
    }

    /// Delete the object named by `dn` by posting it back with `status="deleted"`
    pub fn delete_object(&mut self, dn: &str) -> Result<ApiResponse, AciError> {
        let document = self.lookup(dn)?;
        let mut object = match document.imdata().first() {
            Some(object) if document.error().is_none() => object.clone(),
            _ => return Err(AciError::NotFound(format!("{} does not exist", normalize_dn(dn)))),
        };
        object.set_attribute("status", "deleted");
        info!("Deleting {}", normalize_dn(dn));
        self.post_payload(object.to_json())
    }

    /// Naming-only read of a single object
    fn lookup(&mut self, dn: &str) -> Result<ResponseDocument, AciError> {
        let path = format!("mo/{}.json", normalize_dn(dn));
        self.get_document(&path, &[("rsp-prop-include", "naming-only")])
    }

    fn post_raw(&mut self, path: &str, body: String, content_type: &'static str) -> Result<ApiResponse, AciError> {
        let response = self.dispatch(Method::Post, path, &[], Some(body), Some(content_type))?;
        if response.status != 200 {
            return Err(AciError::HttpError {
                status: response.status,
                body: response.body,
            });
        }
        Ok(response)
    }

    /// Send a request, recovering once from a 403 by logging in again
    fn dispatch(
        &mut self,
        method: Method,
        path: &str,
        parameters: &[(&str, &str)],
        body: Option<String>,
        content_type: Option<&'static str>,
    ) -> Result<ApiResponse, AciError> {
        let response = self.send(method, path, parameters, body.clone(), content_type)?;
        if response.status != 403 {
            return Ok(response);
        }
        if !self.state.auto_login {
            return Err(AciError::SessionExpired(format!(
                "{path} was rejected and auto-login is disabled"
            )));
        }

        warn!("Request to {} rejected with 403, logging in again", path);
        self.login(None, None)?;
        let retry = self.send(method, path, parameters, body, content_type)?;
        if retry.status == 403 {
            return Err(AciError::SessionExpired(retry.body));
        }
        Ok(retry)
    }

    fn send(
        &self,
        method: Method,
        path: &str,
        parameters: &[(&str, &str)],
        body: Option<String>,
        content_type: Option<&'static str>,
    ) -> Result<ApiResponse, AciError> {
        let path = path.trim_start_matches('/');
        let request = ApiRequest {
            method,
            path: path.to_string(),
            url: format!("{}/api/{}", self.base_url, path),
            query: parameters
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            body,
            content_type,
            cookie: (!self.state.cookie.is_empty()).then(|| self.state.cookie.clone()),
        };
        debug!("{:?} {}", method, request.full_url());

        let response = self.transport.execute(&request)?;
        debug!("{:?} {} -> {}", method, path, response.status);
        Ok(response)
    }
}

/// Where a session comes from: an already open one, or an address to connect to
#[derive(Debug)]
pub enum SessionSource<T: Transport = HttpTransport> {
    Existing(Session<T>),
    Address(String),
}

impl<T: Transport> SessionSource<T> {
    /// Turn the source into a session, building a transport only when a connection is needed
    pub fn resolve_with(
        self,
        config: &SessionConfig,
        transport: impl FnOnce(&SessionConfig) -> Result<T, AciError>,
    ) -> Result<Session<T>, AciError> {
        match self {
            Self::Existing(session) => Ok(session),
            Self::Address(address) => {
                let address = Address::new(&address)?.with_gateway_rule(config.gateway_rule);
                Session::with_transport(address, transport(config)?, config)
            }
        }
    }
}

impl SessionSource<HttpTransport> {
    /// Turn the source into a session, connecting over HTTPS when given an address
    pub fn resolve(self, config: &SessionConfig) -> Result<Session, AciError> {
        self.resolve_with(config, HttpTransport::new)
    }
}

impl<T: Transport> From<Session<T>> for SessionSource<T> {
    fn from(session: Session<T>) -> Self {
        Self::Existing(session)
    }
}

impl<T: Transport> From<&str> for SessionSource<T> {
    fn from(address: &str) -> Self {
        Self::Address(address.to_string())
    }
}

impl<T: Transport> From<String> for SessionSource<T> {
    fn from(address: String) -> Self {
        Self::Address(address)
    }
}

fn check_status(response: ApiResponse) -> Result<ApiResponse, AciError> {
    match response.status {
        401 => Err(AciError::AuthenticationFailed(response.body)),
        status if status >= 400 => Err(AciError::HttpError {
            status,
            body: response.body,
        }),
        _ => Ok(response),
    }
}

/// Cookie from `Set-Cookie`, else the `token` attribute of an `aaaLogin` body
fn session_token(response: &ApiResponse) -> Option<String> {
    if let Some(cookie) = &response.cookie {
        return Some(cookie.clone());
    }
    let document = ResponseDocument::parse(&response.body).ok()?;
    document
        .imdata()
        .iter()
        .find_map(|object| object.attribute("token"))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

/// Strip `mo/` and a `.json`/`.xml` suffix from a dn
fn normalize_dn(dn: &str) -> &str {
    let dn = dn.trim().trim_start_matches('/');
    let dn = dn.strip_prefix("mo/").unwrap_or(dn);
    dn.strip_suffix(".json")
        .or_else(|| dn.strip_suffix(".xml"))
        .unwrap_or(dn)
}

fn count_of(text: &str, chars: &[char]) -> usize {
    text.chars().filter(|c| chars.contains(c)).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;

    const EMPTY: &str = r#"{"totalCount":"0","imdata":[]}"#;
    const TENANTS: &str = r#"{"totalCount":"1","imdata":[{"fvTenant":{"attributes":{"dn":"uni/tn-a","name":"a"}}}]}"#;

    fn config() -> SessionConfig {
        SessionConfig {
            username: Some("admin".to_string()),
            password: Some("secret".to_string()),
            ..SessionConfig::default()
        }
    }

    fn open(mock: &MockTransport, config: &SessionConfig) -> Session<MockTransport> {
        Session::with_transport(Address::new("10.0.0.1").unwrap(), mock.clone(), config).unwrap()
    }

    fn logged_in(mock: &MockTransport) -> Session<MockTransport> {
        let mut session = open(mock, &config());
        mock.login_ok("token-1");
        session.login(None, None).unwrap();
        session
    }

    #[test]
    fn test_unreachable_host() {
        let mock = MockTransport::new();
        mock.set_reachable(false);
        let result = Session::with_transport(Address::new("10.0.0.1").unwrap(), mock.clone(), &config());
        assert!(matches!(result, Err(AciError::UnreachableHost(_))));
        assert_eq!(mock.probes(), 1);
        assert!(mock.requests().is_empty());
    }

    #[test]
    fn test_login_stores_cookie() {
        let mock = MockTransport::new();
        let session = logged_in(&mock);
        assert_eq!(session.status(), SessionStatus::Authenticated);
        assert!(session.established_at().is_some());

        let login = &mock.requests()[0];
        assert_eq!(login.url, "https://10.0.0.1/api/aaaLogin.json");
        let body: Value = serde_json::from_str(login.body.as_deref().unwrap()).unwrap();
        assert_eq!(body, json!({"aaaUser": {"attributes": {"name": "admin", "pwd": "secret"}}}));
    }

    #[test]
    fn test_login_token_from_body() {
        let mock = MockTransport::new();
        let mut session = open(&mock, &config());
        mock.respond(
            "aaaLogin.json",
            200,
            r#"{"imdata":[{"aaaLogin":{"attributes":{"token":"from-body"}}}]}"#,
        )
        .respond("class/fvTenant.json", 200, EMPTY);
        session.login(None, None).unwrap();
        session.get("class/fvTenant.json", &[]).unwrap();
        assert_eq!(mock.requests()[1].cookie.as_deref(), Some("from-body"));
    }

    #[test]
    fn test_login_401_clears_credentials() {
        let mock = MockTransport::new();
        let mut session = open(&mock, &config());
        mock.respond("aaaLogin.json", 401, "bad password");

        let result = session.login(None, None);
        assert!(matches!(result, Err(AciError::AuthenticationFailed(_))));
        assert!(!session.has_credentials());
        assert_eq!(session.status(), SessionStatus::Connected);

        // nothing left to log in with
        assert!(matches!(session.login(None, None), Err(AciError::AuthenticationFailed(_))));
        assert_eq!(mock.calls_to("aaaLogin.json"), 1);
    }

    #[test]
    fn test_login_server_error_is_fatal() {
        let mock = MockTransport::new();
        let mut session = open(&mock, &config());
        mock.respond("aaaLogin.json", 500, "boom");
        assert!(matches!(
            session.login(None, None),
            Err(AciError::HttpError { status: 500, .. })
        ));
        assert!(session.has_credentials());
    }

    #[test]
    fn test_403_triggers_exactly_one_relogin_and_retry() {
        let mock = MockTransport::new();
        let mut session = logged_in(&mock);
        mock.respond("class/fvTenant.json", 403, "token expired")
            .respond("class/fvTenant.json", 200, TENANTS)
            .login_ok("token-2");

        let document = session.get_document("class/fvTenant.json", &[]).unwrap();
        assert_eq!(document.attribute("name").unwrap(), vec!["a"]);
        assert_eq!(mock.calls_to("aaaLogin.json"), 2);
        assert_eq!(mock.calls_to("class/fvTenant.json"), 2);

        let requests = mock.requests();
        assert_eq!(requests[1].cookie.as_deref(), Some("token-1"));
        assert_eq!(requests[3].cookie.as_deref(), Some("token-2"));
    }

    #[test]
    fn test_second_403_is_fatal() {
        let mock = MockTransport::new();
        let mut session = logged_in(&mock);
        mock.respond("class/fvTenant.json", 403, "expired")
            .respond("class/fvTenant.json", 403, "still expired")
            .login_ok("token-2");

        let result = session.get("class/fvTenant.json", &[]);
        assert!(matches!(result, Err(AciError::SessionExpired(_))));
        assert_eq!(mock.calls_to("aaaLogin.json"), 2);
        assert_eq!(mock.calls_to("class/fvTenant.json"), 2);
    }

    #[test]
    fn test_403_without_auto_login() {
        let mock = MockTransport::new();
        let mut session = logged_in(&mock);
        session.set_auto_login(false);
        mock.respond("mo.json", 403, "expired");

        let result = session.post_payload(json!({"fvTenant": {"attributes": {"name": "a"}}}));
        assert!(matches!(result, Err(AciError::SessionExpired(_))));
        assert_eq!(mock.calls_to("aaaLogin.json"), 1);
        assert_eq!(mock.calls_to("mo.json"), 1);
    }

    #[test]
    fn test_post_retries_after_relogin() {
        let mock = MockTransport::new();
        let mut session = logged_in(&mock);
        mock.respond("mo.json", 403, "expired")
            .respond("mo.json", 200, EMPTY)
            .login_ok("token-2");

        let response = session.post_payload(json!({"fvTenant": {"attributes": {"name": "a"}}})).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(mock.calls_to("mo.json"), 2);
    }

    #[test]
    fn test_http_errors_carry_body() {
        let mock = MockTransport::new();
        let mut session = logged_in(&mock);
        mock.respond("mo.xml", 400, "invalid dn")
            .respond("class/bogus.json", 500, "internal");

        match session.post_payload(Payload::Markup("<fvTenant name='a'/>".to_string())) {
            Err(AciError::HttpError { status, body }) => {
                assert_eq!(status, 400);
                assert_eq!(body, "invalid dn");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(matches!(
            session.get("class/bogus.json", &[]),
            Err(AciError::HttpError { status: 500, .. })
        ));
        assert_eq!(mock.requests()[1].content_type, Some(CONTENT_XML));
    }

    #[test]
    fn test_refresh_is_not_retried() {
        let mock = MockTransport::new();
        let mut session = logged_in(&mock);
        mock.respond("mo/aaaRefresh.json", 403, "expired");

        assert!(matches!(session.refresh(), Err(AciError::SessionExpired(_))));
        assert_eq!(mock.calls_to("aaaLogin.json"), 1);
        assert_eq!(mock.calls_to("mo/aaaRefresh.json"), 1);
    }

    #[test]
    fn test_refresh_updates_cookie() {
        let mock = MockTransport::new();
        let mut session = logged_in(&mock);
        mock.respond_with_cookie("mo/aaaRefresh.json", 200, EMPTY, "token-3")
            .respond("class/fvTenant.json", 200, EMPTY);

        session.refresh().unwrap();
        session.get("class/fvTenant.json", &[]).unwrap();
        assert_eq!(mock.requests().last().unwrap().cookie.as_deref(), Some("token-3"));
    }

    #[test]
    fn test_refresh_without_session() {
        let mock = MockTransport::new();
        let mut session = open(&mock, &config());
        assert!(matches!(session.refresh(), Err(AciError::SessionExpired(_))));
        assert!(mock.requests().is_empty());
    }

    #[test]
    fn test_logout_clears_state() {
        let mock = MockTransport::new();
        let mut session = logged_in(&mock);
        mock.respond("mo/aaaLogout.json", 200, EMPTY);

        session.logout().unwrap();
        assert_eq!(session.status(), SessionStatus::Disconnected);
        assert!(!session.has_credentials());
        assert!(session.established_at().is_none());

        let body: Value = serde_json::from_str(mock.requests()[1].body.as_deref().unwrap()).unwrap();
        assert_eq!(body, json!({"aaaUser": {"attributes": {"name": "admin"}}}));
    }

    #[test]
    fn test_login_after_logout_probes_again() {
        let mock = MockTransport::new();
        let mut session = logged_in(&mock);
        mock.respond("mo/aaaLogout.json", 200, EMPTY);
        session.logout().unwrap();

        mock.login_ok("token-9");
        session.login(Some("ops"), Some("pw")).unwrap();
        assert_eq!(mock.probes(), 2);
        assert_eq!(session.username(), Some("ops"));
        assert_eq!(session.status(), SessionStatus::Authenticated);
    }

    #[test]
    fn test_query_parameters_are_sent() {
        let mock = MockTransport::new();
        let mut session = logged_in(&mock);
        mock.respond("class/fvTenant.json", 200, EMPTY);

        let document = session
            .get_document("/class/fvTenant.json", &[("query-target", "self")])
            .unwrap();
        assert!(document.is_empty());
        let request = mock.requests().pop().unwrap();
        assert_eq!(request.query, vec![("query-target".to_string(), "self".to_string())]);
    }

    #[test]
    fn test_exists_and_class_of() {
        let mock = MockTransport::new();
        let mut session = logged_in(&mock);
        mock.respond("mo/uni/tn-a.json", 200, TENANTS)
            .respond("mo/uni/tn-a.json", 200, TENANTS)
            .respond("mo/uni/tn-missing.json", 200, EMPTY)
            .respond("mo/uni/tn-missing.json", 200, EMPTY)
            .respond(
                "mo/bad.json",
                400,
                r#"{"totalCount":"1","imdata":[{"error":{"attributes":{"code":"400","text":"bad"}}}]}"#,
            );

        assert!(session.exists("uni/tn-a").unwrap());
        assert_eq!(session.class_of("mo/uni/tn-a.json").unwrap(), "fvTenant");
        assert!(!session.exists("uni/tn-missing").unwrap());
        assert!(matches!(session.class_of("uni/tn-missing"), Err(AciError::NotFound(_))));
        assert!(!session.exists("bad").unwrap());

        let lookup = &mock.requests()[1];
        assert_eq!(lookup.query, vec![("rsp-prop-include".to_string(), "naming-only".to_string())]);
    }

    #[test]
    fn test_delete_object() {
        let mock = MockTransport::new();
        let mut session = logged_in(&mock);
        mock.respond("mo/uni/tn-a.json", 200, TENANTS)
            .respond("mo.json", 200, EMPTY);

        session.delete_object("uni/tn-a").unwrap();
        let post = mock.requests().pop().unwrap();
        let body: Value = serde_json::from_str(post.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["fvTenant"]["attributes"]["status"], "deleted");
        assert_eq!(body["fvTenant"]["attributes"]["dn"], "uni/tn-a");
    }

    #[test]
    fn test_post_file_substitutes_variables() {
        let dir = std::env::temp_dir().join(format!("aci-client-post-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("tenant.cfg");
        std::fs::write(&file, r#"<fvTenant name="{{tenant}}" descr="{{descr}}"/>"#).unwrap();

        let mock = MockTransport::new();
        let mut session = logged_in(&mock);
        mock.respond("mo.xml", 200, EMPTY);

        let variables = HashMap::from([
            ("tenant".to_string(), "blue".to_string()),
            ("descr".to_string(), "lab".to_string()),
        ]);
        session.post_file(&file, &variables).unwrap();
        let post = mock.requests().pop().unwrap();
        assert_eq!(post.body.as_deref(), Some("<fvTenant name='blue' descr='lab'/>"));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_payload_from_text() {
        assert!(matches!(Payload::from_text("  <a x='1'/>"), Ok(Payload::Markup(_))));
        assert!(matches!(Payload::from_text(r#"{"a": {"attributes": {}}}"#), Ok(Payload::Json(_))));
        assert!(Payload::from_text("not json").is_err());
    }

    #[test]
    fn test_session_source() {
        let mock = MockTransport::new();
        let existing = open(&mock, &config());
        let session = SessionSource::from(existing)
            .resolve_with(&config(), |_| -> Result<MockTransport, AciError> {
                panic!("no transport needed for an existing session")
            })
            .unwrap();
        assert_eq!(session.base_url(), "https://10.0.0.1");

        let other = MockTransport::new();
        let session = SessionSource::<MockTransport>::from("192.0.2.10")
            .resolve_with(&config(), |_| Ok(other.clone()))
            .unwrap();
        assert_eq!(session.address().to_string(), "192.0.2.10");
        assert_eq!(other.probes(), 1);
    }

    #[test]
    fn test_transport_failure_is_not_retried() {
        let mock = MockTransport::new();
        let mut session = logged_in(&mock);
        mock.fail("class/fvTenant.json").fail("mo.json");

        assert!(matches!(session.get("class/fvTenant.json", &[]), Err(AciError::Transport(_))));
        assert!(matches!(
            session.post_payload(json!({"fvTenant": {"attributes": {"name": "a"}}})),
            Err(AciError::Transport(_))
        ));
        assert_eq!(mock.calls_to("aaaLogin.json"), 1);
        assert_eq!(mock.calls_to("class/fvTenant.json"), 1);
        assert_eq!(mock.calls_to("mo.json"), 1);
        assert_eq!(session.status(), SessionStatus::Authenticated);
    }

    #[test]
    fn test_is_logged_in_asks_the_controller() {
        let mock = MockTransport::new();
        let mut session = open(&mock, &config());
        assert!(!session.is_logged_in().unwrap());
        assert!(mock.requests().is_empty());

        mock.login_ok("token-1")
            .respond("mo/topology/pod-1/node-1.json", 200, EMPTY)
            .respond("mo/topology/pod-1/node-1.json", 403, "expired");
        session.login(None, None).unwrap();

        assert!(session.is_logged_in().unwrap());
        assert!(!session.is_logged_in().unwrap());
        // the check itself never logs in again
        assert_eq!(mock.calls_to("aaaLogin.json"), 1);
        assert_eq!(mock.requests().last().unwrap().cookie.as_deref(), Some("token-1"));
        assert_eq!(session.status(), SessionStatus::Authenticated);
    }

    #[test]
    fn test_identity() {
        let mock = MockTransport::new();
        let mut session = logged_in(&mock);
        mock.respond(
            "class/topSystem.json",
            200,
            r#"{"totalCount":"1","imdata":[{"topSystem":{"attributes":{
                "dn":"topology/pod-1/node-1","id":"1","podId":"1","name":"apic1","role":"controller",
                "oobMgmtAddr":"10.0.0.1"}}}]}"#,
        )
        .respond("class/topSystem.json", 200, EMPTY);

        let identity = session.identity().unwrap();
        assert_eq!(
            identity,
            NodeIdentity {
                dn: "topology/pod-1/node-1".to_string(),
                id: 1,
                pod: 1,
                name: "apic1".to_string(),
                role: "controller".to_string(),
            }
        );
        let lookup = mock.requests().pop().unwrap();
        assert_eq!(
            lookup.query,
            vec![(
                "query-target-filter".to_string(),
                r#"eq(topSystem.oobMgmtAddr, "10.0.0.1")"#.to_string()
            )]
        );

        assert!(matches!(session.identity(), Err(AciError::NotFound(_))));
    }

    #[test]
    fn test_debug_hides_password() {
        let mock = MockTransport::new();
        let session = open(&mock, &config());
        assert!(!format!("{session:?}").contains("secret"));
    }
}
