//! Mock transport for unit testing
//!
//! [`MockTransport`] answers requests from per-path queues of scripted
//! responses and records every request it sees, so tests can assert how many
//! logins and retries a [`Session`](crate::Session) performed without a
//! running APIC. Clones share state: keep one handle for assertions and move
//! the other into the session.
//!
//! [`MockTransport::fail`] scripts a connection-level failure, surfaced as
//! [`AciError::Transport`] the way a refused or timed-out connection is.

use crate::error::AciError;
use crate::transport::{ApiRequest, ApiResponse, Transport};
use std::collections::{HashMap, VecDeque};
use reqwest::blocking::Client;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Mock transport for testing
#[derive(Debug, Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

#[derive(Debug)]
struct MockState {
    reachable: bool,
    probes: usize,
    responses: HashMap<String, VecDeque<Scripted>>,
    requests: Vec<ApiRequest>,
}

#[derive(Debug)]
enum Scripted {
    Response(ApiResponse),
    ConnectionFailure,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Create a reachable mock with no scripted responses
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                reachable: true,
                probes: 0,
                responses: HashMap::new(),
                requests: Vec::new(),
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the connectivity probe fail (or succeed again)
    pub fn set_reachable(&self, reachable: bool) {
        self.state().reachable = reachable;
    }

    /// Queue a response for the next request to `path`
    pub fn respond(&self, path: &str, status: u16, body: impl Into<String>) -> &Self {
        self.push(path, Scripted::Response(ApiResponse::new(status, body)))
    }

    /// Queue a connection failure for the next request to `path`
    pub fn fail(&self, path: &str) -> &Self {
        self.push(path, Scripted::ConnectionFailure)
    }

    /// Queue a response that also sets the session cookie
    pub fn respond_with_cookie(&self, path: &str, status: u16, body: impl Into<String>, cookie: &str) -> &Self {
        let mut response = ApiResponse::new(status, body);
        response.cookie = Some(cookie.to_string());
        self.push(path, Scripted::Response(response))
    }

    /// Queue a successful login issuing `token`
    pub fn login_ok(&self, token: &str) -> &Self {
        let body = format!(
            r#"{{"totalCount":"1","imdata":[{{"aaaLogin":{{"attributes":{{"token":"{token}","userName":"admin"}}}}}}]}}"#
        );
        self.respond_with_cookie("aaaLogin.json", 200, body, token)
    }

    fn push(&self, path: &str, response: Scripted) -> &Self {
        self.state()
            .responses
            .entry(path.trim_start_matches('/').to_string())
            .or_default()
            .push_back(response);
        self
    }

    /// Every request received so far
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.state().requests.clone()
    }

    /// Number of requests received for `path`
    pub fn calls_to(&self, path: &str) -> usize {
        let path = path.trim_start_matches('/');
        self.state().requests.iter().filter(|r| r.path == path).count()
    }

    /// Number of connectivity probes performed
    pub fn probes(&self) -> usize {
        self.state().probes
    }
}

impl Transport for MockTransport {
    fn probe(&self, base_url: &str) -> Result<(), AciError> {
        let mut state = self.state();
        state.probes += 1;
        if state.reachable {
            Ok(())
        } else {
            Err(AciError::UnreachableHost(base_url.to_string()))
        }
    }

    fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, AciError> {
        let mut state = self.state();
        state.requests.push(request.clone());
        match state.responses.get_mut(&request.path).and_then(VecDeque::pop_front) {
            Some(Scripted::Response(response)) => Ok(response),
            Some(Scripted::ConnectionFailure) => Err(connection_error(&request.path)),
            None => Err(AciError::InvalidRequest(format!(
                "no mock response scripted for {}",
                request.path
            ))),
        }
    }
}

/// A genuine `reqwest` error, produced without touching the network
fn connection_error(path: &str) -> AciError {
    match Client::new().get("not a url").build() {
        Err(e) => AciError::Transport(e),
        Ok(_) => AciError::UnreachableHost(path.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Method;

    fn request(path: &str) -> ApiRequest {
        ApiRequest {
            method: Method::Get,
            path: path.to_string(),
            url: format!("https://10.0.0.1/api/{path}"),
            query: Vec::new(),
            body: None,
            content_type: None,
            cookie: None,
        }
    }

    #[test]
    fn test_scripted_responses_in_order() {
        let mock = MockTransport::new();
        mock.respond("/class/fvTenant.json", 200, "first")
            .fail("class/fvTenant.json")
            .respond("class/fvTenant.json", 500, "third");

        assert_eq!(mock.execute(&request("class/fvTenant.json")).unwrap().body, "first");
        assert!(matches!(
            mock.execute(&request("class/fvTenant.json")),
            Err(AciError::Transport(_))
        ));
        assert_eq!(mock.execute(&request("class/fvTenant.json")).unwrap().status, 500);
        assert!(matches!(
            mock.execute(&request("class/fvTenant.json")),
            Err(AciError::InvalidRequest(_))
        ));
        assert_eq!(mock.calls_to("class/fvTenant.json"), 4);
    }
}
