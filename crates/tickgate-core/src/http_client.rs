use std::collections::{BTreeMap, VecDeque};
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

/// HTTP method set needed by provider adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
}

/// HTTP request envelope used by adapter transport calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub timeout_ms: u64,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: BTreeMap::new(),
            timeout_ms: 10_000,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// HTTP response envelope returned by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Transport-level error. The message wording is load-bearing: the failure
/// classifier tags errors by substring, so timeouts say "timed out" and
/// connection problems say "network".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    message: String,
}

impl HttpError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn timed_out(timeout_ms: u64) -> Self {
        Self::new(format!("request timed out after {timeout_ms} ms"))
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for HttpError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HttpError {}

pub type HttpFuture<'a> = Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>>;

/// Transport contract; adapters never touch a concrete HTTP stack.
pub trait HttpClient: Send + Sync {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a>;
}

/// Production transport backed by reqwest with rustls.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: Arc<reqwest::Client>,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self {
            client: Arc::new(
                reqwest::Client::builder()
                    .user_agent(concat!("tickgate/", env!("CARGO_PKG_VERSION")))
                    .build()
                    .unwrap_or_else(|_| reqwest::Client::new()),
            ),
        }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for ReqwestHttpClient {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
        Box::pin(async move {
            let mut builder = match request.method {
                HttpMethod::Get => self.client.get(&request.url),
            };

            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }
            builder = builder.timeout(std::time::Duration::from_millis(request.timeout_ms));

            let response = builder.send().await.map_err(|error| {
                if error.is_timeout() {
                    HttpError::timed_out(request.timeout_ms)
                } else if error.is_connect() {
                    HttpError::new(format!("network connect error: {error}"))
                } else {
                    HttpError::new(format!("network error: {error}"))
                }
            })?;

            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .map_err(|error| HttpError::new(format!("network error reading body: {error}")))?;

            Ok(HttpResponse { status, body })
        })
    }
}

#[derive(Debug)]
struct ScriptRule {
    url_contains: String,
    responses: VecDeque<Result<HttpResponse, HttpError>>,
}

/// Scripted transport for offline tests.
///
/// Rules match on a URL substring in registration order; each match pops the
/// next queued response and the last one repeats once the queue drains.
/// Every executed request is recorded for assertion.
#[derive(Debug, Default)]
pub struct ScriptedHttpClient {
    rules: Mutex<Vec<ScriptRule>>,
    log: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, url_contains: impl Into<String>, response: HttpResponse) -> Self {
        self.push(url_contains.into(), Ok(response));
        self
    }

    pub fn on_error(self, url_contains: impl Into<String>, error: HttpError) -> Self {
        self.push(url_contains.into(), Err(error));
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.log.lock().expect("request log is not poisoned").clone()
    }

    pub fn request_count(&self) -> usize {
        self.log.lock().expect("request log is not poisoned").len()
    }

    fn push(&self, url_contains: String, response: Result<HttpResponse, HttpError>) {
        let mut rules = self.rules.lock().expect("script rules are not poisoned");
        if let Some(rule) = rules.iter_mut().find(|rule| rule.url_contains == url_contains) {
            rule.responses.push_back(response);
        } else {
            rules.push(ScriptRule {
                url_contains,
                responses: VecDeque::from([response]),
            });
        }
    }
}

impl HttpClient for ScriptedHttpClient {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
        self.log
            .lock()
            .expect("request log is not poisoned")
            .push(request.clone());

        let mut rules = self.rules.lock().expect("script rules are not poisoned");
        let outcome = rules
            .iter_mut()
            .find(|rule| request.url.contains(rule.url_contains.as_str()))
            .map(|rule| {
                if rule.responses.len() > 1 {
                    rule.responses.pop_front().expect("queue is non-empty")
                } else {
                    rule.responses.front().expect("queue is non-empty").clone()
                }
            })
            .unwrap_or_else(|| {
                Err(HttpError::new(format!(
                    "no scripted response for url: {}",
                    request.url
                )))
            });

        Box::pin(async move { outcome })
    }
}
