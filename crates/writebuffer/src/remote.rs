//! Remote API client.
//!
//! Both the direct create call and the batched sync call go to
//! `POST /api/<resource>`. A reply counts as success only when the status is
//! 2xx and the JSON body carries no truthy top-level error field (`message`
//! by default). That convention is weak: a legitimate payload with a
//! `message` field reads as a failure. It is kept for compatibility with the
//! existing server, and the field name is configurable.

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Url;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::RemoteConfig;
use crate::record::PendingRecord;

/// Accept header sent with every request.
const ACCEPT_VALUE: &str = "application/json, text/plain, */*";

/// Longest response body kept in an error message.
const MAX_ERROR_BODY: usize = 512;

/// How a remote call failed.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The server could not be reached, or the exchange broke off.
    ///
    /// A connection that drops after the request went out also lands here,
    /// so a buffered write may duplicate one the server already stored.
    #[error("remote API unreachable: {0}")]
    Unreachable(String),

    /// The server answered with a non-success status.
    #[error("remote API returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The server answered 2xx but the body carried an error field.
    #[error("remote API rejected the request: {message}")]
    Rejected {
        /// Value of the error field.
        message: String,
    },

    /// The response body could not be read or was not JSON.
    #[error("invalid response from remote API: {0}")]
    Decode(String),

    /// The request could not be built or its redirects could not be followed.
    #[error("invalid request: {0}")]
    Request(String),
}

impl RemoteError {
    /// Check if the failure means the server was never reached.
    ///
    /// Only these failures are eligible for local buffering.
    #[must_use]
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}

/// Result type for remote calls.
pub type Result<T> = std::result::Result<T, RemoteError>;

/// The remote API as seen by the buffer.
#[async_trait]
pub trait RemoteApi: Send + Sync + std::fmt::Debug {
    /// Create a single record.
    ///
    /// # Errors
    ///
    /// Returns a [`RemoteError`] describing why the call failed.
    async fn create(&self, record: &PendingRecord) -> Result<Value>;

    /// Deliver a batch of records in one request, serialized as a JSON array.
    ///
    /// # Errors
    ///
    /// Returns a [`RemoteError`] describing why the call failed.
    async fn submit_batch(&self, records: &[PendingRecord]) -> Result<Value>;

    /// Human-readable description of where requests go.
    fn endpoint(&self) -> String;
}

/// HTTP implementation of [`RemoteApi`].
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: reqwest::Client,
    url: Url,
    error_field: String,
}

impl HttpRemote {
    /// Create a client posting to `<base_url>/api/<resource>`.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Request`] if the URL cannot be parsed.
    pub fn new(base_url: &str, resource: &str, error_field: impl Into<String>) -> Result<Self> {
        let url = endpoint_url(base_url, resource)?;
        Ok(Self {
            client: reqwest::Client::new(),
            url,
            error_field: error_field.into(),
        })
    }

    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Request`] if the configured URL is invalid.
    pub fn from_config(config: &RemoteConfig) -> Result<Self> {
        Self::new(&config.base_url, &config.resource, config.error_field.clone())
    }

    /// The full endpoint URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn post<T: Serialize + ?Sized + Sync>(&self, body: &T) -> Result<Value> {
        let response = self
            .client
            .post(self.url.clone())
            .header(ACCEPT, ACCEPT_VALUE)
            .json(body)
            .send()
            .await
            .map_err(classify_send_error)?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;

        debug!(status, url = %self.url, "Remote API responded");
        interpret_response(status, &text, &self.error_field)
    }
}

#[async_trait]
impl RemoteApi for HttpRemote {
    async fn create(&self, record: &PendingRecord) -> Result<Value> {
        self.post(record).await
    }

    async fn submit_batch(&self, records: &[PendingRecord]) -> Result<Value> {
        self.post(records).await
    }

    fn endpoint(&self) -> String {
        self.url.to_string()
    }
}

/// Build the `/api/<resource>` URL for a base URL.
///
/// # Errors
///
/// Returns [`RemoteError::Request`] if `base_url` is not an absolute URL.
pub fn endpoint_url(base_url: &str, resource: &str) -> Result<Url> {
    let base = Url::parse(base_url).map_err(|e| RemoteError::Request(format!("{base_url}: {e}")))?;
    base.join(&format!("/api/{resource}"))
        .map_err(|e| RemoteError::Request(format!("{resource}: {e}")))
}

/// Map a transport error to a remote failure.
///
/// Redirect-policy failures mean the server answered, so they are not
/// buffered.
fn classify_send_error(err: reqwest::Error) -> RemoteError {
    if err.is_builder() || err.is_redirect() {
        RemoteError::Request(err.to_string())
    } else {
        warn!(error = %err, "Remote API unreachable");
        RemoteError::Unreachable(err.to_string())
    }
}

/// Decide whether a response counts as success.
///
/// # Errors
///
/// Returns [`RemoteError::Status`] for a non-2xx status,
/// [`RemoteError::Decode`] for a body that is not JSON, and
/// [`RemoteError::Rejected`] when the error field is present and truthy.
pub fn interpret_response(status: u16, body: &str, error_field: &str) -> Result<Value> {
    if !(200..300).contains(&status) {
        return Err(RemoteError::Status {
            status,
            body: truncate(body),
        });
    }

    let value: Value =
        serde_json::from_str(body).map_err(|e| RemoteError::Decode(e.to_string()))?;

    if let Some(field) = value.get(error_field).filter(|v| is_truthy(v)) {
        let message = match field {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return Err(RemoteError::Rejected { message });
    }

    Ok(value)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn truncate(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn pizzas() -> Vec<PendingRecord> {
        ["A", "B", "C"]
            .iter()
            .map(|name| PendingRecord::new(json!({ "pizzaName": name })))
            .collect()
    }

    fn unused_local_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("http://127.0.0.1:{port}")
    }

    #[test]
    fn test_endpoint_url() {
        let url = endpoint_url("http://localhost:3001", "pizzas").unwrap();
        assert_eq!(url.as_str(), "http://localhost:3001/api/pizzas");

        let url = endpoint_url("http://localhost:3001/app/", "pizzas").unwrap();
        assert_eq!(url.path(), "/api/pizzas");
    }

    #[test]
    fn test_endpoint_url_invalid_base() {
        let err = endpoint_url("not a url", "pizzas").unwrap_err();
        assert!(matches!(err, RemoteError::Request(_)));
    }

    #[test]
    fn test_interpret_success() {
        let value = interpret_response(200, r#"[{"_id":"1"}]"#, "message").unwrap();
        assert_eq!(value, json!([{"_id": "1"}]));
    }

    #[test]
    fn test_interpret_error_field() {
        let err = interpret_response(200, r#"{"message":"error"}"#, "message").unwrap_err();
        assert!(matches!(err, RemoteError::Rejected { ref message } if message == "error"));
    }

    #[test]
    fn test_interpret_falsy_error_field_is_success() {
        assert!(interpret_response(200, r#"{"message":""}"#, "message").is_ok());
        assert!(interpret_response(200, r#"{"message":null}"#, "message").is_ok());
    }

    #[test]
    fn test_interpret_custom_error_field() {
        assert!(interpret_response(200, r#"{"message":"hello"}"#, "error").is_ok());
        let err = interpret_response(200, r#"{"error":{"code":1}}"#, "error").unwrap_err();
        assert!(matches!(err, RemoteError::Rejected { .. }));
    }

    #[test]
    fn test_interpret_non_success_status() {
        let err = interpret_response(500, "Internal Server Error", "message").unwrap_err();
        assert!(matches!(err, RemoteError::Status { status: 500, .. }));
        assert!(!err.is_unreachable());
    }

    #[test]
    fn test_interpret_non_json_body() {
        let err = interpret_response(200, "<html>", "message").unwrap_err();
        assert!(matches!(err, RemoteError::Decode(_)));
    }

    #[test]
    fn test_truncate_long_body() {
        let body = "é".repeat(MAX_ERROR_BODY);
        let truncated = truncate(&body);
        assert!(truncated.len() <= MAX_ERROR_BODY + 3);
        assert!(truncated.ends_with("..."));
    }

    #[tokio::test]
    async fn test_submit_batch_posts_json_array() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/pizzas")
            .match_header("content-type", "application/json")
            .match_header("accept", ACCEPT_VALUE)
            .match_body(Matcher::Json(json!([
                {"pizzaName": "A"},
                {"pizzaName": "B"},
                {"pizzaName": "C"}
            ])))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"_id":"1"},{"_id":"2"},{"_id":"3"}]"#)
            .expect(1)
            .create_async()
            .await;

        let remote = HttpRemote::new(&server.url(), "pizzas", "message").unwrap();
        let value = remote.submit_batch(&pizzas()).await.unwrap();

        assert_eq!(value.as_array().map(Vec::len), Some(3));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_redirect_loop_is_not_unreachable() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/pizzas")
            .with_status(307)
            .with_header("location", "/api/pizzas")
            .create_async()
            .await;

        let remote = HttpRemote::new(&server.url(), "pizzas", "message").unwrap();
        let err = remote.submit_batch(&pizzas()).await.unwrap_err();

        assert!(matches!(err, RemoteError::Request(_)));
        assert!(!err.is_unreachable());
    }

    #[tokio::test]
    async fn test_create_posts_single_object() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/pizzas")
            .match_body(Matcher::Json(json!({"pizzaName": "A"})))
            .with_status(200)
            .with_body(r#"{"_id":"1","pizzaName":"A"}"#)
            .create_async()
            .await;

        let remote = HttpRemote::new(&server.url(), "pizzas", "message").unwrap();
        let record = PendingRecord::new(json!({"pizzaName": "A"}));
        let value = remote.create(&record).await.unwrap();

        assert_eq!(value["_id"], "1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_by_message_field() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/pizzas")
            .with_status(200)
            .with_body(r#"{"message":"error"}"#)
            .create_async()
            .await;

        let remote = HttpRemote::new(&server.url(), "pizzas", "message").unwrap();
        let err = remote.submit_batch(&pizzas()).await.unwrap_err();
        assert!(matches!(err, RemoteError::Rejected { .. }));
    }

    #[tokio::test]
    async fn test_server_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/pizzas")
            .with_status(400)
            .with_body(r#"{"errors":{"pizzaName":"required"}}"#)
            .create_async()
            .await;

        let remote = HttpRemote::new(&server.url(), "pizzas", "message").unwrap();
        let err = remote.create(&pizzas()[0]).await.unwrap_err();
        assert!(matches!(err, RemoteError::Status { status: 400, .. }));
        assert!(!err.is_unreachable());
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let remote = HttpRemote::new(&unused_local_url(), "pizzas", "message").unwrap();
        let err = remote.submit_batch(&pizzas()).await.unwrap_err();
        assert!(err.is_unreachable());
    }

    #[test]
    fn test_from_config() {
        let config = RemoteConfig::default();
        let remote = HttpRemote::from_config(&config).unwrap();
        assert!(remote.endpoint().ends_with("/api/pizzas"));
        assert_eq!(remote.url().path(), "/api/pizzas");
    }
}
