use async_trait::async_trait;
use axum::body::Body as AxumBody;
use hyper::{Request, Response};
use thiserror::Error;

/// Custom error type for HTTP client operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpClientError {
    /// Error when the remote host cannot be reached
    #[error("connection error: {0}")]
    ConnectionError(String),

    /// Error when a request exceeds its time bound
    #[error("timed out after {0} seconds")]
    Timeout(u64),

    /// Error when the request itself is malformed
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Result type alias for HTTP client operations
pub type HttpClientResult<T> = Result<T, HttpClientError>;

/// HttpClient defines the port (interface) for outbound HTTP calls.
///
/// Both the forwarding engine and the allow-list refresher go through this
/// trait; tests substitute a mock implementation.
#[async_trait]
pub trait HttpClient: Send + Sync + 'static {
    /// Send a fully-built request and return the raw response.
    async fn send_request(&self, req: Request<AxumBody>) -> HttpClientResult<Response<AxumBody>>;

    /// Issue a plain GET, used for remote allow-list documents.
    async fn get(&self, url: &str) -> HttpClientResult<Response<AxumBody>> {
        let request = Request::builder()
            .method("GET")
            .uri(url)
            .body(AxumBody::empty())
            .map_err(|e| HttpClientError::InvalidRequest(e.to_string()))?;

        self.send_request(request).await
    }
}
