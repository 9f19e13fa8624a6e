//! The forwarding engine: relays one inbound request to a service's
//! upstream target, enforcing the service's access list on the way in.
//!
//! The engine deliberately performs no retries: every failure is terminal
//! for the request and classified into a [`ForwardError`] that the HTTP
//! handler maps to a client response. The only I/O goes through the
//! [`HttpClient`] port, so the whole path is testable with a mock.

use std::{net::IpAddr, sync::Arc, time::Duration};

use axum::body::Body as AxumBody;
use http::{HeaderMap, Method, StatusCode, header};
use http_body_util::BodyExt;
use hyper::{Request, Response};
use thiserror::Error;
use tokio::time::timeout;

use crate::{
    core::registry::Service,
    ports::http_client::{HttpClient, HttpClientError},
};

/// Longest upstream error body carried into an [`ForwardError::UpstreamError`]
/// message.
const UPSTREAM_MESSAGE_LIMIT: usize = 256;

/// Classified failure of one forwarding attempt.
#[derive(Debug, Error)]
pub enum ForwardError {
    /// Requested service name is not in the registry.
    #[error("unknown service '{0}'")]
    UnknownService(String),

    /// Source address is not in the service's effective allow set. The
    /// offending address and service are carried for logging; the display
    /// form stays generic.
    #[error("source address is not allowed")]
    AccessDenied { service: String, peer: IpAddr },

    /// The inbound body could not be read.
    #[error("failed to read request body: {0}")]
    BodyRead(String),

    /// Transport-level failure reaching the target (connect, DNS, timeout).
    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(#[source] HttpClientError),

    /// The upstream answered with a non-success status.
    #[error("upstream responded with status {status}")]
    UpstreamError { status: StatusCode, message: String },
}

/// The inbound request as handed over by the routing layer: everything the
/// engine needs, already detached from the server types.
pub struct InboundRequest {
    pub method: Method,
    pub headers: HeaderMap,
    /// Raw query string without the leading '?', passed through verbatim.
    pub query: Option<String>,
    pub body: AxumBody,
    /// Resolved source address of the inbound connection.
    pub peer: IpAddr,
}

/// The success envelope: the upstream's status, its headers minus
/// `Content-Length` (the transport recomputes framing), and its body
/// streamed through.
#[derive(Debug)]
pub struct ForwardedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: AxumBody,
}

impl ForwardedResponse {
    pub fn into_response(self) -> Response<AxumBody> {
        let mut response = Response::new(self.body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Relays request/response pairs to upstream targets.
pub struct UpstreamForwarder {
    http_client: Arc<dyn HttpClient>,
    request_timeout: Duration,
}

impl UpstreamForwarder {
    pub fn new(http_client: Arc<dyn HttpClient>, request_timeout: Duration) -> Self {
        Self {
            http_client,
            request_timeout,
        }
    }

    /// Forward one request to the service's target.
    ///
    /// Order of operations: access check, outbound construction (target URL
    /// + verbatim query, buffered body, filtered headers), bounded
    /// execution, then classification of the result.
    pub async fn forward(
        &self,
        service: &Service,
        inbound: InboundRequest,
    ) -> Result<ForwardedResponse, ForwardError> {
        if service.access_control_enabled() {
            let allowlist = service.allowlist();
            if !allowlist.matches(inbound.peer) {
                tracing::debug!(
                    peer = %inbound.peer,
                    service = %service.name(),
                    "peer not in allow set"
                );
                return Err(ForwardError::AccessDenied {
                    service: service.name().to_string(),
                    peer: inbound.peer,
                });
            }
        }

        // The path was consumed by routing; only the query travels on.
        let target_url = match &inbound.query {
            Some(query) => format!("{}?{}", service.target(), query),
            None => service.target().to_string(),
        };

        let body_bytes = inbound
            .body
            .collect()
            .await
            .map_err(|e| ForwardError::BodyRead(e.to_string()))?
            .to_bytes();

        let content_type = inbound.headers.get(header::CONTENT_TYPE).cloned();

        let mut outbound_headers = HeaderMap::with_capacity(inbound.headers.len());
        for (name, value) in &inbound.headers {
            // Framing headers are recomputed by the transport for the new
            // body; everything else travels unmodified.
            if name == header::CONTENT_TYPE || name == header::CONTENT_LENGTH {
                continue;
            }
            outbound_headers.append(name.clone(), value.clone());
        }
        if let Some(content_type) = content_type {
            outbound_headers.insert(header::CONTENT_TYPE, content_type);
        }

        let mut outbound = Request::builder()
            .method(inbound.method.clone())
            .uri(target_url.as_str())
            .body(AxumBody::from(body_bytes))
            .map_err(|e| {
                ForwardError::UpstreamUnreachable(HttpClientError::InvalidRequest(e.to_string()))
            })?;
        *outbound.headers_mut() = outbound_headers;

        tracing::debug!(
            peer = %inbound.peer,
            target = %target_url,
            method = %inbound.method,
            service = %service.name(),
            "forwarding request"
        );

        let response = match timeout(
            self.request_timeout,
            self.http_client.send_request(outbound),
        )
        .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(ForwardError::UpstreamUnreachable(e)),
            Err(_) => {
                return Err(ForwardError::UpstreamUnreachable(HttpClientError::Timeout(
                    self.request_timeout.as_secs(),
                )));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let message = Self::upstream_message(response).await;
            return Err(ForwardError::UpstreamError { status, message });
        }

        let (parts, body) = response.into_parts();
        let mut headers = parts.headers;
        headers.remove(header::CONTENT_LENGTH);

        Ok(ForwardedResponse {
            status,
            headers,
            body,
        })
    }

    /// Derive a short diagnostic message from a failed upstream response.
    async fn upstream_message(response: Response<AxumBody>) -> String {
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .map(|collected| collected.to_bytes())
            .unwrap_or_default();

        let text = String::from_utf8_lossy(&bytes);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            format!("forwarding failed with status code: {status}")
        } else {
            trimmed.chars().take(UPSTREAM_MESSAGE_LIMIT).collect()
        }
    }
}
