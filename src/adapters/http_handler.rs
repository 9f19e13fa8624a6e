//! The HTTP routing layer: maps a URL path segment to a registered service
//! and turns every [`ForwardError`] into a client-visible response.
//!
//! This is the single point where forwarding failures become HTTP statuses;
//! nothing below it writes responses.

use std::{net::SocketAddr, sync::Arc};

use axum::body::Body as AxumBody;
use http::{Method, StatusCode, header};
use hyper::{Request, Response};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::Instrument;

use crate::core::{
    forwarder::{ForwardError, InboundRequest, UpstreamForwarder},
    registry::ServiceRegistry,
};

/// The methods the gateway relays. Everything else is refused up front.
const FORWARDED_METHODS: [Method; 5] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
];

static SERVICE_SEGMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new("^[A-Za-z-]+$").expect("valid segment regex"));

/// HTTP handler for the wicket gateway.
#[derive(Clone)]
pub struct HttpHandler {
    registry: Arc<ServiceRegistry>,
    forwarder: Arc<UpstreamForwarder>,
}

impl HttpHandler {
    pub fn new(registry: Arc<ServiceRegistry>, forwarder: Arc<UpstreamForwarder>) -> Self {
        Self {
            registry,
            forwarder,
        }
    }

    /// Handle one inbound request end to end. Never fails: every outcome
    /// is a response.
    pub async fn handle_request(
        &self,
        req: Request<AxumBody>,
        peer: SocketAddr,
    ) -> Response<AxumBody> {
        let method = req.method().clone();

        if !FORWARDED_METHODS.contains(&method) {
            return Self::plain_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed");
        }

        let path = req.uri().path();
        if path == "/" {
            return Self::plain_response(StatusCode::BAD_REQUEST, "No service provided");
        }

        // Exactly one path segment names the service; anything else was
        // never a valid gateway address.
        let segment = path.strip_prefix('/').unwrap_or(path);
        if segment.contains('/') || !SERVICE_SEGMENT_RE.is_match(segment) {
            return Self::plain_response(StatusCode::BAD_REQUEST, "No such service");
        }

        let request_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!(
            "request",
            http.method = %method,
            service = %segment,
            peer = %peer,
            request.id = %request_id,
        );

        let Some(service) = self.registry.lookup(segment) else {
            tracing::debug!(service = %segment, "request for unknown service");
            return Self::error_response(&ForwardError::UnknownService(segment.to_string()));
        };

        let (parts, body) = req.into_parts();
        let inbound = InboundRequest {
            method: parts.method,
            headers: parts.headers,
            query: parts.uri.query().map(str::to_string),
            body,
            peer: peer.ip(),
        };

        match self
            .forwarder
            .forward(&service, inbound)
            .instrument(span)
            .await
        {
            Ok(outcome) => outcome.into_response(),
            Err(e) => {
                tracing::info!(service = %service.name(), error = %e, "forwarding failed");
                Self::error_response(&e)
            }
        }
    }

    /// Map a classified failure to the client-facing status and reason.
    fn error_response(error: &ForwardError) -> Response<AxumBody> {
        let (status, message) = match error {
            ForwardError::UnknownService(_) => (StatusCode::BAD_REQUEST, error.to_string()),
            // the offending address goes to the logs, not the response
            ForwardError::AccessDenied { service, peer } => {
                tracing::warn!(service = %service, peer = %peer, "denied by access list");
                (
                    StatusCode::FORBIDDEN,
                    "Source address is not allowed".to_string(),
                )
            }
            ForwardError::BodyRead(_) => (StatusCode::BAD_REQUEST, error.to_string()),
            ForwardError::UpstreamUnreachable(_) => {
                (StatusCode::BAD_GATEWAY, "Upstream unreachable".to_string())
            }
            ForwardError::UpstreamError { status, message } => (*status, message.clone()),
        };
        Self::plain_response(status, &message)
    }

    fn plain_response(status: StatusCode, message: &str) -> Response<AxumBody> {
        Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(AxumBody::from(message.to_string()))
            .unwrap_or_else(|_| {
                let mut response = Response::new(AxumBody::from(message.to_string()));
                *response.status_mut() = status;
                response
            })
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use async_trait::async_trait;
    use http_body_util::BodyExt;

    use super::*;
    use crate::{
        config::models::{GatewayConfig, ServiceEntry},
        ports::http_client::{HttpClient, HttpClientError, HttpClientResult},
    };

    /// Mock port counting outbound calls and answering with a canned
    /// status/body pair.
    struct MockHttpClient {
        reply_status: StatusCode,
        reply_body: &'static str,
        fail_connect: bool,
        requests: AtomicUsize,
    }

    impl MockHttpClient {
        fn ok() -> Self {
            Self {
                reply_status: StatusCode::OK,
                reply_body: "upstream says hi",
                fail_connect: false,
                requests: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn send_request(
            &self,
            _req: Request<AxumBody>,
        ) -> HttpClientResult<Response<AxumBody>> {
            self.requests.fetch_add(1, Ordering::Relaxed);
            if self.fail_connect {
                return Err(HttpClientError::ConnectionError("refused".to_string()));
            }
            Ok(Response::builder()
                .status(self.reply_status)
                .body(AxumBody::from(self.reply_body))
                .expect("valid response"))
        }
    }

    fn handler_with(client: Arc<MockHttpClient>) -> HttpHandler {
        let mut config = GatewayConfig::default();
        config.services.insert(
            "echo".to_string(),
            ServiceEntry {
                target: "http://upstream:9000/api".to_string(),
                allowlist_enabled: Some(false),
                ..ServiceEntry::default()
            },
        );
        let registry = Arc::new(ServiceRegistry::from_config(&config).expect("builds"));
        let forwarder = Arc::new(UpstreamForwarder::new(client, Duration::from_secs(5)));
        HttpHandler::new(registry, forwarder)
    }

    fn request(method: Method, path_and_query: &str) -> Request<AxumBody> {
        Request::builder()
            .method(method)
            .uri(path_and_query)
            .body(AxumBody::empty())
            .expect("valid request")
    }

    fn peer() -> SocketAddr {
        "10.1.2.3:55555".parse().expect("valid addr")
    }

    async fn body_text(response: Response<AxumBody>) -> String {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body collects")
            .to_bytes();
        String::from_utf8_lossy(&bytes).to_string()
    }

    #[tokio::test]
    async fn test_root_path_has_no_service() {
        let client = Arc::new(MockHttpClient::ok());
        let handler = handler_with(client.clone());

        let response = handler.handle_request(request(Method::GET, "/"), peer()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(response).await, "No service provided");
        assert_eq!(client.requests.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_unknown_service_makes_no_outbound_call() {
        let client = Arc::new(MockHttpClient::ok());
        let handler = handler_with(client.clone());

        let response = handler
            .handle_request(request(Method::GET, "/missing"), peer())
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.contains("missing"));
        assert_eq!(client.requests.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_multi_segment_paths_are_rejected() {
        let client = Arc::new(MockHttpClient::ok());
        let handler = handler_with(client.clone());

        let response = handler
            .handle_request(request(Method::GET, "/echo/extra"), peer())
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(response).await, "No such service");
        assert_eq!(client.requests.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_segment_charset_is_enforced() {
        let client = Arc::new(MockHttpClient::ok());
        let handler = handler_with(client.clone());

        let response = handler
            .handle_request(request(Method::GET, "/svc_1"), peer())
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(response).await, "No such service");
    }

    #[tokio::test]
    async fn test_unsupported_method_is_refused() {
        let client = Arc::new(MockHttpClient::ok());
        let handler = handler_with(client.clone());

        let response = handler
            .handle_request(request(Method::HEAD, "/echo"), peer())
            .await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(client.requests.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_successful_forward_passes_through() {
        let client = Arc::new(MockHttpClient::ok());
        let handler = handler_with(client.clone());

        let response = handler
            .handle_request(request(Method::GET, "/Echo?x=1"), peer())
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "upstream says hi");
        assert_eq!(client.requests.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_upstream_error_surfaces_upstream_status() {
        let client = Arc::new(MockHttpClient {
            reply_status: StatusCode::SERVICE_UNAVAILABLE,
            reply_body: "try later",
            fail_connect: false,
            requests: AtomicUsize::new(0),
        });
        let handler = handler_with(client);

        let response = handler
            .handle_request(request(Method::GET, "/echo"), peer())
            .await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_text(response).await, "try later");
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_bad_gateway() {
        let client = Arc::new(MockHttpClient {
            reply_status: StatusCode::OK,
            reply_body: "",
            fail_connect: true,
            requests: AtomicUsize::new(0),
        });
        let handler = handler_with(client);

        let response = handler
            .handle_request(request(Method::GET, "/echo"), peer())
            .await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_denied_peer_gets_403_without_detail() {
        let client = Arc::new(MockHttpClient::ok());
        let mut config = GatewayConfig::default();
        config.services.insert(
            "guarded".to_string(),
            ServiceEntry {
                target: "http://upstream:9000/api".to_string(),
                ..ServiceEntry::default()
            },
        );
        let registry = Arc::new(ServiceRegistry::from_config(&config).expect("builds"));
        let forwarder = Arc::new(UpstreamForwarder::new(client.clone(), Duration::from_secs(5)));
        let handler = HttpHandler::new(registry, forwarder);

        let response = handler
            .handle_request(request(Method::GET, "/guarded"), peer())
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let text = body_text(response).await;
        // the peer address is logged, never echoed back
        assert!(!text.contains("10.1.2.3"));
        assert_eq!(client.requests.load(Ordering::Relaxed), 0);
    }
}
