//! Background refresh of per-service allow-lists.
//!
//! The refresher is a timer-driven task living entirely outside the
//! request-handling concurrency domain. Each tick it enumerates the
//! registry and runs one independent cycle per service; a cycle either
//! installs a complete new [`AccessList`] or leaves the previous one
//! untouched. Failures are logged and isolated per service.

use std::{sync::Arc, time::Duration};

use http_body_util::BodyExt;
use thiserror::Error;
use tokio::time::{MissedTickBehavior, interval, timeout};

use crate::{
    config::models::AllowlistConfig,
    core::{
        network::AccessList,
        registry::{Service, ServiceRegistry},
    },
    ports::http_client::HttpClient,
    utils::json_select::select_strings,
};

/// Failure of one refresh cycle. Never reaches request handling; the
/// cycle's service keeps its previous list.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("allow-list fetch failed: {0}")]
    Fetch(String),

    #[error("allow-list document invalid: {0}")]
    Parse(String),
}

/// Periodically repopulates every service's allow-list from its configured
/// source.
#[derive(Clone)]
pub struct AllowlistRefresher {
    registry: Arc<ServiceRegistry>,
    http_client: Arc<dyn HttpClient>,
    refresh_interval: Duration,
    fetch_timeout: Duration,
}

impl AllowlistRefresher {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        http_client: Arc<dyn HttpClient>,
        config: &AllowlistConfig,
    ) -> Self {
        Self {
            registry,
            http_client,
            refresh_interval: Duration::from_secs(config.refresh_interval_mins * 60),
            fetch_timeout: Duration::from_secs(config.fetch_timeout_secs),
        }
    }

    /// Run the refresh loop. The first tick fires immediately so lists are
    /// populated at startup rather than after a full interval.
    pub async fn run(&self) {
        let mut ticker = interval(self.refresh_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_mins = self.refresh_interval.as_secs() / 60,
            services = self.registry.len(),
            "starting allow-list refresher"
        );

        loop {
            ticker.tick().await;
            tracing::debug!("refreshing service allow-lists");
            self.spawn_cycles();
        }
    }

    /// Launch one concurrent cycle per service. Cycles are not awaited: a
    /// slow source for one service must not delay any other service, and a
    /// cycle that outlives the interval makes its service skip ticks via
    /// the in-flight guard instead of queueing runs.
    fn spawn_cycles(&self) {
        for service in self.registry.services() {
            if !service.begin_refresh() {
                tracing::debug!(
                    service = %service.name(),
                    "previous refresh cycle still running; skipping tick"
                );
                continue;
            }

            let refresher = self.clone();
            tokio::spawn(async move {
                if let Err(e) = refresher.refresh_service(&service).await {
                    tracing::warn!(
                        service = %service.name(),
                        error = %e,
                        "allow-list refresh failed; keeping previous list"
                    );
                }
                service.end_refresh();
            });
        }
    }

    /// One refresh cycle for one service.
    ///
    /// Precedence: a service with static ranges parses them once and never
    /// fetches remotely; otherwise the remote document is fetched, the
    /// query path applied, and the parsed set installed atomically. Any
    /// failure leaves the previous list in place — a partial list is never
    /// installed.
    pub async fn refresh_service(&self, service: &Service) -> Result<(), RefreshError> {
        if !service.access_control_enabled() {
            return Ok(());
        }

        let has_static = !service.static_ranges().is_empty();
        if !has_static && service.allowlist_url().is_none() {
            tracing::warn!(
                service = %service.name(),
                "service has no allow-list source configured; only loopback peers will be admitted"
            );
            return Ok(());
        }

        if has_static {
            if service.allowlist().is_empty() {
                let list =
                    AccessList::parse_all(service.static_ranges().iter().map(String::as_str))
                        .map_err(|e| RefreshError::Parse(e.to_string()))?;
                tracing::debug!(
                    count = list.len(),
                    service = %service.name(),
                    "installing static CIDR ranges"
                );
                service.install_allowlist(list);
            }
            return Ok(());
        }

        let Some(url) = service.allowlist_url() else {
            return Ok(());
        };

        tracing::debug!(service = %service.name(), url = %url, "fetching allow-list document");

        let response = match timeout(self.fetch_timeout, self.http_client.get(url)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(RefreshError::Fetch(e.to_string())),
            Err(_) => {
                return Err(RefreshError::Fetch(format!(
                    "timed out after {}s",
                    self.fetch_timeout.as_secs()
                )));
            }
        };

        if !response.status().is_success() {
            return Err(RefreshError::Fetch(format!(
                "source returned status {}",
                response.status()
            )));
        }

        let bytes = response
            .into_body()
            .collect()
            .await
            .map_err(|e| RefreshError::Fetch(e.to_string()))?
            .to_bytes();

        let document: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|e| RefreshError::Parse(e.to_string()))?;

        let entries = select_strings(&document, service.allowlist_query_path())
            .map_err(RefreshError::Parse)?;

        let list =
            AccessList::parse_all(entries).map_err(|e| RefreshError::Parse(e.to_string()))?;

        tracing::debug!(
            count = list.len(),
            service = %service.name(),
            "installing fetched CIDR ranges"
        );
        service.install_allowlist(list);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        net::IpAddr,
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use async_trait::async_trait;
    use axum::body::Body as AxumBody;
    use http::StatusCode;
    use hyper::{Request, Response};

    use super::*;
    use crate::{
        config::models::{GatewayConfig, ServiceEntry},
        ports::http_client::{HttpClientError, HttpClientResult},
    };

    /// Mock port answering with a scripted sequence of responses.
    struct ScriptedHttpClient {
        responses: Mutex<VecDeque<(StatusCode, String)>>,
        requests: AtomicUsize,
    }

    impl ScriptedHttpClient {
        fn new(responses: Vec<(StatusCode, &str)>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(
                    responses
                        .into_iter()
                        .map(|(status, body)| (status, body.to_string()))
                        .collect(),
                ),
                requests: AtomicUsize::new(0),
            })
        }

        fn request_count(&self) -> usize {
            self.requests.load(Ordering::Relaxed)
        }
    }

    #[async_trait]
    impl HttpClient for ScriptedHttpClient {
        async fn send_request(
            &self,
            _req: Request<AxumBody>,
        ) -> HttpClientResult<Response<AxumBody>> {
            self.requests.fetch_add(1, Ordering::Relaxed);
            let (status, body) = self
                .responses
                .lock()
                .expect("lock")
                .pop_front()
                .ok_or_else(|| {
                    HttpClientError::ConnectionError("no scripted response left".to_string())
                })?;
            Ok(Response::builder()
                .status(status)
                .body(AxumBody::from(body))
                .expect("valid response"))
        }
    }

    fn addr(s: &str) -> IpAddr {
        s.parse().expect("valid ip")
    }

    fn registry_with(entry: ServiceEntry) -> Arc<ServiceRegistry> {
        let mut config = GatewayConfig::default();
        config.services.insert("svc".to_string(), entry);
        Arc::new(ServiceRegistry::from_config(&config).expect("builds"))
    }

    fn remote_entry(query_path: Option<&str>) -> ServiceEntry {
        ServiceEntry {
            target: "http://svc:9000".to_string(),
            allowlist_url: Some("http://config.internal/ranges.json".to_string()),
            allowlist_query_path: query_path.map(str::to_string),
            ..ServiceEntry::default()
        }
    }

    fn refresher(
        registry: Arc<ServiceRegistry>,
        client: Arc<ScriptedHttpClient>,
    ) -> AllowlistRefresher {
        AllowlistRefresher::new(registry, client, &AllowlistConfig::default())
    }

    #[tokio::test]
    async fn test_fetched_document_populates_list() {
        let client = ScriptedHttpClient::new(vec![(
            StatusCode::OK,
            r#"{"ranges":["10.0.0.0/24","192.168.1.0/24"]}"#,
        )]);
        let registry = registry_with(remote_entry(Some("ranges[*]")));
        let service = registry.lookup("svc").expect("found");

        refresher(registry.clone(), client.clone())
            .refresh_service(&service)
            .await
            .expect("cycle succeeds");

        let list = service.allowlist();
        assert_eq!(list.len(), 2);
        assert!(list.matches(addr("10.0.0.5")));
        assert!(list.matches(addr("192.168.1.5")));
        assert!(!list.matches(addr("10.0.1.5")));
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_previous_list() {
        let client = ScriptedHttpClient::new(vec![
            (StatusCode::OK, r#"{"ranges":["10.0.0.0/24"]}"#),
            (StatusCode::INTERNAL_SERVER_ERROR, "boom"),
        ]);
        let registry = registry_with(remote_entry(Some("ranges[*]")));
        let service = registry.lookup("svc").expect("found");
        let refresher = refresher(registry.clone(), client.clone());

        refresher
            .refresh_service(&service)
            .await
            .expect("first cycle succeeds");
        assert!(service.allowlist().matches(addr("10.0.0.5")));

        let result = refresher.refresh_service(&service).await;
        assert!(matches!(result, Err(RefreshError::Fetch(_))));
        // the previously installed list is untouched
        let list = service.allowlist();
        assert_eq!(list.len(), 1);
        assert!(list.matches(addr("10.0.0.5")));
    }

    #[tokio::test]
    async fn test_malformed_entry_fails_whole_cycle() {
        let client = ScriptedHttpClient::new(vec![
            (StatusCode::OK, r#"{"ranges":["10.0.0.0/24"]}"#),
            (StatusCode::OK, r#"{"ranges":["192.168.0.0/16","not-a-cidr"]}"#),
        ]);
        let registry = registry_with(remote_entry(Some("ranges[*]")));
        let service = registry.lookup("svc").expect("found");
        let refresher = refresher(registry.clone(), client.clone());

        refresher
            .refresh_service(&service)
            .await
            .expect("first cycle succeeds");

        let result = refresher.refresh_service(&service).await;
        assert!(matches!(result, Err(RefreshError::Parse(_))));
        // no partial install: the old single-range list survives
        let list = service.allowlist();
        assert_eq!(list.len(), 1);
        assert!(list.matches(addr("10.0.0.5")));
        assert!(!list.matches(addr("192.168.0.5")));
    }

    #[tokio::test]
    async fn test_non_json_body_fails_cycle() {
        let client = ScriptedHttpClient::new(vec![(StatusCode::OK, "<html>nope</html>")]);
        let registry = registry_with(remote_entry(None));
        let service = registry.lookup("svc").expect("found");

        let result = refresher(registry.clone(), client)
            .refresh_service(&service)
            .await;
        assert!(matches!(result, Err(RefreshError::Parse(_))));
        assert!(service.allowlist().is_empty());
    }

    #[tokio::test]
    async fn test_static_ranges_override_remote_permanently() {
        let client = ScriptedHttpClient::new(vec![(StatusCode::OK, r#"["10.9.9.0/24"]"#)]);
        let entry = ServiceEntry {
            static_allowed_ranges: vec!["172.16.0.0/12".to_string()],
            ..remote_entry(None)
        };
        let registry = registry_with(entry);
        let service = registry.lookup("svc").expect("found");
        let refresher = refresher(registry.clone(), client.clone());

        refresher
            .refresh_service(&service)
            .await
            .expect("static install succeeds");
        assert!(service.allowlist().matches(addr("172.16.5.5")));
        assert_eq!(client.request_count(), 0);

        // second cycle: already populated, still no remote fetch
        refresher
            .refresh_service(&service)
            .await
            .expect("no-op cycle succeeds");
        assert_eq!(client.request_count(), 0);
        assert!(service.allowlist().matches(addr("172.16.5.5")));
    }

    #[tokio::test]
    async fn test_disabled_service_is_noop() {
        let client = ScriptedHttpClient::new(vec![]);
        let entry = ServiceEntry {
            allowlist_enabled: Some(false),
            ..remote_entry(None)
        };
        let registry = registry_with(entry);
        let service = registry.lookup("svc").expect("found");

        refresher(registry.clone(), client.clone())
            .refresh_service(&service)
            .await
            .expect("no-op succeeds");
        assert_eq!(client.request_count(), 0);
    }

    #[tokio::test]
    async fn test_unconfigured_service_warns_and_returns() {
        let client = ScriptedHttpClient::new(vec![]);
        let entry = ServiceEntry {
            target: "http://svc:9000".to_string(),
            ..ServiceEntry::default()
        };
        let registry = registry_with(entry);
        let service = registry.lookup("svc").expect("found");

        refresher(registry.clone(), client.clone())
            .refresh_service(&service)
            .await
            .expect("configuration gap is not an error");
        assert_eq!(client.request_count(), 0);
        assert!(service.allowlist().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_is_idempotent() {
        let doc = r#"{"ranges":["10.0.0.0/24"]}"#;
        let client =
            ScriptedHttpClient::new(vec![(StatusCode::OK, doc), (StatusCode::OK, doc)]);
        let registry = registry_with(remote_entry(Some("ranges[*]")));
        let service = registry.lookup("svc").expect("found");
        let refresher = refresher(registry.clone(), client);

        refresher
            .refresh_service(&service)
            .await
            .expect("first cycle");
        let first = service.allowlist();
        refresher
            .refresh_service(&service)
            .await
            .expect("second cycle");
        let second = service.allowlist();

        assert_eq!(first.len(), second.len());
        assert_eq!(
            first.matches(addr("10.0.0.5")),
            second.matches(addr("10.0.0.5"))
        );
    }
}
