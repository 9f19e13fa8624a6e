//! Service registry: the startup-built map from service name to its
//! forwarding target and access-list state.
//!
//! The registry aggregates immutable configuration with the one piece of
//! runtime state each service carries: its current [`AccessList`], held
//! behind an `ArcSwap` so the refresher can replace it wholesale while
//! request handlers read lock-free snapshots. No entries are added or
//! removed after startup.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use arc_swap::ArcSwap;

use crate::{
    config::{models::GatewayConfig, validation::ValidationError},
    core::network::AccessList,
};

/// One registered service: immutable configuration plus the swappable
/// access list.
pub struct Service {
    name: String,
    target: String,
    access_control_enabled: bool,
    allowlist_url: Option<String>,
    allowlist_query_path: Option<String>,
    static_ranges: Vec<String>,
    allowlist: ArcSwap<AccessList>,
    refresh_in_flight: AtomicBool,
}

impl Service {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Base URL forwarded requests are sent to.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn access_control_enabled(&self) -> bool {
        self.access_control_enabled
    }

    pub fn allowlist_url(&self) -> Option<&str> {
        self.allowlist_url.as_deref()
    }

    pub fn allowlist_query_path(&self) -> Option<&str> {
        self.allowlist_query_path.as_deref()
    }

    pub fn static_ranges(&self) -> &[String] {
        &self.static_ranges
    }

    /// Snapshot of the current access list. The snapshot stays valid (and
    /// internally consistent) even if a refresh installs a new list while
    /// the caller still holds it.
    pub fn allowlist(&self) -> Arc<AccessList> {
        self.allowlist.load_full()
    }

    /// Atomically replace the access list. The only writer is the
    /// refresher; readers observe either the old or the new list, never a
    /// partial one.
    pub fn install_allowlist(&self, list: AccessList) {
        self.allowlist.store(Arc::new(list));
    }

    /// Claim the refresh slot for this service. Returns false when a
    /// previous cycle is still running, in which case the tick is skipped
    /// rather than queued.
    pub(crate) fn begin_refresh(&self) -> bool {
        self.refresh_in_flight
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    pub(crate) fn end_refresh(&self) {
        self.refresh_in_flight.store(false, Ordering::Release);
    }
}

/// Name → service map, built once from validated configuration.
pub struct ServiceRegistry {
    services: HashMap<String, Arc<Service>>,
}

impl ServiceRegistry {
    /// Construct the registry from configuration.
    ///
    /// Names are canonicalized to lowercase; two entries that collide after
    /// canonicalization are a fatal configuration error.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, ValidationError> {
        let mut services = HashMap::with_capacity(config.services.len());

        for (raw_name, entry) in &config.services {
            let name = raw_name.to_lowercase();
            let service = Arc::new(Service {
                name: name.clone(),
                target: entry.target.clone(),
                access_control_enabled: entry
                    .allowlist_enabled
                    .unwrap_or(config.allowlist.enabled),
                allowlist_url: entry.allowlist_url.clone(),
                allowlist_query_path: entry.allowlist_query_path.clone(),
                static_ranges: entry.static_allowed_ranges.clone(),
                allowlist: ArcSwap::new(Arc::new(AccessList::default())),
                refresh_in_flight: AtomicBool::new(false),
            });

            if services.insert(name.clone(), service).is_some() {
                return Err(ValidationError::DuplicateService { name });
            }

            tracing::info!(service = %name, target = %entry.target, "registered service");
        }

        Ok(Self { services })
    }

    /// Case-insensitive lookup by service name.
    pub fn lookup(&self, name: &str) -> Option<Arc<Service>> {
        self.services.get(&name.to_lowercase()).cloned()
    }

    /// Every registered service, for the refresher's enumeration.
    pub fn services(&self) -> impl Iterator<Item = Arc<Service>> + '_ {
        self.services.values().cloned()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
