//! Configuration data structures for wicket.
//!
//! These types map directly to YAML (also JSON / TOML) configuration files.
//! They are intentionally serde-friendly and include defaults so that
//! minimal configs remain concise.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_refresh_interval_mins() -> u64 {
    5
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_enabled() -> bool {
    true
}

/// Allow-list refresh settings, shared by every service.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AllowlistConfig {
    /// Whether access control is enforced (services may override).
    pub enabled: bool,
    /// Minutes between refresh cycles.
    pub refresh_interval_mins: u64,
    /// Bound on one remote allow-list fetch.
    pub fetch_timeout_secs: u64,
}

impl Default for AllowlistConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            refresh_interval_mins: default_refresh_interval_mins(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

/// Settings for the outbound forwarding call.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Bound on one forwarded request, connection to last body byte.
    pub request_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// One named service entry. The map key is the service name; names are
/// case-insensitive and canonicalized to lowercase when the registry is
/// built.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ServiceEntry {
    /// Base URL requests for this service are relayed to. The inbound query
    /// string is appended verbatim; no path segment is re-appended.
    pub target: String,
    /// Per-service override of `allowlist.enabled`.
    #[serde(default)]
    pub allowlist_enabled: Option<bool>,
    /// Remote JSON document listing allowed CIDR ranges.
    #[serde(default)]
    pub allowlist_url: Option<String>,
    /// Query path selecting the CIDR strings inside the document
    /// (e.g. "ranges[*]"). Absent means every string entry.
    #[serde(default)]
    pub allowlist_query_path: Option<String>,
    /// Literal CIDR ranges applied at the first refresh cycle; a service
    /// with static ranges never fetches remotely.
    #[serde(default)]
    pub static_allowed_ranges: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default)]
    pub allowlist: AllowlistConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub services: HashMap<String, ServiceEntry>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            allowlist: AllowlistConfig::default(),
            upstream: UpstreamConfig::default(),
            services: HashMap::new(),
        }
    }
}
