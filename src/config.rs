//! # Configuration Module
//!
//! Server settings, loaded from a YAML or JSON file and then overridden by
//! environment variables.
//!
//! ## File
//!
//! ```yaml
//! http_port: 6969
//! ws_port: 42069
//! bind_address: 0.0.0.0
//! deferred_timeout_secs: 30    # 0 waits forever
//! max_request_bytes: 65536
//! broadcast_queue_depth: 64
//! static_dir: ./web
//! data_dir: ./data
//! fetch_workers: 4
//! fetch_timeout_secs: 30
//! ```
//!
//! Every field is optional. A missing file is not an error: the defaults
//! are used, as on a first start.
//!
//! ## Environment Variables
//!
//! | Variable | Field |
//! |----------|-------|
//! | `YOMU_HTTP_PORT` | `http_port` |
//! | `YOMU_WS_PORT` | `ws_port` |
//! | `YOMU_BIND_ADDRESS` | `bind_address` |
//! | `YOMU_DEFERRED_TIMEOUT_SECS` | `deferred_timeout_secs` |
//! | `YOMU_MAX_REQUEST_BYTES` | `max_request_bytes` |
//! | `YOMU_BROADCAST_QUEUE_DEPTH` | `broadcast_queue_depth` |
//! | `YOMU_STATIC_DIR` | `static_dir` |
//! | `YOMU_DATA_DIR` | `data_dir` |
//! | `YOMU_FETCH_WORKERS` | `fetch_workers` |
//! | `YOMU_FETCH_TIMEOUT_SECS` | `fetch_timeout_secs` |
//!
//! Values that do not parse are ignored with a warning.

use crate::dispatcher::DispatchSettings;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_HTTP_PORT: u16 = 6969;
pub const DEFAULT_WS_PORT: u16 = 42069;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub http_port: u16,
    pub ws_port: u16,
    pub bind_address: String,
    pub deferred_timeout_secs: u64,
    pub max_request_bytes: usize,
    pub broadcast_queue_depth: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub static_dir: Option<PathBuf>,
    pub data_dir: PathBuf,
    pub fetch_workers: usize,
    pub fetch_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            ws_port: DEFAULT_WS_PORT,
            bind_address: "0.0.0.0".to_string(),
            deferred_timeout_secs: 30,
            max_request_bytes: 64 * 1024,
            broadcast_queue_depth: crate::broadcast::DEFAULT_QUEUE_DEPTH,
            static_dir: None,
            data_dir: PathBuf::from("./data"),
            fetch_workers: 4,
            fetch_timeout_secs: 30,
        }
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

impl ServerConfig {
    /// Read settings from `path`; defaults when the file does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "Settings file not found; using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        let config = if is_json(path) {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };
        debug!(path = %path.display(), "Settings loaded");
        Ok(config)
    }

    /// Write settings to `path`, as JSON for a `.json` path and YAML otherwise.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = if is_json(path) {
            serde_json::to_string_pretty(self)?
        } else {
            serde_yaml::to_string(self)?
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content).with_context(|| format!("writing settings to {}", path.display()))?;
        info!(path = %path.display(), "Settings saved");
        Ok(())
    }

    /// Override fields from `YOMU_*` environment variables.
    pub fn apply_env(&mut self) {
        self.apply_vars(|name| env::var(name).ok());
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        override_parsed(&var, "YOMU_HTTP_PORT", &mut self.http_port);
        override_parsed(&var, "YOMU_WS_PORT", &mut self.ws_port);
        if let Some(addr) = var("YOMU_BIND_ADDRESS") {
            self.bind_address = addr;
        }
        override_parsed(&var, "YOMU_DEFERRED_TIMEOUT_SECS", &mut self.deferred_timeout_secs);
        override_parsed(&var, "YOMU_MAX_REQUEST_BYTES", &mut self.max_request_bytes);
        override_parsed(&var, "YOMU_BROADCAST_QUEUE_DEPTH", &mut self.broadcast_queue_depth);
        if let Some(dir) = var("YOMU_STATIC_DIR") {
            self.static_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = var("YOMU_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        override_parsed(&var, "YOMU_FETCH_WORKERS", &mut self.fetch_workers);
        override_parsed(&var, "YOMU_FETCH_TIMEOUT_SECS", &mut self.fetch_timeout_secs);
    }

    /// `None` when the deferred timeout is disabled.
    pub fn deferred_timeout(&self) -> Option<Duration> {
        (self.deferred_timeout_secs > 0).then(|| Duration::from_secs(self.deferred_timeout_secs))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            deferred_timeout: self.deferred_timeout(),
            max_request_bytes: self.max_request_bytes,
        }
    }

    pub fn http_addr(&self) -> String {
        host_port(&self.bind_address, self.http_port)
    }

    pub fn ws_addr(&self) -> String {
        host_port(&self.bind_address, self.ws_port)
    }
}

/// `host:port` for binding. IP literals go through `SocketAddr` so IPv6 is
/// bracketed; anything else is left for the resolver.
fn host_port(host: &str, port: u16) -> String {
    let host = host.trim();
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    match bare.parse::<IpAddr>() {
        Ok(ip) => SocketAddr::new(ip, port).to_string(),
        Err(_) => format!("{host}:{port}"),
    }
}

fn override_parsed<T: FromStr>(var: &impl Fn(&str) -> Option<String>, name: &str, slot: &mut T) {
    let Some(raw) = var(name) else { return };
    match raw.trim().parse() {
        Ok(value) => *slot = value,
        Err(_) => warn!(variable = name, value = %raw, "Ignoring unparsable setting"),
    }
}
