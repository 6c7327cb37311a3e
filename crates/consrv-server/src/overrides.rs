//! External configuration overrides.
//!
//! An operator-supplied TOML file can replace a server's compiled-in
//! settings at startup, keyed by server name:
//!
//! ```toml
//! [server.tel1]
//! transport = "udp"
//! host = "0.0.0.0"
//! port = 7501
//!
//! [server.scope]
//! idle-timeout-mins = 30
//! ```
//!
//! A missing file is not an error (nothing to override); a file that
//! exists but does not parse is, so a typo cannot silently run with
//! defaults.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use consrv_types::{ConsrvError, Result, ServerConfig, Transport};

/// One server's override table. Every field optional; absent fields
/// leave the compiled-in value alone.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ServerOverride {
    pub transport: Option<Transport>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub title: Option<String>,
    pub banner: Option<String>,
    pub prompt: Option<String>,
    pub idle_timeout_mins: Option<u64>,
    pub payload_size: Option<usize>,
}

/// The parsed override file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Overrides {
    #[serde(default, rename = "server")]
    servers: HashMap<String, ServerOverride>,
}

impl Overrides {
    /// Load `path`. A missing file yields an empty set.
    pub fn load(path: &Path) -> Result<Self> {
        let source = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("no override file at {}", path.display());
                return Ok(Self::default());
            },
            Err(e) => return Err(e.into()),
        };
        let parsed: Self = toml::from_str(&source).map_err(|e| {
            ConsrvError::Config(format!("{}: {e}", path.display()))
        })?;
        Ok(parsed)
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Apply the overrides registered under `config.name`, if any.
    pub fn apply(&self, config: &mut ServerConfig) {
        let Some(ov) = self.servers.get(&config.name) else {
            return;
        };
        log::info!("applying configuration overrides for '{}'", config.name);
        if let Some(transport) = ov.transport {
            config.transport = transport;
        }
        if let Some(host) = &ov.host {
            config.host = host.clone();
        }
        if let Some(port) = ov.port {
            config.port = port;
        }
        if let Some(title) = &ov.title {
            config.title = title.clone();
        }
        if let Some(banner) = &ov.banner {
            config.banner = banner.clone();
        }
        if let Some(prompt) = &ov.prompt {
            config.prompt = prompt.clone();
        }
        if let Some(mins) = ov.idle_timeout_mins {
            config.idle_timeout_mins = mins;
        }
        if let Some(size) = ov.payload_size {
            config.payload_size = size;
        }
    }
}
