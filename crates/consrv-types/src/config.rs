//! Server configuration.
//!
//! One `ServerConfig` per running server instance. Field values set here
//! may be replaced by the external override file (see the server crate)
//! before the server starts; once serving, the configuration is fixed.

use std::path::PathBuf;

use serde::Deserialize;

use crate::message::PAYLOAD_CHUNK;

/// The four transport personalities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Transport {
    /// Connectionless IP datagrams, broadcast-capable.
    Udp,
    /// Connection-oriented stream with an interactive line editor.
    Tcp,
    /// Connectionless local-domain datagrams.
    UnixDatagram,
    /// No socket; dispatches the host program's own argv.
    InProcess,
}

/// Configuration for one server instance.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Logical server name. Also names the lock file and (for the
    /// local-domain transport) the socket path. Collision handling may
    /// append a numeric suffix; the effective name is recorded back here.
    pub name: String,
    /// Transport personality.
    #[serde(default = "default_transport")]
    pub transport: Transport,
    /// Bind address for the IP transports.
    #[serde(default = "default_host")]
    pub host: String,
    /// Requested port for the IP transports. 0 asks the OS for an
    /// ephemeral port and skips the collision retry ladder.
    #[serde(default)]
    pub port: u16,
    /// Session title reported to interactive clients.
    #[serde(default)]
    pub title: String,
    /// Banner printed when an interactive peer connects.
    #[serde(default)]
    pub banner: String,
    /// Prompt string. Empty means `<name>> `.
    #[serde(default)]
    pub prompt: String,
    /// Minutes an interactive session may sit idle before it is closed.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_mins: u64,
    /// Directory holding lock files and local-domain socket paths.
    #[serde(default = "default_runtime_dir")]
    pub runtime_dir: PathBuf,
    /// Initial negotiated payload size in bytes.
    #[serde(default = "default_payload_size")]
    pub payload_size: usize,
}

fn default_transport() -> Transport {
    Transport::Tcp
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_idle_timeout() -> u64 {
    10
}

fn default_runtime_dir() -> PathBuf {
    std::env::temp_dir().join("consrv")
}

fn default_payload_size() -> usize {
    PAYLOAD_CHUNK
}

impl ServerConfig {
    /// Configuration with defaults for the given server name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport: default_transport(),
            host: default_host(),
            port: 0,
            title: String::new(),
            banner: String::new(),
            prompt: String::new(),
            idle_timeout_mins: default_idle_timeout(),
            runtime_dir: default_runtime_dir(),
            payload_size: default_payload_size(),
        }
    }

    /// The prompt to render: configured value or `<name>> `.
    pub fn effective_prompt(&self) -> String {
        if self.prompt.is_empty() {
            format!("{}> ", self.name)
        } else {
            self.prompt.clone()
        }
    }
}
