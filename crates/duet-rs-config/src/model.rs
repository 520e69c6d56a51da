//! Configuration schema for Duet.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Root config for the Duet chat core.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DuetConfig {
    #[serde(default, rename = "$schema")]
    pub schema: Option<String>,
    #[serde(default)]
    pub mode: ConnectionMode,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub local: LocalConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub connectivity: ConnectivityConfig,
}

impl DuetConfig {
    /// Start building a config programmatically with defaults applied.
    pub fn builder() -> DuetConfigBuilder {
        DuetConfigBuilder::new()
    }
}

/// Builder for assembling a `DuetConfig` in code.
#[derive(Debug, Default, Clone)]
pub struct DuetConfigBuilder {
    config: DuetConfig,
}

impl DuetConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: DuetConfig::default(),
        }
    }

    /// Set the user-selected connection mode.
    pub fn mode(mut self, mode: ConnectionMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn remote(mut self, remote: RemoteConfig) -> Self {
        self.config.remote = remote;
        self
    }

    pub fn local(mut self, local: LocalConfig) -> Self {
        self.config.local = local;
        self
    }

    pub fn sessions(mut self, sessions: SessionsConfig) -> Self {
        self.config.sessions = sessions;
        self
    }

    pub fn generation(mut self, generation: GenerationConfig) -> Self {
        self.config.generation = generation;
        self
    }

    pub fn connectivity(mut self, connectivity: ConnectivityConfig) -> Self {
        self.config.connectivity = connectivity;
        self
    }

    /// Finalize and return the built `DuetConfig`.
    pub fn build(self) -> DuetConfig {
        self.config
    }
}

/// User-selected routing preference between the cloud and local backends.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMode {
    /// Always prefer the network-hosted model.
    Cloud,
    /// Always use the on-device model.
    Local,
    /// Cloud while online, local while offline.
    #[default]
    Auto,
}

impl ConnectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionMode::Cloud => "cloud",
            ConnectionMode::Local => "local",
            ConnectionMode::Auto => "auto",
        }
    }
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cloud" => Ok(ConnectionMode::Cloud),
            "local" | "offline" => Ok(ConnectionMode::Local),
            "auto" => Ok(ConnectionMode::Auto),
            other => Err(format!(
                "unknown connection mode `{other}` (expected cloud, local or auto)"
            )),
        }
    }
}

/// Settings for the network-hosted Gemini backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteConfig {
    #[serde(default = "default_remote_model")]
    pub model: String,
    #[serde(default = "default_remote_base_url")]
    pub base_url: String,
    /// Environment variable the credential is read from at startup.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_system_instruction")]
    pub system_instruction: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            model: default_remote_model(),
            base_url: default_remote_base_url(),
            api_key_env: default_api_key_env(),
            system_instruction: default_system_instruction(),
        }
    }
}

fn default_remote_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_remote_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta/models".to_string()
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

fn default_system_instruction() -> String {
    "You are a helpful, clever, and knowledgeable AI assistant. Responses should be formatted in Markdown.".to_string()
}

/// Settings for the on-device backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocalConfig {
    /// Loopback endpoint of the local model runtime.
    #[serde(default = "default_local_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_local_model")]
    pub model: String,
    /// System prompt used when opening a local model session.
    #[serde(default = "default_local_system_prompt")]
    pub system_prompt: String,
    /// First line of every flattened local prompt.
    #[serde(default = "default_local_preamble")]
    pub preamble: String,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            endpoint: default_local_endpoint(),
            model: default_local_model(),
            system_prompt: default_local_system_prompt(),
            preamble: default_local_preamble(),
        }
    }
}

fn default_local_endpoint() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_local_model() -> String {
    "gemma3:1b".to_string()
}

fn default_local_system_prompt() -> String {
    "You are a helpful offline assistant.".to_string()
}

fn default_local_preamble() -> String {
    "You are a helpful AI assistant residing locally on the user's device.".to_string()
}

/// Session persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionsConfig {
    /// Storage root; defaults to `~/.duet` when unset.
    #[serde(default)]
    pub path: Option<String>,
    /// Blob key; the collection lives in `<path>/<key>.json`.
    #[serde(default = "default_sessions_key")]
    pub key: String,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            path: None,
            key: default_sessions_key(),
        }
    }
}

fn default_sessions_key() -> String {
    "duet_chat_sessions".to_string()
}

/// Turn generation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct GenerationConfig {
    /// Abort a turn when no delta arrives for this many seconds. Unset waits forever.
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,
}

/// Reachability probing used to derive the online/offline signal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectivityConfig {
    /// `host:port` dialed to decide whether the network is reachable.
    #[serde(default = "default_probe_addr")]
    pub probe_addr: String,
    #[serde(default = "default_probe_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_probe_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            probe_addr: default_probe_addr(),
            interval_secs: default_probe_interval_secs(),
            timeout_ms: default_probe_timeout_ms(),
        }
    }
}

fn default_probe_addr() -> String {
    "generativelanguage.googleapis.com:443".to_string()
}

fn default_probe_interval_secs() -> u64 {
    15
}

fn default_probe_timeout_ms() -> u64 {
    1500
}
