//! Configuration management for notechat

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::core::Identity;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub chat: ChatConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Origin of the notes backend, e.g. `https://notes.example.com`
    pub base_url: String,
    /// Path prefix every API route lives under
    pub api_prefix: String,
    /// Timeout for REST calls (confirmation, clear, notes list)
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            api_prefix: "/api".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    /// Absolute URL of an API route, e.g. `api_url("/ai/note-chat/clear/u1")`
    pub fn api_url(&self, route: &str) -> Result<Url> {
        let prefix = self.api_prefix.trim_matches('/');
        let route = route.trim_start_matches('/');
        let mut joined = self.base_url.trim_end_matches('/').to_string();
        for part in [prefix, route] {
            if !part.is_empty() {
                joined.push('/');
                joined.push_str(part);
            }
        }
        Url::parse(&joined).with_context(|| format!("Invalid API URL: {}", joined))
    }

    /// WebSocket URL of the chat stream for one identity
    ///
    /// The identity key and token travel as query parameters; `http` maps to
    /// `ws` and `https` to `wss`.
    pub fn chat_socket_url(&self, identity: &Identity) -> Result<Url> {
        let mut url = self.api_url("/ai/chat")?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => anyhow::bail!("Unsupported URL scheme for chat socket: {}", other),
        };
        url.set_scheme(scheme)
            .map_err(|_| anyhow::anyhow!("Cannot switch {} to {}", url, scheme))?;
        url.query_pairs_mut()
            .append_pair("chatId", &identity.user_id)
            .append_pair("token", &identity.id_token);
        Ok(url)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChatConfig {
    /// Inbound frames larger than this are dropped
    pub max_frame_bytes: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: 256 * 1024,
        }
    }
}

impl Config {
    /// Load configuration from default location or create default
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from a specific file, falling back to defaults when
    /// it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config in {}", path.display()))
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "notechat") {
            let config_dir = proj_dirs.config_dir();
            std::fs::create_dir_all(config_dir)?;
            Ok(config_dir.join("config.toml"))
        } else {
            Ok(PathBuf::from("config.toml"))
        }
    }

    /// Save configuration to default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
