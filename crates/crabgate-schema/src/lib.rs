pub mod model_presets;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The unqualified profile. Its gateway directory carries no name suffix.
pub const DEFAULT_PROFILE: &str = "default";

/// Channel kinds the setup flow knows how to configure.
pub const CHANNEL_KINDS: &[&str] = &["telegram", "discord"];

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unauthorized")]
    Auth,
    #[error("too many failed login attempts")]
    RateLimited,
    #[error("ticket expired or already used")]
    TicketExpired,
    #[error("{command} exited with code {code}")]
    Subprocess { command: String, code: i32 },
    #[error("{command} timed out")]
    SubprocessTimeout { command: String },
    #[error("failed to spawn {command}: {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("config i/o: {0}")]
    ConfigIo(#[from] std::io::Error),
    #[error("setup cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;

/// A validated profile name.
///
/// `default` is always accepted; anything else must be 1-32 chars of
/// `[A-Za-z0-9_-]` so it can be embedded in a directory name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ProfileName(String);

impl ProfileName {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw == DEFAULT_PROFILE {
            return Ok(Self(raw.to_string()));
        }
        if raw.is_empty() || raw.len() > 32 {
            return Err(Error::Validation(format!(
                "profile name must be 1-32 characters, got {:?}",
                raw
            )));
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(Error::Validation(format!(
                "profile name may only contain letters, digits, '_' and '-', got {:?}",
                raw
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn default_profile() -> Self {
        Self(DEFAULT_PROFILE.to_string())
    }

    pub fn is_default(&self) -> bool {
        self.0 == DEFAULT_PROFILE
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProfileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileStatus {
    Running,
    Stopped,
}

/// One row of the profile listing. Built fresh from disk plus a TCP probe
/// on every request; nothing here is cached between calls.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileInfo {
    pub name: String,
    pub port: Option<u16>,
    pub status: ProfileStatus,
    pub model: String,
    pub model_id: String,
    pub channel: String,
}

/// Progress events emitted by the setup and connect pipelines and relayed
/// verbatim as SSE data payloads.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ProgressEvent {
    Tick { percent: u8, message: String },
    Done { done: bool, port: u16, config_path: String },
    Error { error: bool, message: String },
}

impl ProgressEvent {
    pub fn tick(percent: u8, message: impl Into<String>) -> Self {
        Self::Tick {
            percent,
            message: message.into(),
        }
    }

    pub fn done(port: u16, config_path: impl Into<String>) -> Self {
        Self::Done {
            done: true,
            port,
            config_path: config_path.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: true,
            message: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Tick { .. })
    }
}
