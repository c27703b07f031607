//! Client configuration and collaborator-supplied session parameters.
//!
//! `ClientConfig` is read from the environment. `Identity` and
//! `SessionConfig` come from the account and board services before a
//! connection is opened; the engine only consumes them.

use std::time::Duration;

use frames::UserId;

use crate::scale::EstimationScale;

pub const DEFAULT_WS_BASE_URL: &str = "ws://127.0.0.1:8000/";
pub const DEFAULT_TICK_MS: u64 = 1000;
pub const DEFAULT_COMMAND_BUFFER: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
    #[error("invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },
    #[error("unknown estimation deck: {0}")]
    InvalidDeck(String),
    #[error("estimation scale must contain at least one value")]
    EmptyScale,
}

/// Transport and event-loop settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Websocket base URL; session paths are appended to it.
    pub ws_base_url: String,
    /// Period of the local display tick.
    pub tick: Duration,
    /// Capacity of the host command queue.
    pub command_buffer: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ws_base_url: DEFAULT_WS_BASE_URL.to_owned(),
            tick: Duration::from_millis(DEFAULT_TICK_MS),
            command_buffer: DEFAULT_COMMAND_BUFFER,
        }
    }
}

impl ClientConfig {
    /// Build config from environment variables.
    ///
    /// Optional:
    /// - `POKER_WS_BASE_URL`: default `ws://127.0.0.1:8000/`
    /// - `POKER_TICK_MS`: default 1000
    /// - `POKER_COMMAND_BUFFER`: default 64
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for unparsable or zero numbers.
    pub fn from_env() -> Result<Self, ConfigError> {
        let ws_base_url = std::env::var("POKER_WS_BASE_URL").unwrap_or_else(|_| DEFAULT_WS_BASE_URL.to_owned());
        let tick_ms = env_parse_positive("POKER_TICK_MS", DEFAULT_TICK_MS)?;
        let command_buffer = env_parse_positive("POKER_COMMAND_BUFFER", DEFAULT_COMMAND_BUFFER)?;
        Ok(Self { ws_base_url, tick: Duration::from_millis(tick_ms), command_buffer })
    }

    /// Websocket URL for one session, authenticated by `token`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBaseUrl`] when the base is not an
    /// `http(s)://` or `ws(s)://` URL.
    pub fn session_url(&self, session_id: &str, token: &str) -> Result<String, ConfigError> {
        session_url(&self.ws_base_url, session_id, token)
    }
}

/// `{base}session/{session_id}?token={token}`, with `http(s)` mapped to `ws(s)`.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidBaseUrl`] for an unsupported scheme.
pub fn session_url(base_url: &str, session_id: &str, token: &str) -> Result<String, ConfigError> {
    let base = if let Some(rest) = base_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if let Some(rest) = base_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if base_url.starts_with("ws://") || base_url.starts_with("wss://") {
        base_url.to_owned()
    } else {
        return Err(ConfigError::InvalidBaseUrl(base_url.to_owned()));
    };
    let base = base.trim_end_matches('/');
    Ok(format!("{base}/session/{session_id}?token={token}"))
}

fn env_parse_positive<T>(var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    let Ok(raw) = std::env::var(var) else {
        return Ok(default);
    };
    match raw.trim().parse::<T>() {
        Ok(value) if value > T::default() => Ok(value),
        _ => Err(ConfigError::InvalidValue { var, value: raw }),
    }
}

/// Authenticated user, as returned by the identity collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub display_name: String,
    pub token: String,
}

/// Session parameters, as returned by the session-lookup collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub session_id: String,
    pub ticket_id: String,
    pub duration_secs: u32,
    pub estimation_scale: EstimationScale,
    pub coordinator_user_id: UserId,
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
