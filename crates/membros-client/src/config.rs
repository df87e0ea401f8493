//! Client configuration loaded from environment variables.
//!
//! Every setting has a default, so the client runs with zero configuration.

use std::path::PathBuf;
use std::time::Duration;

use membros_shared::constants::DEFAULT_DEBOUNCE_MS;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Quiet window before a burst of change notifications triggers a
    /// refetch.
    /// Env: `MEMBROS_DEBOUNCE_MS`
    /// Default: `250`
    pub debounce: Duration,

    /// Directory the session file is persisted in.  `None` keeps the
    /// session in memory only.
    /// Env: `MEMBROS_SESSION_DIR`
    /// Default: `None`
    pub session_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            session_dir: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("MEMBROS_DEBOUNCE_MS") {
            if let Ok(ms) = raw.parse::<u64>() {
                config.debounce = Duration::from_millis(ms);
            } else {
                tracing::warn!(value = %raw, "Invalid MEMBROS_DEBOUNCE_MS, using default");
            }
        }

        if let Ok(dir) = std::env::var("MEMBROS_SESSION_DIR") {
            config.session_dir = Some(PathBuf::from(dir));
        }

        config
    }
}
