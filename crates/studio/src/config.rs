use std::path::PathBuf;

/// Studio settings loaded from environment variables.
#[derive(Debug, Clone)]
pub struct StudioConfig {
    /// JSON file backing the usage counters. `None` keeps them in memory.
    pub counter_store_path: Option<PathBuf>,
    /// Subscribe open sessions to the Realtime feed.
    pub realtime_enabled: bool,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            counter_store_path: Some(PathBuf::from("data/quota-counters.json")),
            realtime_enabled: true,
        }
    }
}

impl StudioConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var               | Default                     |
    /// |-----------------------|-----------------------------|
    /// | `COUNTER_STORE_PATH`  | `data/quota-counters.json`  |
    /// | `REALTIME_ENABLED`    | `true`                      |
    ///
    /// Set `COUNTER_STORE_PATH` to `memory` to keep counters in memory.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let counter_store_path = match std::env::var("COUNTER_STORE_PATH") {
            Ok(v) if v.eq_ignore_ascii_case("memory") => None,
            Ok(v) if !v.trim().is_empty() => Some(PathBuf::from(v)),
            _ => defaults.counter_store_path,
        };

        let realtime_enabled: bool = std::env::var("REALTIME_ENABLED")
            .unwrap_or_else(|_| "true".into())
            .parse()
            .expect("REALTIME_ENABLED must be true or false");

        Self {
            counter_store_path,
            realtime_enabled,
        }
    }
}
