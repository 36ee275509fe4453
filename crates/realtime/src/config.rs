use std::time::Duration;

/// Default interval between Phoenix heartbeats. Supabase drops sockets
/// that stay silent for more than 60 seconds.
pub const DEFAULT_HEARTBEAT_SECS: u64 = 25;

/// Supabase Realtime connection settings.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Project URL, e.g. `https://abc.supabase.co`.
    pub supabase_url: String,
    /// Project API key, passed as the `apikey` query parameter.
    pub api_key: String,
    /// JWT sent with each channel join for row-level security.
    pub access_token: Option<String>,
    pub heartbeat_interval: Duration,
}

impl RealtimeConfig {
    pub fn new(supabase_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            supabase_url: supabase_url.into(),
            api_key: api_key.into(),
            access_token: None,
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
        }
    }

    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                        | Default  |
    /// |--------------------------------|----------|
    /// | `SUPABASE_URL`                 | required |
    /// | `SUPABASE_ANON_KEY`            | required |
    /// | `SUPABASE_SERVICE_ROLE_KEY`    | unset    |
    /// | `REALTIME_HEARTBEAT_SECS`      | `25`     |
    pub fn from_env() -> Self {
        let supabase_url = std::env::var("SUPABASE_URL").expect("SUPABASE_URL must be set");
        let api_key = std::env::var("SUPABASE_ANON_KEY").expect("SUPABASE_ANON_KEY must be set");
        let access_token = std::env::var("SUPABASE_SERVICE_ROLE_KEY")
            .ok()
            .filter(|s| !s.is_empty());

        let heartbeat_secs: u64 = std::env::var("REALTIME_HEARTBEAT_SECS")
            .unwrap_or_else(|_| DEFAULT_HEARTBEAT_SECS.to_string())
            .parse()
            .expect("REALTIME_HEARTBEAT_SECS must be a valid u64");

        Self {
            supabase_url,
            api_key,
            access_token,
            heartbeat_interval: Duration::from_secs(heartbeat_secs),
        }
    }

    /// WebSocket endpoint, e.g.
    /// `wss://abc.supabase.co/realtime/v1/websocket?apikey=KEY&vsn=1.0.0`.
    pub fn ws_url(&self) -> String {
        let base = self.supabase_url.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        format!(
            "{base}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
            self.api_key
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn https_becomes_wss() {
        let config = RealtimeConfig::new("https://abc.supabase.co/", "anon");
        assert_eq!(
            config.ws_url(),
            "wss://abc.supabase.co/realtime/v1/websocket?apikey=anon&vsn=1.0.0"
        );
    }

    #[test]
    fn http_becomes_ws() {
        let config = RealtimeConfig::new("http://localhost:54321", "k");
        assert_eq!(
            config.ws_url(),
            "ws://localhost:54321/realtime/v1/websocket?apikey=k&vsn=1.0.0"
        );
    }

    #[test]
    fn ws_scheme_is_kept() {
        let config = RealtimeConfig::new("ws://127.0.0.1:4000", "k");
        assert!(config.ws_url().starts_with("ws://127.0.0.1:4000/realtime/v1/websocket"));
    }

    #[test]
    fn default_heartbeat() {
        let config = RealtimeConfig::new("http://x", "k");
        assert_eq!(config.heartbeat_interval, Duration::from_secs(25));
    }
}
