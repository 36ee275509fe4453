//! Exponential backoff for re-opening the Realtime socket.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::client::{RealtimeClient, RealtimeConnection};

#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

/// Grow `current` by the multiplier, clamped to `max_delay`.
pub fn next_delay(current: Duration, config: &ReconnectConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

/// Sleep-then-connect until a socket opens or `cancel` fires.
///
/// The first attempt waits `initial_delay` so that a server that just
/// dropped us is not hammered immediately.
pub async fn reconnect_loop(
    client: &RealtimeClient,
    config: &ReconnectConfig,
    cancel: &CancellationToken,
) -> Option<RealtimeConnection> {
    let mut delay = config.initial_delay;
    let mut attempt = 0u32;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(delay) => {}
        }

        attempt += 1;
        tracing::info!(
            endpoint = %client.endpoint(),
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Reconnecting to Realtime",
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Realtime reconnect cancelled");
                return None;
            }
            result = client.connect() => match result {
                Ok(conn) => {
                    tracing::info!(attempt, "Reconnected to Realtime");
                    return Some(conn);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Realtime reconnect attempt {attempt} failed");
                }
            }
        }

        delay = next_delay(delay, config);
    }
}
