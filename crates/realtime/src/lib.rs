//! Supabase Realtime client.
//!
//! Speaks the Phoenix channel protocol over WebSocket to receive
//! `postgres_changes` notifications. Provides typed message parsing,
//! connection management with heartbeats, reconnection with exponential
//! backoff, and per-subscription change streams.

pub mod client;
pub mod config;
pub mod events;
pub mod manager;
pub mod messages;
pub mod processor;
pub mod reconnect;

pub use config::RealtimeConfig;
pub use manager::{RealtimeManager, Subscription};
pub use messages::{ChangeEvent, ChangeFilter, PostgresChange};
