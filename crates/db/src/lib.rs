//! Supabase data access over PostgREST.
//!
//! [`PostgrestClient`] plays the role of a connection pool: it is cheap to
//! clone and every repository takes `&PostgrestClient` as its first argument.

pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod repositories;

pub use client::PostgrestClient;
pub use config::{DbConfig, TableNames};
pub use error::DbError;

/// Build a PostgREST client from configuration.
pub fn create_client(config: &DbConfig) -> Result<PostgrestClient, DbError> {
    PostgrestClient::new(config)
}

/// Check that the PostgREST endpoint is reachable and accepts our key.
pub async fn health_check(client: &PostgrestClient) -> Result<(), DbError> {
    client.ping().await
}
