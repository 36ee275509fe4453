//! Atelier API server library.
//!
//! Exposes the building blocks (config, state, error handling, routes, the
//! session registry, WebSocket infrastructure) so integration tests and the
//! binary entrypoint share them.

pub mod config;
pub mod error;
pub mod handlers;
pub mod notifications;
pub mod registry;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
pub mod ws;
