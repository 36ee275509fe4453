//! Request handlers.
//!
//! Handlers resolve the session view model through the registry, apply the
//! caller-side quota gates, and map errors via [`AppError`](crate::error::AppError).

pub mod sessions;
