//! The design-session studio.
//!
//! Composes quota tracking, job submission, the variation store and the
//! realtime feed into one [`SessionViewModel`] per open design session.
//!
//! - [`counters`]: durable advisory usage counters.
//! - [`store`]: server rows plus optimistic placeholders.
//! - [`enqueue`]: ordered job submission strategies.
//! - [`sync`]: realtime change subscription per session.
//! - [`view_model`]: the state machine the browser renders.

pub mod backend;
pub mod config;
pub mod context;
pub mod counters;
pub mod enqueue;
pub mod error;
pub mod store;
pub mod sync;
pub mod view_model;

pub use config::StudioConfig;
pub use context::StudioContext;
pub use error::StudioError;
pub use view_model::{SessionView, SessionViewModel, SubmissionPermit, ViewPhase};
