//! Atelier event bus and user-facing notifications.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`StudioEvent`]: the event envelope emitted by design-session views.
//! - [`Notification`]: a transient, dismissible message for the browser.

pub mod bus;
pub mod notification;

pub use bus::{event_types, EventBus, StudioEvent};
pub use notification::{Notification, NotificationLevel};
