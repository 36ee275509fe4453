//! Domain types and pure logic for the design-session workflow.
//!
//! Nothing in this crate performs I/O. The database, realtime and studio
//! crates build on these types.

pub mod error;
pub mod job;
pub mod merge;
pub mod navigation;
pub mod quota;
pub mod session;
pub mod types;
pub mod variation;
