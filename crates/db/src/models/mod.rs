//! Insert DTOs for the job tables.
//!
//! Session and variation rows are shared domain types and live in
//! `atelier_core`; only the write-side shapes are defined here.

pub mod job;
