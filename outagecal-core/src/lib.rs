//! Core library for outagecal.
//!
//! Turns a published power-outage schedule page into calendar events:
//! - `parse` extracts per-day, per-queue outage ranges from HTML
//! - `fingerprint` detects real schedule changes
//! - `state` remembers what was last synced for today and tomorrow
//! - `reconcile` computes the calendar operations for changed days
//! - `sync` drives one full cycle against the external collaborators

pub mod calendar;
pub mod config;
pub mod constants;
pub mod error;
pub mod fetch;
pub mod fingerprint;
pub mod notify;
pub mod parse;
pub mod reconcile;
pub mod schedule;
pub mod state;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{OutageError, OutageResult};
