//! Reproductive lifecycle engine.
//!
//! # Responsibility
//! - Derive reproductive status from calving history and manual overrides.
//! - Compute PD-check and expected-calving due dates from breeding records.
//! - Diff derived reminders against stored notifications.
//!
//! # Invariants
//! - Every function here is pure: records in, values out, no storage access.
//! - `today` is always an explicit argument.
//! - One malformed record never aborts a batch; it becomes a warning.

pub mod cycle;
pub mod due_dates;
pub mod reconcile;
pub mod status;
