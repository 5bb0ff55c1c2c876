//! Herd record model consumed and produced by the reproductive engine.
//!
//! # Responsibility
//! - Define animals, breeding records, calvings and notifications.
//! - Define reproductive status values and manual overrides.
//!
//! # Invariants
//! - Every record belongs to exactly one user; the engine never mixes users.
//! - Animals are never deleted, only moved to a non-active lifecycle state.
//! - Dates are kept as stored ISO text and parsed lazily by the engine.

pub mod animal;
pub mod breeding;
pub mod calving;
pub mod notification;
pub mod status;

/// Owning user account identifier.
pub type UserId = i64;
