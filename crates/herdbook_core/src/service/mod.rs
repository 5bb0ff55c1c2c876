//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate store calls and pure engine functions into use cases.
//! - Keep the CLI decoupled from SQL and from engine wiring.

pub mod reconcile_service;
pub mod record_service;
