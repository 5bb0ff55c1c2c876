//! Engine error taxonomy.
//!
//! # Responsibility
//! - Name the failure classes the reproductive engine can surface.
//!
//! # Invariants
//! - `InvalidDate` and `AmbiguousState` are per-record: callers isolate them
//!   and keep processing the rest of the herd.
//! - Missing scheduling constants are a startup failure reported by
//!   `config::ConfigError::MissingConstant`; engine functions only accept a
//!   validated `EngineConfig` and cannot observe them.

use crate::calendar::DateError;
use crate::model::animal::AnimalId;
use crate::model::breeding::BreedingId;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type EngineResult<T> = Result<T, EngineError>;

/// Which stored record carried an offending value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordRef {
    Animal(AnimalId),
    Breeding(BreedingId),
    Calving(i64),
}

impl Display for RecordRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Animal(id) => write!(f, "animal#{id}"),
            Self::Breeding(id) => write!(f, "breeding#{id}"),
            Self::Calving(id) => write!(f, "calving#{id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A stored date could not be parsed or shifted.
    InvalidDate {
        record: RecordRef,
        field: &'static str,
        source: DateError,
    },
    /// Record set is internally inconsistent, e.g. two open breeding cycles.
    AmbiguousState {
        animal_id: AnimalId,
        breeding_ids: Vec<BreedingId>,
    },
}

impl EngineError {
    pub fn invalid_date(record: RecordRef, field: &'static str, source: DateError) -> Self {
        Self::InvalidDate {
            record,
            field,
            source,
        }
    }

    /// Stable machine-readable code for log lines and API envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidDate { .. } => "invalid_date",
            Self::AmbiguousState { .. } => "ambiguous_state",
        }
    }
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidDate {
                record,
                field,
                source,
            } => write!(f, "{record}.{field}: {source}"),
            Self::AmbiguousState {
                animal_id,
                breeding_ids,
            } => write!(
                f,
                "animal#{animal_id} has {} open breeding records: {:?}",
                breeding_ids.len(),
                breeding_ids
            ),
        }
    }
}

impl Error for EngineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidDate { source, .. } => Some(source),
            _ => None,
        }
    }
}
