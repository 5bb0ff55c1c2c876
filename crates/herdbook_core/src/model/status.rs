//! Reproductive status values.
//!
//! # Invariants
//! - A manual override is a sum type with an explicit `None` case; the
//!   deriver dispatches on it before looking at any history.
//! - `DerivedStatus::source` records whether the value was overridden or
//!   computed, so callers never need to re-derive precedence.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Staff-entered reproductive status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusOverride {
    #[default]
    None,
    Pregnant,
    Empty,
    Open,
}

impl StatusOverride {
    /// The status an override forces, or `None` when nothing is forced.
    pub fn forced_status(self) -> Option<ReproductiveStatus> {
        match self {
            Self::None => None,
            Self::Pregnant => Some(ReproductiveStatus::Pregnant),
            Self::Empty => Some(ReproductiveStatus::Empty),
            Self::Open => Some(ReproductiveStatus::Open),
        }
    }

    pub fn as_db(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Pregnant => Some("pregnant"),
            Self::Empty => Some("empty"),
            Self::Open => Some("open"),
        }
    }

    pub fn parse_db(value: Option<&str>) -> Option<Self> {
        match value {
            None => Some(Self::None),
            Some("pregnant") => Some(Self::Pregnant),
            Some("empty") => Some(Self::Empty),
            Some("open") => Some(Self::Open),
            Some(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReproductiveStatus {
    Open,
    BredUnconfirmed,
    Pregnant,
    Fresh,
    HeatDetectionDue,
    /// Only reachable through a manual override.
    Empty,
    /// Status does not apply (male animals).
    NotApplicable,
}

impl ReproductiveStatus {
    /// Display label used by herd screens.
    pub fn label(self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::BredUnconfirmed => "Bred-Unconfirmed",
            Self::Pregnant => "Pregnant",
            Self::Fresh => "Fresh",
            Self::HeatDetectionDue => "Heat-Detection-Due",
            Self::Empty => "Empty",
            Self::NotApplicable => "N/A",
        }
    }

    pub fn category(self) -> StatusCategory {
        match self {
            Self::Pregnant | Self::BredUnconfirmed => StatusCategory::InCalf,
            Self::Fresh => StatusCategory::Recovery,
            Self::HeatDetectionDue => StatusCategory::BreedingWindow,
            Self::Open | Self::Empty => StatusCategory::Open,
            Self::NotApplicable => StatusCategory::NotApplicable,
        }
    }
}

impl Display for ReproductiveStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Coarse grouping used for herd summaries and badges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCategory {
    InCalf,
    Recovery,
    BreedingWindow,
    Open,
    NotApplicable,
}

impl StatusCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InCalf => "in_calf",
            Self::Recovery => "recovery",
            Self::BreedingWindow => "breeding_window",
            Self::Open => "open",
            Self::NotApplicable => "not_applicable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusSource {
    Override,
    Computed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedStatus {
    pub status: ReproductiveStatus,
    pub source: StatusSource,
}

impl DerivedStatus {
    pub fn computed(status: ReproductiveStatus) -> Self {
        Self {
            status,
            source: StatusSource::Computed,
        }
    }

    pub fn overridden(status: ReproductiveStatus) -> Self {
        Self {
            status,
            source: StatusSource::Override,
        }
    }

    pub fn label(&self) -> &'static str {
        self.status.label()
    }

    pub fn category(&self) -> StatusCategory {
        self.status.category()
    }
}

/// Breeding-side view of an animal's current cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreedingCycleState {
    NoActiveCycle,
    BredUnconfirmed,
    Pregnant,
}

impl BreedingCycleState {
    pub fn as_status(self) -> Option<ReproductiveStatus> {
        match self {
            Self::NoActiveCycle => None,
            Self::BredUnconfirmed => Some(ReproductiveStatus::BredUnconfirmed),
            Self::Pregnant => Some(ReproductiveStatus::Pregnant),
        }
    }
}
