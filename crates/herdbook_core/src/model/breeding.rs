//! Breeding record model.
//!
//! # Invariants
//! - A record belongs to exactly one dam (`animal_id`).
//! - At most one record per dam may be open (PD unchecked, no calving yet);
//!   the engine reports violations as `AmbiguousState` instead of choosing.
//! - `needs_review` is the only field the engine writes back.

use super::animal::AnimalId;
use super::UserId;
use serde::{Deserialize, Serialize};

pub type BreedingId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreedingMethod {
    Natural,
    #[serde(rename = "ai")]
    ArtificialInsemination,
}

impl BreedingMethod {
    pub fn as_db(self) -> &'static str {
        match self {
            Self::Natural => "natural",
            Self::ArtificialInsemination => "ai",
        }
    }

    pub fn parse_db(value: &str) -> Option<Self> {
        match value {
            "natural" => Some(Self::Natural),
            "ai" => Some(Self::ArtificialInsemination),
            _ => None,
        }
    }
}

/// Pregnancy diagnosis outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PdResult {
    #[default]
    Unchecked,
    Pregnant,
    NotPregnant,
}

impl PdResult {
    pub fn as_db(self) -> &'static str {
        match self {
            Self::Unchecked => "unchecked",
            Self::Pregnant => "pregnant",
            Self::NotPregnant => "not_pregnant",
        }
    }

    pub fn parse_db(value: &str) -> Option<Self> {
        match value {
            "unchecked" => Some(Self::Unchecked),
            "pregnant" => Some(Self::Pregnant),
            "not_pregnant" => Some(Self::NotPregnant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreedingRecord {
    pub id: BreedingId,
    pub user_id: UserId,
    /// The dam.
    pub animal_id: AnimalId,
    /// ISO `YYYY-MM-DD`; records without a date produce no due dates.
    pub breeding_date: Option<String>,
    pub method: BreedingMethod,
    pub sire_id: Option<AnimalId>,
    pub pd_result: PdResult,
    pub pd_check_date: Option<String>,
    pub confirmed_pregnant: bool,
    /// Set by reconciliation when a presumed pregnancy is overdue.
    pub needs_review: bool,
    /// Unix epoch milliseconds.
    pub created_at: i64,
}

impl BreedingRecord {
    /// Creates an unsaved, unchecked record for `animal_id` on `breeding_date`.
    pub fn new(
        user_id: UserId,
        animal_id: AnimalId,
        breeding_date: impl Into<String>,
        method: BreedingMethod,
    ) -> Self {
        Self {
            id: 0,
            user_id,
            animal_id,
            breeding_date: Some(breeding_date.into()),
            method,
            sire_id: None,
            pd_result: PdResult::Unchecked,
            pd_check_date: None,
            confirmed_pregnant: false,
            needs_review: false,
            created_at: 0,
        }
    }

    /// PD has not been performed yet.
    pub fn is_unchecked(&self) -> bool {
        self.pd_result == PdResult::Unchecked && !self.confirmed_pregnant
    }

    /// PD came back negative; the cycle is closed.
    pub fn is_negative(&self) -> bool {
        self.pd_result == PdResult::NotPregnant
    }

    pub fn is_confirmed_pregnant(&self) -> bool {
        !self.is_negative() && (self.pd_result == PdResult::Pregnant || self.confirmed_pregnant)
    }
}
