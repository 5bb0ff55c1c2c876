//! Animal domain model.
//!
//! # Responsibility
//! - Define the herd member record and its lifecycle.
//! - Normalize and validate ear tags.
//!
//! # Invariants
//! - `ear_tag` is unique within one user's herd (enforced by storage).
//! - `dam_id`/`sire_id` reference existing animals or are `None`; edges point
//!   parent -> child and never form a cycle.
//!
//! # See also
//! - crate::service::record_service for calf spawning.

use super::status::StatusOverride;
use super::UserId;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Storage row id of an animal.
pub type AnimalId = i64;

const EAR_TAG_MAX_CHARS: usize = 32;

static EAR_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9-]*$").expect("valid ear tag regex"));
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sex {
    Female,
    Male,
}

/// Herd membership state. Sold and deceased animals stay on record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    #[default]
    Active,
    Sold,
    Deceased,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnimalValidationError {
    EmptyEarTag,
    InvalidEarTag(String),
    SelfParent(AnimalId),
}

impl Display for AnimalValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyEarTag => write!(f, "ear tag cannot be empty"),
            Self::InvalidEarTag(tag) => write!(
                f,
                "invalid ear tag `{tag}`; expected 1-{EAR_TAG_MAX_CHARS} letters, digits or dashes"
            ),
            Self::SelfParent(id) => write!(f, "animal#{id} cannot be its own parent"),
        }
    }
}

impl Error for AnimalValidationError {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Animal {
    /// `0` until the record store assigns a row id.
    pub id: AnimalId,
    pub user_id: UserId,
    pub ear_tag: String,
    pub sex: Sex,
    /// ISO `YYYY-MM-DD`, when known.
    pub birth_date: Option<String>,
    pub lifecycle: LifecycleStatus,
    /// Manual reproductive status set by staff; wins over computed status.
    pub status_override: StatusOverride,
    pub dam_id: Option<AnimalId>,
    pub sire_id: Option<AnimalId>,
}

impl Animal {
    /// Creates an unsaved active animal with no parents and no override.
    pub fn new(user_id: UserId, ear_tag: impl Into<String>, sex: Sex) -> Self {
        Self {
            id: 0,
            user_id,
            ear_tag: normalize_ear_tag(&ear_tag.into()),
            sex,
            birth_date: None,
            lifecycle: LifecycleStatus::Active,
            status_override: StatusOverride::None,
            dam_id: None,
            sire_id: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle == LifecycleStatus::Active
    }

    pub fn is_female(&self) -> bool {
        self.sex == Sex::Female
    }

    /// Validates ear tag shape and parent self-references.
    pub fn validate(&self) -> Result<(), AnimalValidationError> {
        validate_ear_tag(&self.ear_tag)?;
        if self.id != 0 && (self.dam_id == Some(self.id) || self.sire_id == Some(self.id)) {
            return Err(AnimalValidationError::SelfParent(self.id));
        }
        Ok(())
    }
}

/// Trims an ear tag and collapses inner whitespace runs into single dashes.
pub fn normalize_ear_tag(raw: &str) -> String {
    WHITESPACE_RE.replace_all(raw.trim(), "-").into_owned()
}

/// Checks a normalized ear tag.
pub fn validate_ear_tag(tag: &str) -> Result<(), AnimalValidationError> {
    if tag.is_empty() {
        return Err(AnimalValidationError::EmptyEarTag);
    }
    if tag.chars().count() > EAR_TAG_MAX_CHARS || !EAR_TAG_RE.is_match(tag) {
        return Err(AnimalValidationError::InvalidEarTag(tag.to_string()));
    }
    Ok(())
}
