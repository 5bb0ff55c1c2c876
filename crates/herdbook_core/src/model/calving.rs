//! Calving record model.

use super::animal::{AnimalId, Sex};
use super::breeding::BreedingId;
use super::UserId;
use serde::{Deserialize, Serialize};

pub type CalvingId = i64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calving {
    pub id: CalvingId,
    pub user_id: UserId,
    /// The dam.
    pub animal_id: AnimalId,
    /// Breeding cycle this calving closes, when staff linked it.
    pub breeding_id: Option<BreedingId>,
    /// ISO `YYYY-MM-DD`.
    pub calving_date: String,
    pub calf_ear_tag: Option<String>,
    pub calf_sex: Option<Sex>,
    pub calf_weight_kg: Option<f64>,
    pub complications: Option<String>,
}

impl Calving {
    pub fn new(user_id: UserId, animal_id: AnimalId, calving_date: impl Into<String>) -> Self {
        Self {
            id: 0,
            user_id,
            animal_id,
            breeding_id: None,
            calving_date: calving_date.into(),
            calf_ear_tag: None,
            calf_sex: None,
            calf_weight_kg: None,
            complications: None,
        }
    }

    /// Calf ear tag when one was recorded and is not blank.
    pub fn calf_tag(&self) -> Option<&str> {
        self.calf_ear_tag
            .as_deref()
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
    }
}
