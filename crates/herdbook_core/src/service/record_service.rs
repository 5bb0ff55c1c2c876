//! Herd record use cases.
//!
//! # Responsibility
//! - Validate records at write time so the engine sees well-formed dates.
//! - Register calvings and spawn the calf as a new herd member.
//!
//! # Invariants
//! - A spawned calf has `dam_id` = the dam and `sire_id` = the sire of the
//!   linked breeding record, both owned by the same user.
//! - Calf and calving are persisted in one transaction.

use crate::calendar::{format_date, parse_date, DateError};
use crate::model::animal::{Animal, AnimalId, Sex};
use crate::model::breeding::{BreedingId, BreedingRecord, PdResult};
use crate::model::calving::{Calving, CalvingId};
use crate::model::status::StatusOverride;
use crate::model::UserId;
use crate::repo::record_repo::RecordStore;
use crate::repo::RepoError;
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RecordServiceResult<T> = Result<T, RecordServiceError>;

#[derive(Debug)]
pub enum RecordServiceError {
    Repo(RepoError),
    InvalidDate {
        field: &'static str,
        source: DateError,
    },
    UnknownAnimal(AnimalId),
    UnknownBreedingRecord(BreedingId),
    /// Breeding and calving records require a female dam.
    NotFemale(AnimalId),
    /// A calf ear tag was given without the calf's sex.
    MissingCalfSex,
}

impl Display for RecordServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(err) => write!(f, "{err}"),
            Self::InvalidDate { field, source } => write!(f, "{field}: {source}"),
            Self::UnknownAnimal(id) => write!(f, "animal#{id} not found"),
            Self::UnknownBreedingRecord(id) => write!(f, "breeding#{id} not found"),
            Self::NotFemale(id) => write!(f, "animal#{id} is not female"),
            Self::MissingCalfSex => write!(f, "calf sex is required to register a calf"),
        }
    }
}

impl Error for RecordServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::InvalidDate { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<RepoError> for RecordServiceError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Result of `register_calving`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalvingRegistration {
    pub calving_id: CalvingId,
    /// Present when a calf ear tag was recorded.
    pub calf_id: Option<AnimalId>,
}

pub struct RecordService<S: RecordStore> {
    store: S,
}

impl<S: RecordStore> RecordService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn register_animal(&self, animal: &Animal) -> RecordServiceResult<AnimalId> {
        if let Some(raw) = animal.birth_date.as_deref() {
            check_date("birth_date", raw)?;
        }
        let id = self.store.insert_animal(animal)?;
        info!(
            "event=animal_register module=service status=ok user_id={} animal_id={}",
            animal.user_id, id
        );
        Ok(id)
    }

    pub fn set_status_override(
        &self,
        user_id: UserId,
        animal_id: AnimalId,
        value: StatusOverride,
    ) -> RecordServiceResult<()> {
        self.store.set_status_override(user_id, animal_id, value)?;
        Ok(())
    }

    /// Stores a breeding event for a female dam.
    pub fn record_breeding(&self, record: &BreedingRecord) -> RecordServiceResult<BreedingId> {
        if let Some(raw) = record.breeding_date.as_deref() {
            check_date("breeding_date", raw)?;
        }
        self.require_female(record.user_id, record.animal_id)?;
        let id = self.store.insert_breeding_record(record)?;
        info!(
            "event=breeding_record module=service status=ok user_id={} animal_id={} breeding_id={}",
            record.user_id, record.animal_id, id
        );
        Ok(id)
    }

    pub fn record_pd_result(
        &self,
        user_id: UserId,
        breeding_id: BreedingId,
        pd_result: PdResult,
        pd_check_date: Option<&str>,
    ) -> RecordServiceResult<()> {
        if let Some(raw) = pd_check_date {
            check_date("pd_check_date", raw)?;
        }
        self.store
            .update_pd_result(user_id, breeding_id, pd_result, pd_check_date)
            .map_err(|err| match err {
                RepoError::NotFound { .. } => {
                    RecordServiceError::UnknownBreedingRecord(breeding_id)
                }
                other => other.into(),
            })
    }

    /// Records a calving and, when a calf ear tag is given, adds the calf to
    /// the herd with its parents linked.
    pub fn register_calving(&self, calving: &Calving) -> RecordServiceResult<CalvingRegistration> {
        let born_on = check_date("calving_date", &calving.calving_date)?;
        self.require_female(calving.user_id, calving.animal_id)?;

        let sire_id = match calving.breeding_id {
            Some(breeding_id) => self
                .store
                .get_breeding_record(calving.user_id, breeding_id)?
                .ok_or(RecordServiceError::UnknownBreedingRecord(breeding_id))?
                .sire_id,
            None => None,
        };

        let calf = match calving.calf_tag() {
            Some(tag) => {
                let sex = calving.calf_sex.ok_or(RecordServiceError::MissingCalfSex)?;
                let mut calf = Animal::new(calving.user_id, tag, sex);
                calf.birth_date = Some(format_date(born_on));
                calf.dam_id = Some(calving.animal_id);
                calf.sire_id = sire_id;
                Some(calf)
            }
            None => None,
        };

        let (calving_id, calf_id) = self
            .store
            .insert_calving_with_calf(calving, calf.as_ref())?;
        info!(
            "event=calving_register module=service status=ok user_id={} dam_id={} calving_id={} calf_spawned={}",
            calving.user_id,
            calving.animal_id,
            calving_id,
            calf_id.is_some()
        );
        Ok(CalvingRegistration {
            calving_id,
            calf_id,
        })
    }

    pub fn list_animals(&self, user_id: UserId) -> RecordServiceResult<Vec<Animal>> {
        Ok(self.store.list_animals(user_id)?)
    }

    fn require_female(&self, user_id: UserId, animal_id: AnimalId) -> RecordServiceResult<()> {
        let animal = self
            .store
            .get_animal(user_id, animal_id)?
            .ok_or(RecordServiceError::UnknownAnimal(animal_id))?;
        if animal.sex != Sex::Female {
            return Err(RecordServiceError::NotFemale(animal_id));
        }
        Ok(())
    }
}

fn check_date(field: &'static str, raw: &str) -> RecordServiceResult<chrono::NaiveDate> {
    parse_date(raw).map_err(|source| RecordServiceError::InvalidDate { field, source })
}
