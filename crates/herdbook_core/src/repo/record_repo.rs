//! Herd record repository: animals, breeding records and calvings.
//!
//! # Responsibility
//! - Supply the engine with one user's records.
//! - Persist new records written by the record service.
//!
//! # Invariants
//! - Parent references (`dam_id`, `sire_id`) must point at animals of the
//!   same user; a new calf can never close a cycle in the parent graph.
//! - Calf spawning and calving insertion commit together or not at all.
//! - `flag_breeding_for_review` is the only write reconciliation performs.

use super::{bool_to_int, ensure_connection_ready, int_to_bool, RepoError, RepoResult};
use crate::model::animal::{Animal, AnimalId, LifecycleStatus, Sex};
use crate::model::breeding::{BreedingId, BreedingMethod, BreedingRecord, PdResult};
use crate::model::calving::{Calving, CalvingId};
use crate::model::status::StatusOverride;
use crate::model::UserId;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, Transaction, TransactionBehavior};

const ANIMAL_SELECT_SQL: &str = "SELECT
    id, user_id, ear_tag, sex, birth_date, lifecycle, status_override, dam_id, sire_id
FROM animals";

const BREEDING_SELECT_SQL: &str = "SELECT
    id, user_id, animal_id, breeding_date, method, sire_id, pd_result, pd_check_date,
    confirmed_pregnant, needs_review, created_at
FROM breeding_records";

const CALVING_SELECT_SQL: &str = "SELECT
    id, user_id, animal_id, breeding_id, calving_date, calf_ear_tag, calf_sex,
    calf_weight_kg, complications
FROM calvings";

/// Record source consumed by the reproductive engine.
pub trait RecordStore {
    fn insert_animal(&self, animal: &Animal) -> RepoResult<AnimalId>;
    fn get_animal(&self, user_id: UserId, id: AnimalId) -> RepoResult<Option<Animal>>;
    fn list_animals(&self, user_id: UserId) -> RepoResult<Vec<Animal>>;
    fn set_status_override(
        &self,
        user_id: UserId,
        id: AnimalId,
        value: StatusOverride,
    ) -> RepoResult<()>;

    fn insert_breeding_record(&self, record: &BreedingRecord) -> RepoResult<BreedingId>;
    fn get_breeding_record(
        &self,
        user_id: UserId,
        id: BreedingId,
    ) -> RepoResult<Option<BreedingRecord>>;
    fn list_breeding_records(&self, user_id: UserId) -> RepoResult<Vec<BreedingRecord>>;
    /// Records a pregnancy diagnosis outcome.
    fn update_pd_result(
        &self,
        user_id: UserId,
        id: BreedingId,
        pd_result: PdResult,
        pd_check_date: Option<&str>,
    ) -> RepoResult<()>;
    /// Marks a breeding record for staff review. Returns `false` when it was
    /// already flagged.
    fn flag_breeding_for_review(&self, user_id: UserId, id: BreedingId) -> RepoResult<bool>;

    /// Inserts a calving and, when given, the calf spawned by it, atomically.
    fn insert_calving_with_calf(
        &self,
        calving: &Calving,
        calf: Option<&Animal>,
    ) -> RepoResult<(CalvingId, Option<AnimalId>)>;
    fn insert_calving(&self, calving: &Calving) -> RepoResult<CalvingId> {
        self.insert_calving_with_calf(calving, None)
            .map(|(calving_id, _)| calving_id)
    }
    fn list_calvings(&self, user_id: UserId) -> RepoResult<Vec<Calving>>;
}

/// SQLite-backed record store.
pub struct SqliteRecordRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteRecordRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl RecordStore for SqliteRecordRepository<'_> {
    fn insert_animal(&self, animal: &Animal) -> RepoResult<AnimalId> {
        insert_animal_in(self.conn, animal)
    }

    fn get_animal(&self, user_id: UserId, id: AnimalId) -> RepoResult<Option<Animal>> {
        get_animal_in(self.conn, user_id, id)
    }

    fn list_animals(&self, user_id: UserId) -> RepoResult<Vec<Animal>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ANIMAL_SELECT_SQL} WHERE user_id = ?1 ORDER BY id ASC;"))?;
        let mut rows = stmt.query([user_id])?;
        let mut animals = Vec::new();
        while let Some(row) = rows.next()? {
            animals.push(parse_animal_row(row)?);
        }
        Ok(animals)
    }

    fn set_status_override(
        &self,
        user_id: UserId,
        id: AnimalId,
        value: StatusOverride,
    ) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE animals SET status_override = ?3 WHERE user_id = ?1 AND id = ?2;",
            params![user_id, id, value.as_db()],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("animal", id));
        }
        Ok(())
    }

    fn insert_breeding_record(&self, record: &BreedingRecord) -> RepoResult<BreedingId> {
        ensure_owned_animal(self.conn, record.user_id, record.animal_id, "dam")?;
        if let Some(sire_id) = record.sire_id {
            ensure_owned_animal(self.conn, record.user_id, sire_id, "sire")?;
        }

        self.conn.execute(
            "INSERT INTO breeding_records (
                user_id, animal_id, breeding_date, method, sire_id, pd_result,
                pd_check_date, confirmed_pregnant, needs_review
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
            params![
                record.user_id,
                record.animal_id,
                record.breeding_date.as_deref(),
                record.method.as_db(),
                record.sire_id,
                record.pd_result.as_db(),
                record.pd_check_date.as_deref(),
                bool_to_int(record.confirmed_pregnant),
                bool_to_int(record.needs_review),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_breeding_record(
        &self,
        user_id: UserId,
        id: BreedingId,
    ) -> RepoResult<Option<BreedingRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{BREEDING_SELECT_SQL} WHERE user_id = ?1 AND id = ?2;"))?;
        let mut rows = stmt.query(params![user_id, id])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_breeding_row(row)?)),
            None => Ok(None),
        }
    }

    fn list_breeding_records(&self, user_id: UserId) -> RepoResult<Vec<BreedingRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{BREEDING_SELECT_SQL} WHERE user_id = ?1 ORDER BY id ASC;"))?;
        let mut rows = stmt.query([user_id])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(parse_breeding_row(row)?);
        }
        Ok(records)
    }

    fn update_pd_result(
        &self,
        user_id: UserId,
        id: BreedingId,
        pd_result: PdResult,
        pd_check_date: Option<&str>,
    ) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE breeding_records
             SET pd_result = ?3,
                 pd_check_date = ?4,
                 confirmed_pregnant = CASE WHEN ?3 = 'pregnant' THEN 1 ELSE 0 END
             WHERE user_id = ?1 AND id = ?2;",
            params![user_id, id, pd_result.as_db(), pd_check_date],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("breeding record", id));
        }
        Ok(())
    }

    fn flag_breeding_for_review(&self, user_id: UserId, id: BreedingId) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "UPDATE breeding_records
             SET needs_review = 1
             WHERE user_id = ?1 AND id = ?2 AND needs_review = 0;",
            params![user_id, id],
        )?;
        if changed == 1 {
            return Ok(true);
        }
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM breeding_records WHERE user_id = ?1 AND id = ?2);",
            params![user_id, id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(RepoError::not_found("breeding record", id));
        }
        Ok(false)
    }

    fn insert_calving_with_calf(
        &self,
        calving: &Calving,
        calf: Option<&Animal>,
    ) -> RepoResult<(CalvingId, Option<AnimalId>)> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        ensure_owned_animal(&tx, calving.user_id, calving.animal_id, "dam")?;
        if let Some(breeding_id) = calving.breeding_id {
            let linked: Option<AnimalId> = tx
                .query_row(
                    "SELECT animal_id FROM breeding_records WHERE user_id = ?1 AND id = ?2;",
                    params![calving.user_id, breeding_id],
                    |row| row.get(0),
                )
                .optional()?;
            match linked {
                None => return Err(RepoError::not_found("breeding record", breeding_id)),
                Some(dam) if dam != calving.animal_id => {
                    return Err(RepoError::Conflict(format!(
                        "breeding record {breeding_id} belongs to animal {dam}, not {}",
                        calving.animal_id
                    )));
                }
                Some(_) => {}
            }
        }

        let calf_id = match calf {
            Some(calf) => Some(insert_animal_in(&tx, calf)?),
            None => None,
        };

        tx.execute(
            "INSERT INTO calvings (
                user_id, animal_id, breeding_id, calving_date, calf_ear_tag, calf_sex,
                calf_weight_kg, complications
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                calving.user_id,
                calving.animal_id,
                calving.breeding_id,
                calving.calving_date.as_str(),
                calving.calf_ear_tag.as_deref(),
                calving.calf_sex.map(sex_to_db),
                calving.calf_weight_kg,
                calving.complications.as_deref(),
            ],
        )?;
        let calving_id = tx.last_insert_rowid();
        tx.commit()?;
        Ok((calving_id, calf_id))
    }

    fn list_calvings(&self, user_id: UserId) -> RepoResult<Vec<Calving>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{CALVING_SELECT_SQL} WHERE user_id = ?1 ORDER BY id ASC;"))?;
        let mut rows = stmt.query([user_id])?;
        let mut calvings = Vec::new();
        while let Some(row) = rows.next()? {
            calvings.push(parse_calving_row(row)?);
        }
        Ok(calvings)
    }
}

fn insert_animal_in(conn: &Connection, animal: &Animal) -> RepoResult<AnimalId> {
    animal.validate()?;
    if let Some(dam_id) = animal.dam_id {
        ensure_owned_animal(conn, animal.user_id, dam_id, "dam")?;
    }
    if let Some(sire_id) = animal.sire_id {
        ensure_owned_animal(conn, animal.user_id, sire_id, "sire")?;
    }

    let result = conn.execute(
        "INSERT INTO animals (
            user_id, ear_tag, sex, birth_date, lifecycle, status_override, dam_id, sire_id
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
        params![
            animal.user_id,
            animal.ear_tag.as_str(),
            sex_to_db(animal.sex),
            animal.birth_date.as_deref(),
            lifecycle_to_db(animal.lifecycle),
            animal.status_override.as_db(),
            animal.dam_id,
            animal.sire_id,
        ],
    );
    match result {
        Ok(_) => Ok(conn.last_insert_rowid()),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == ErrorCode::ConstraintViolation =>
        {
            Err(RepoError::Conflict(format!(
                "ear tag `{}` already exists in this herd",
                animal.ear_tag
            )))
        }
        Err(err) => Err(err.into()),
    }
}

fn get_animal_in(conn: &Connection, user_id: UserId, id: AnimalId) -> RepoResult<Option<Animal>> {
    let mut stmt = conn.prepare(&format!("{ANIMAL_SELECT_SQL} WHERE user_id = ?1 AND id = ?2;"))?;
    let mut rows = stmt.query(params![user_id, id])?;
    match rows.next()? {
        Some(row) => Ok(Some(parse_animal_row(row)?)),
        None => Ok(None),
    }
}

/// Parent/dam references must exist and belong to the same user.
fn ensure_owned_animal(
    conn: &Connection,
    user_id: UserId,
    id: AnimalId,
    role: &'static str,
) -> RepoResult<()> {
    if get_animal_in(conn, user_id, id)?.is_none() {
        return Err(RepoError::Conflict(format!(
            "{role} animal {id} does not exist in this herd"
        )));
    }
    Ok(())
}

fn parse_animal_row(row: &Row<'_>) -> RepoResult<Animal> {
    let sex_text: String = row.get("sex")?;
    let lifecycle_text: String = row.get("lifecycle")?;
    let override_text: Option<String> = row.get("status_override")?;

    Ok(Animal {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        ear_tag: row.get("ear_tag")?,
        sex: parse_sex(&sex_text).ok_or_else(|| {
            RepoError::InvalidData(format!("invalid sex `{sex_text}` in animals.sex"))
        })?,
        birth_date: row.get("birth_date")?,
        lifecycle: parse_lifecycle(&lifecycle_text).ok_or_else(|| {
            RepoError::InvalidData(format!(
                "invalid lifecycle `{lifecycle_text}` in animals.lifecycle"
            ))
        })?,
        status_override: StatusOverride::parse_db(override_text.as_deref()).ok_or_else(|| {
            RepoError::InvalidData(format!(
                "invalid status override `{}` in animals.status_override",
                override_text.as_deref().unwrap_or_default()
            ))
        })?,
        dam_id: row.get("dam_id")?,
        sire_id: row.get("sire_id")?,
    })
}

fn parse_breeding_row(row: &Row<'_>) -> RepoResult<BreedingRecord> {
    let method_text: String = row.get("method")?;
    let pd_text: String = row.get("pd_result")?;

    Ok(BreedingRecord {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        animal_id: row.get("animal_id")?,
        breeding_date: row.get("breeding_date")?,
        method: BreedingMethod::parse_db(&method_text).ok_or_else(|| {
            RepoError::InvalidData(format!(
                "invalid method `{method_text}` in breeding_records.method"
            ))
        })?,
        sire_id: row.get("sire_id")?,
        pd_result: PdResult::parse_db(&pd_text).ok_or_else(|| {
            RepoError::InvalidData(format!(
                "invalid pd result `{pd_text}` in breeding_records.pd_result"
            ))
        })?,
        pd_check_date: row.get("pd_check_date")?,
        confirmed_pregnant: int_to_bool(
            row.get("confirmed_pregnant")?,
            "breeding_records.confirmed_pregnant",
        )?,
        needs_review: int_to_bool(row.get("needs_review")?, "breeding_records.needs_review")?,
        created_at: row.get("created_at")?,
    })
}

fn parse_calving_row(row: &Row<'_>) -> RepoResult<Calving> {
    let calf_sex = match row.get::<_, Option<String>>("calf_sex")? {
        Some(value) => Some(parse_sex(&value).ok_or_else(|| {
            RepoError::InvalidData(format!("invalid sex `{value}` in calvings.calf_sex"))
        })?),
        None => None,
    };

    Ok(Calving {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        animal_id: row.get("animal_id")?,
        breeding_id: row.get("breeding_id")?,
        calving_date: row.get("calving_date")?,
        calf_ear_tag: row.get("calf_ear_tag")?,
        calf_sex,
        calf_weight_kg: row.get("calf_weight_kg")?,
        complications: row.get("complications")?,
    })
}

fn sex_to_db(sex: Sex) -> &'static str {
    match sex {
        Sex::Female => "female",
        Sex::Male => "male",
    }
}

fn parse_sex(value: &str) -> Option<Sex> {
    match value {
        "female" => Some(Sex::Female),
        "male" => Some(Sex::Male),
        _ => None,
    }
}

fn lifecycle_to_db(lifecycle: LifecycleStatus) -> &'static str {
    match lifecycle {
        LifecycleStatus::Active => "active",
        LifecycleStatus::Sold => "sold",
        LifecycleStatus::Deceased => "deceased",
    }
}

fn parse_lifecycle(value: &str) -> Option<LifecycleStatus> {
    match value {
        "active" => Some(LifecycleStatus::Active),
        "sold" => Some(LifecycleStatus::Sold),
        "deceased" => Some(LifecycleStatus::Deceased),
        _ => None,
    }
}
