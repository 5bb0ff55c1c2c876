//! Breeding cycle bookkeeping shared by status and reconciliation.

use crate::calendar::parse_date;
use crate::error::{EngineError, EngineResult, RecordRef};
use crate::model::animal::AnimalId;
use crate::model::breeding::BreedingRecord;
use crate::model::calving::Calving;
use crate::model::status::BreedingCycleState;

/// Returns whether a calving closes the cycle started by `record`.
///
/// Any calving of the same dam dated on or after the breeding date closes it,
/// whichever record the calving is linked to. A calving linked to `record`
/// closes it regardless of date.
pub fn is_terminated_by(record: &BreedingRecord, calvings: &[&Calving]) -> EngineResult<bool> {
    let dam_calvings: Vec<&Calving> = calvings
        .iter()
        .copied()
        .filter(|calving| calving.animal_id == record.animal_id)
        .collect();
    if dam_calvings
        .iter()
        .any(|calving| calving.breeding_id == Some(record.id))
    {
        return Ok(true);
    }
    if dam_calvings.is_empty() {
        return Ok(false);
    }

    let Some(raw_breeding_date) = record.breeding_date.as_deref() else {
        return Ok(false);
    };
    let breeding_date = parse_date(raw_breeding_date).map_err(|err| {
        EngineError::invalid_date(RecordRef::Breeding(record.id), "breeding_date", err)
    })?;

    for calving in dam_calvings {
        let calving_date = parse_date(&calving.calving_date).map_err(|err| {
            EngineError::invalid_date(RecordRef::Calving(calving.id), "calving_date", err)
        })?;
        if calving_date >= breeding_date {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Returns whether `record` still drives an active cycle: not negative and
/// not closed by a calving.
pub fn is_active_cycle(record: &BreedingRecord, calvings: &[&Calving]) -> EngineResult<bool> {
    if record.is_negative() {
        return Ok(false);
    }
    Ok(!is_terminated_by(record, calvings)?)
}

/// Breeding-side state for one dam.
///
/// `records` and `calvings` may contain other animals' rows; only those of
/// `animal_id` are considered. Two or more open (unchecked, uncalved) records
/// are reported as `AmbiguousState` rather than picking one.
pub fn breeding_cycle_state(
    animal_id: AnimalId,
    records: &[BreedingRecord],
    calvings: &[Calving],
) -> EngineResult<BreedingCycleState> {
    let dam_calvings: Vec<&Calving> = calvings
        .iter()
        .filter(|calving| calving.animal_id == animal_id)
        .collect();

    let mut open_ids = Vec::new();
    let mut pregnant = false;
    for record in records.iter().filter(|record| record.animal_id == animal_id) {
        if !is_active_cycle(record, &dam_calvings)? {
            continue;
        }
        if record.is_confirmed_pregnant() {
            pregnant = true;
        } else {
            open_ids.push(record.id);
        }
    }

    if open_ids.len() > 1 {
        open_ids.sort_unstable();
        return Err(EngineError::AmbiguousState {
            animal_id,
            breeding_ids: open_ids,
        });
    }
    if pregnant {
        return Ok(BreedingCycleState::Pregnant);
    }
    if open_ids.len() == 1 {
        return Ok(BreedingCycleState::BredUnconfirmed);
    }
    Ok(BreedingCycleState::NoActiveCycle)
}
