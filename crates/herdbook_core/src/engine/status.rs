//! Reproductive status derivation.
//!
//! Priority, first match wins:
//! 1. manual override, returned verbatim;
//! 2. non-female animals are `N/A`;
//! 3. no calvings means `Open`;
//! 4. days since the latest calving (ties broken by highest id) select
//!    `Fresh`, `Heat-Detection-Due` or `Open`.

use crate::calendar::{days_between, parse_date};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult, RecordRef};
use crate::model::animal::{Animal, AnimalId};
use crate::model::calving::Calving;
use crate::model::status::{DerivedStatus, ReproductiveStatus, StatusOverride};
use chrono::NaiveDate;
use std::collections::HashMap;

/// Per-animal outcome of a herd-wide derivation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusOutcome {
    pub animal_id: AnimalId,
    pub result: EngineResult<DerivedStatus>,
}

/// Derives one animal's reproductive status.
///
/// `calvings` may contain other animals' rows; only this animal's are used.
///
/// # Errors
/// - `InvalidDate` when one of this animal's calving dates cannot be parsed.
pub fn derive_status(
    animal: &Animal,
    calvings: &[Calving],
    manual_override: StatusOverride,
    today: NaiveDate,
    config: &EngineConfig,
) -> EngineResult<DerivedStatus> {
    let own: Vec<&Calving> = calvings
        .iter()
        .filter(|calving| calving.animal_id == animal.id)
        .collect();
    derive_from_own(animal, &own, manual_override, today, config)
}

/// Derives every animal's status, isolating failures per animal.
///
/// Output order follows `animals`. Each animal uses its own stored override.
pub fn derive_herd(
    animals: &[Animal],
    calvings: &[Calving],
    today: NaiveDate,
    config: &EngineConfig,
) -> Vec<StatusOutcome> {
    let mut by_animal: HashMap<AnimalId, Vec<&Calving>> = HashMap::new();
    for calving in calvings {
        by_animal.entry(calving.animal_id).or_default().push(calving);
    }

    animals
        .iter()
        .map(|animal| {
            let own = by_animal.get(&animal.id).map(Vec::as_slice).unwrap_or(&[]);
            StatusOutcome {
                animal_id: animal.id,
                result: derive_from_own(animal, own, animal.status_override, today, config),
            }
        })
        .collect()
}

fn derive_from_own(
    animal: &Animal,
    own: &[&Calving],
    manual_override: StatusOverride,
    today: NaiveDate,
    config: &EngineConfig,
) -> EngineResult<DerivedStatus> {
    if let Some(forced) = manual_override.forced_status() {
        return Ok(DerivedStatus::overridden(forced));
    }
    if !animal.is_female() {
        return Ok(DerivedStatus::computed(ReproductiveStatus::NotApplicable));
    }

    let Some((latest, _)) = latest_calving(own)? else {
        return Ok(DerivedStatus::computed(ReproductiveStatus::Open));
    };

    let days_since = days_between(today, latest);
    let fresh_end = i64::from(config.fresh_window_days);
    let heat_end = i64::from(config.heat_detection_window_days);
    let status = if (0..=fresh_end).contains(&days_since) {
        ReproductiveStatus::Fresh
    } else if (fresh_end + 1..=heat_end).contains(&days_since) {
        ReproductiveStatus::HeatDetectionDue
    } else {
        ReproductiveStatus::Open
    };
    Ok(DerivedStatus::computed(status))
}

/// Latest calving by date, ties broken by the highest record id.
fn latest_calving<'a>(own: &[&'a Calving]) -> EngineResult<Option<(NaiveDate, &'a Calving)>> {
    let mut latest: Option<(NaiveDate, &'a Calving)> = None;
    for &calving in own {
        let date = parse_date(&calving.calving_date).map_err(|err| {
            EngineError::invalid_date(RecordRef::Calving(calving.id), "calving_date", err)
        })?;
        let newer = match latest {
            None => true,
            Some((current_date, current)) => (date, calving.id) > (current_date, current.id),
        };
        if newer {
            latest = Some((date, calving));
        }
    }
    Ok(latest)
}
