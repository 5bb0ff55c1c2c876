//! Due-date calculation for breeding records.
//!
//! # Invariants
//! - Output depends only on `breeding_date`, `pd_result` and the config.
//! - Records without a breeding date, or with a negative PD, have no due dates.

use crate::calendar::{add_days, days_between, parse_date};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult, RecordRef};
use crate::model::breeding::BreedingRecord;
use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DueDates {
    pub breeding_date: NaiveDate,
    pub pregnancy_check_due: NaiveDate,
    pub expected_calving_due: NaiveDate,
}

impl DueDates {
    /// Negative once the PD check date has passed.
    pub fn days_until_pd_check(&self, today: NaiveDate) -> i64 {
        days_between(self.pregnancy_check_due, today)
    }

    /// Negative once the expected calving date has passed.
    pub fn days_until_calving(&self, today: NaiveDate) -> i64 {
        days_between(self.expected_calving_due, today)
    }
}

/// Computes forward-looking due dates for one breeding record.
///
/// Returns `Ok(None)` when the record has no breeding date or a negative PD.
///
/// # Errors
/// - `InvalidDate` when `breeding_date` is malformed or offsets overflow.
pub fn compute_due_dates(
    record: &BreedingRecord,
    config: &EngineConfig,
) -> EngineResult<Option<DueDates>> {
    if record.is_negative() {
        return Ok(None);
    }
    let Some(raw) = record.breeding_date.as_deref() else {
        return Ok(None);
    };

    let invalid =
        |err| EngineError::invalid_date(RecordRef::Breeding(record.id), "breeding_date", err);
    let breeding_date = parse_date(raw).map_err(invalid)?;
    Ok(Some(DueDates {
        breeding_date,
        pregnancy_check_due: add_days(breeding_date, i64::from(config.pd_check_offset_days))
            .map_err(invalid)?,
        expected_calving_due: add_days(breeding_date, i64::from(config.gestation_days))
            .map_err(invalid)?,
    }))
}

#[cfg(test)]
mod tests {
    use super::compute_due_dates;
    use crate::config::EngineConfig;
    use crate::model::breeding::{BreedingMethod, BreedingRecord, PdResult};
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record(breeding_date: &str) -> BreedingRecord {
        BreedingRecord::new(1, 10, breeding_date, BreedingMethod::Natural)
    }

    #[test]
    fn offsets_are_applied_from_the_breeding_date() {
        let config = EngineConfig::new(55, 280).unwrap();
        let due = compute_due_dates(&record("2024-01-01"), &config)
            .unwrap()
            .unwrap();
        assert_eq!(due.breeding_date, date(2024, 1, 1));
        assert_eq!(due.pregnancy_check_due, date(2024, 2, 25));
        assert_eq!(due.expected_calving_due, date(2024, 10, 7));
    }

    #[test]
    fn pd_offset_comes_from_config() {
        let config = EngineConfig::new(45, 280).unwrap();
        let due = compute_due_dates(&record("2024-01-01"), &config)
            .unwrap()
            .unwrap();
        assert_eq!(due.pregnancy_check_due, date(2024, 2, 15));
    }

    #[test]
    fn computation_is_deterministic() {
        let config = EngineConfig::new(55, 280).unwrap();
        let input = record("2023-11-20");
        let first = compute_due_dates(&input, &config).unwrap();
        let second = compute_due_dates(&input, &config).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn negative_pd_or_missing_date_has_no_due_dates() {
        let config = EngineConfig::new(55, 280).unwrap();
        let mut negative = record("2024-01-01");
        negative.pd_result = PdResult::NotPregnant;
        assert_eq!(compute_due_dates(&negative, &config).unwrap(), None);

        let mut undated = record("2024-01-01");
        undated.breeding_date = None;
        assert_eq!(compute_due_dates(&undated, &config).unwrap(), None);
    }

    #[test]
    fn malformed_breeding_date_is_invalid_date() {
        let config = EngineConfig::new(55, 280).unwrap();
        let err = compute_due_dates(&record("2024-1-x"), &config).unwrap_err();
        assert_eq!(err.code(), "invalid_date");
        assert!(err.to_string().contains("breeding_date"));
    }

    #[test]
    fn days_until_helpers_count_down() {
        let config = EngineConfig::new(55, 280).unwrap();
        let due = compute_due_dates(&record("2024-01-01"), &config)
            .unwrap()
            .unwrap();
        assert_eq!(due.days_until_pd_check(date(2024, 2, 20)), 5);
        assert_eq!(due.days_until_calving(date(2024, 10, 10)), -3);
    }
}
