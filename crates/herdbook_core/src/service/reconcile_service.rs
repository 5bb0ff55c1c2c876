//! Reconciliation run and herd status views.
//!
//! # Responsibility
//! - Pull one user's records, run the pure engine, write results back.
//! - Apply the `Open` fallback when one animal's status cannot be derived.
//!
//! # Invariants
//! - The only herd-record mutation is flagging breeding records named by a
//!   `reopen_breeding` reminder for review.
//! - Engine warnings never abort a run; storage failures do.

use crate::config::EngineConfig;
use crate::engine::cycle::breeding_cycle_state;
use crate::engine::reconcile::{reconcile, reopen_candidates, ReconcileInput};
use crate::engine::status::derive_herd;
use crate::error::EngineError;
use crate::model::animal::{AnimalId, LifecycleStatus};
use crate::model::status::{BreedingCycleState, DerivedStatus, ReproductiveStatus};
use crate::model::UserId;
use crate::repo::notification_repo::{NotificationStore, UpsertOutcome};
use crate::repo::record_repo::RecordStore;
use crate::repo::RepoError;
use chrono::NaiveDate;
use log::{info, warn};
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug)]
pub enum ReconcileServiceError {
    Repo(RepoError),
}

impl Display for ReconcileServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(err) => write!(f, "reconciliation storage failure: {err}"),
        }
    }
}

impl Error for ReconcileServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<RepoError> for ReconcileServiceError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Counters and skipped records of one `run_for_user` pass.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Breeding records newly flagged for review.
    pub flagged: usize,
    pub warnings: Vec<EngineError>,
}

impl ReconcileReport {
    pub fn changed(&self) -> usize {
        self.inserted + self.updated
    }
}

/// One row of the herd status view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HerdStatusRow {
    pub animal_id: AnimalId,
    pub ear_tag: String,
    pub lifecycle: LifecycleStatus,
    pub status: DerivedStatus,
    /// `None` when the breeding history is ambiguous or malformed.
    pub cycle: Option<BreedingCycleState>,
}

pub struct ReconcileService<R: RecordStore, N: NotificationStore> {
    records: R,
    notifications: N,
    config: EngineConfig,
}

impl<R: RecordStore, N: NotificationStore> ReconcileService<R, N> {
    pub fn new(records: R, notifications: N, config: EngineConfig) -> Self {
        Self {
            records,
            notifications,
            config,
        }
    }

    /// Brings one user's stored notifications in line with their records.
    ///
    /// Safe to re-run: a second pass over unchanged records reports zero
    /// inserts and updates.
    pub fn run_for_user(
        &self,
        user_id: UserId,
        today: NaiveDate,
    ) -> Result<ReconcileReport, ReconcileServiceError> {
        info!(
            "event=reconcile_run module=service status=start user_id={} today={}",
            user_id, today
        );

        let animals = self.records.list_animals(user_id)?;
        let breeding_records = self.records.list_breeding_records(user_id)?;
        let calvings = self.records.list_calvings(user_id)?;
        let existing = self.notifications.list_notifications(user_id)?;

        let input = ReconcileInput {
            user_id,
            today,
            animals: &animals,
            breeding_records: &breeding_records,
            calvings: &calvings,
            existing: &existing,
        };
        let outcome = reconcile(&input, &self.config);

        let mut report = ReconcileReport {
            warnings: outcome.warnings,
            ..ReconcileReport::default()
        };
        for upsert in &outcome.upserts {
            match self.notifications.apply_upsert(upsert)? {
                UpsertOutcome::Inserted => report.inserted += 1,
                UpsertOutcome::Updated => report.updated += 1,
                UpsertOutcome::Unchanged => report.unchanged += 1,
            }
        }
        for breeding_id in reopen_candidates(&outcome.upserts) {
            if self.records.flag_breeding_for_review(user_id, breeding_id)? {
                report.flagged += 1;
            }
        }

        info!(
            "event=reconcile_run module=service status=ok user_id={} inserted={} updated={} unchanged={} flagged={} warnings={}",
            user_id,
            report.inserted,
            report.updated,
            report.unchanged,
            report.flagged,
            report.warnings.len()
        );
        Ok(report)
    }

    /// Current status of every animal of one user, in id order.
    pub fn herd_statuses(
        &self,
        user_id: UserId,
        today: NaiveDate,
    ) -> Result<Vec<HerdStatusRow>, ReconcileServiceError> {
        let animals = self.records.list_animals(user_id)?;
        let breeding_records = self.records.list_breeding_records(user_id)?;
        let calvings = self.records.list_calvings(user_id)?;

        let outcomes = derive_herd(&animals, &calvings, today, &self.config);
        let rows = animals
            .iter()
            .zip(outcomes)
            .map(|(animal, outcome)| {
                let status = outcome.result.unwrap_or_else(|err| {
                    warn!(
                        "event=status_derive module=service status=error code={} animal_id={} fallback=open",
                        err.code(),
                        animal.id
                    );
                    DerivedStatus::computed(ReproductiveStatus::Open)
                });
                let cycle = if animal.is_female() {
                    breeding_cycle_state(animal.id, &breeding_records, &calvings)
                        .map_err(|err| {
                            warn!(
                                "event=cycle_state module=service status=error code={} animal_id={}",
                                err.code(),
                                animal.id
                            );
                        })
                        .ok()
                } else {
                    None
                };
                HerdStatusRow {
                    animal_id: animal.id,
                    ear_tag: animal.ear_tag.clone(),
                    lifecycle: animal.lifecycle,
                    status,
                    cycle,
                }
            })
            .collect();
        Ok(rows)
    }
}
