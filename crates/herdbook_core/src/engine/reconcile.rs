//! Notification reconciliation.
//!
//! # Responsibility
//! - Derive which reminders one user's breeding cycles call for today.
//! - Diff them against stored notifications and emit only the changes.
//!
//! # Invariants
//! - Pure: the caller supplies records, notifications and `today`, and owns
//!   persisting the returned upserts.
//! - Reconciling unchanged input a second time (after applying the first
//!   result) yields no upserts.
//! - Closed cycles (calving recorded, negative PD) produce nothing; their
//!   earlier notifications stay untouched as an audit trail.
//! - Rows of other users are ignored.

use crate::calendar::{add_days, days_between, format_date, is_within};
use crate::config::EngineConfig;
use crate::engine::cycle::is_active_cycle;
use crate::engine::due_dates::{compute_due_dates, DueDates};
use crate::error::{EngineError, EngineResult};
use crate::model::animal::{Animal, AnimalId};
use crate::model::breeding::{BreedingId, BreedingRecord};
use crate::model::calving::Calving;
use crate::model::notification::{
    Channel, DedupKey, Notification, NotificationKind, NotificationUpsert,
};
use crate::model::UserId;
use chrono::NaiveDate;
use log::{debug, warn};
use serde_json::json;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Everything one reconciliation pass needs, scoped to `user_id`.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileInput<'a> {
    pub user_id: UserId,
    pub today: NaiveDate,
    /// Used for ear tags in titles; may be empty.
    pub animals: &'a [Animal],
    pub breeding_records: &'a [BreedingRecord],
    pub calvings: &'a [Calving],
    pub existing: &'a [Notification],
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileOutcome {
    /// Sorted by `(scheduled_for, source_id, kind)`.
    pub upserts: Vec<NotificationUpsert>,
    /// Records skipped this pass; the rest of the herd was still processed.
    pub warnings: Vec<EngineError>,
}

/// A reminder the current records call for, before diffing.
struct PlannedReminder<'a> {
    key: DedupKey,
    record: &'a BreedingRecord,
    due: DueDates,
}

/// Computes the notification upserts needed to bring storage in sync.
///
/// The lookahead window is `config.lookahead_days`.
pub fn reconcile(input: &ReconcileInput<'_>, config: &EngineConfig) -> ReconcileOutcome {
    let mut warnings = Vec::new();

    let window_end =
        add_days(input.today, i64::from(config.lookahead_days)).unwrap_or(input.today);

    let mut calvings_by_dam: HashMap<AnimalId, Vec<&Calving>> = HashMap::new();
    for calving in input.calvings.iter().filter(|c| c.user_id == input.user_id) {
        calvings_by_dam.entry(calving.animal_id).or_default().push(calving);
    }

    // BTreeMap keeps per-dam processing (and warning order) deterministic.
    let mut records_by_dam: BTreeMap<AnimalId, Vec<&BreedingRecord>> = BTreeMap::new();
    for record in input.breeding_records {
        if record.user_id != input.user_id {
            debug!(
                "event=reconcile_record module=engine status=skipped reason=foreign_user breeding_id={}",
                record.id
            );
            continue;
        }
        records_by_dam.entry(record.animal_id).or_default().push(record);
    }

    let mut planned = Vec::new();
    for (animal_id, records) in &records_by_dam {
        let dam_calvings = calvings_by_dam
            .get(animal_id)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let active = active_cycles(*animal_id, records, dam_calvings, config, &mut warnings);
        for (record, due) in active {
            plan_reminders(record, due, input.today, window_end, config, &mut planned);
        }
    }

    let upserts = diff_against_existing(input, planned);
    for warning in &warnings {
        warn!(
            "event=reconcile_record module=engine status=skipped user_id={} error_code={} detail={}",
            input.user_id,
            warning.code(),
            warning
        );
    }

    ReconcileOutcome { upserts, warnings }
}

/// Active cycles of one dam with their due dates.
///
/// Open (unchecked) records beyond the first are ambiguous: all of them are
/// withheld and one `AmbiguousState` warning is recorded. Confirmed pregnant
/// cycles are unaffected.
fn active_cycles<'a>(
    animal_id: AnimalId,
    records: &[&'a BreedingRecord],
    dam_calvings: &[&Calving],
    config: &EngineConfig,
    warnings: &mut Vec<EngineError>,
) -> Vec<(&'a BreedingRecord, DueDates)> {
    let mut active = Vec::new();
    for &record in records {
        match classify(record, dam_calvings, config) {
            Ok(Some(due)) => active.push((record, due)),
            Ok(None) => {}
            Err(err) => warnings.push(err),
        }
    }

    let mut open_ids: Vec<BreedingId> = active
        .iter()
        .filter(|(record, _)| record.is_unchecked())
        .map(|(record, _)| record.id)
        .collect();
    if open_ids.len() > 1 {
        open_ids.sort_unstable();
        active.retain(|(record, _)| !record.is_unchecked());
        warnings.push(EngineError::AmbiguousState {
            animal_id,
            breeding_ids: open_ids,
        });
    }
    active
}

fn classify(
    record: &BreedingRecord,
    dam_calvings: &[&Calving],
    config: &EngineConfig,
) -> EngineResult<Option<DueDates>> {
    if !is_active_cycle(record, dam_calvings)? {
        return Ok(None);
    }
    compute_due_dates(record, config)
}

fn plan_reminders<'a>(
    record: &'a BreedingRecord,
    due: DueDates,
    today: NaiveDate,
    window_end: NaiveDate,
    config: &EngineConfig,
    planned: &mut Vec<PlannedReminder<'a>>,
) {
    let mut push = |kind, scheduled_for| {
        planned.push(PlannedReminder {
            key: DedupKey::new(kind, record.id, scheduled_for),
            record,
            due,
        });
    };

    if record.is_unchecked() && is_within(due.pregnancy_check_due, today, window_end) {
        push(NotificationKind::PdCheck, due.pregnancy_check_due);
    }

    if record.is_confirmed_pregnant()
        && is_within(due.expected_calving_due, today, window_end)
    {
        push(NotificationKind::ExpectedCalving, due.expected_calving_due);
    }

    // Applies to unchecked and confirmed-pregnant cycles alike: a positive PD
    // with no calving long after the due date still needs re-evaluation.
    let grace = i64::from(config.reopen_grace_days);
    if days_between(today, due.expected_calving_due) > grace {
        // First day the grace period counts as exceeded; stable across runs.
        if let Ok(reopen_on) = add_days(due.expected_calving_due, grace + 1) {
            push(NotificationKind::ReopenBreeding, reopen_on);
        }
    }
}

fn diff_against_existing(
    input: &ReconcileInput<'_>,
    planned: Vec<PlannedReminder<'_>>,
) -> Vec<NotificationUpsert> {
    let own_existing: Vec<&Notification> = input
        .existing
        .iter()
        .filter(|notification| notification.user_id == input.user_id)
        .collect();
    let known_keys: HashSet<&DedupKey> = own_existing.iter().map(|n| &n.dedup_key).collect();

    // Most recent unread row per slot is the one a shifted date rewrites.
    let mut unread_by_slot: HashMap<(NotificationKind, BreedingId), &Notification> =
        HashMap::new();
    for &notification in own_existing.iter().filter(|n| !n.is_read) {
        let slot = notification.dedup_key.slot();
        let replace = match unread_by_slot.get(&slot) {
            None => true,
            Some(current) => {
                (notification.created_at, notification.id) > (current.created_at, current.id)
            }
        };
        if replace {
            unread_by_slot.insert(slot, notification);
        }
    }

    let tags: HashMap<AnimalId, &str> = input
        .animals
        .iter()
        .filter(|animal| animal.user_id == input.user_id)
        .map(|animal| (animal.id, animal.ear_tag.as_str()))
        .collect();

    let mut upserts: Vec<NotificationUpsert> = planned
        .into_iter()
        .filter(|reminder| !known_keys.contains(&reminder.key))
        .map(|reminder| {
            let supersedes = unread_by_slot
                .get(&reminder.key.slot())
                .map(|existing| existing.dedup_key.clone());
            let tag = tags
                .get(&reminder.record.animal_id)
                .map(|tag| (*tag).to_string())
                .unwrap_or_else(|| format!("animal #{}", reminder.record.animal_id));
            build_upsert(input.user_id, &reminder, &tag, supersedes)
        })
        .collect();

    upserts.sort_by(|a, b| {
        (a.scheduled_for(), a.source_id(), a.kind()).cmp(&(
            b.scheduled_for(),
            b.source_id(),
            b.kind(),
        ))
    });
    upserts
}

fn build_upsert(
    user_id: UserId,
    reminder: &PlannedReminder<'_>,
    tag: &str,
    supersedes: Option<DedupKey>,
) -> NotificationUpsert {
    let due = &reminder.due;
    let breeding_date = format_date(due.breeding_date);
    let (title, body, due_date) = match reminder.key.kind {
        NotificationKind::PdCheck => (
            format!("PD check due for {tag}"),
            format!(
                "Pregnancy diagnosis for {tag} is due on {} (bred {breeding_date}).",
                format_date(due.pregnancy_check_due)
            ),
            due.pregnancy_check_due,
        ),
        NotificationKind::ExpectedCalving => (
            format!("Calving expected for {tag}"),
            format!(
                "{tag} is expected to calve on {} (bred {breeding_date}).",
                format_date(due.expected_calving_due)
            ),
            due.expected_calving_due,
        ),
        NotificationKind::ReopenBreeding => (
            format!("Re-evaluate breeding for {tag}"),
            format!(
                "{tag} was expected to calve on {} and no calving or negative PD has been \
                 recorded since. Re-check pregnancy and consider rebreeding.",
                format_date(due.expected_calving_due)
            ),
            due.expected_calving_due,
        ),
    };

    NotificationUpsert {
        dedup_key: reminder.key.clone(),
        user_id,
        animal_id: Some(reminder.record.animal_id),
        channel: Channel::InApp,
        title,
        body,
        metadata: json!({
            "type": reminder.key.kind.as_str(),
            "breeding_id": reminder.record.id,
            "animal_id": reminder.record.animal_id,
            "breeding_date": breeding_date,
            "due_date": format_date(due_date),
        }),
        supersedes,
    }
}

/// Breeding record ids named by `reopen_breeding` upserts.
pub fn reopen_candidates(upserts: &[NotificationUpsert]) -> Vec<BreedingId> {
    let mut ids: Vec<BreedingId> = upserts
        .iter()
        .filter(|upsert| upsert.kind() == NotificationKind::ReopenBreeding)
        .map(NotificationUpsert::source_id)
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

#[cfg(test)]
mod tests {
    use super::{reconcile, reopen_candidates, ReconcileInput};
    use crate::calendar::{add_days, format_date};
    use crate::config::EngineConfig;
    use crate::error::EngineError;
    use crate::model::animal::{Animal, Sex};
    use crate::model::breeding::{BreedingMethod, BreedingRecord, PdResult};
    use crate::model::calving::Calving;
    use crate::model::notification::{Notification, NotificationKind, NotificationUpsert};
    use chrono::NaiveDate;
    use uuid::Uuid;

    const USER: i64 = 1;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()
    }

    fn config() -> EngineConfig {
        EngineConfig::new(55, 280).unwrap()
    }

    fn days_ago(days: i64) -> String {
        format_date(add_days(today(), -days).unwrap())
    }

    fn cow(id: i64, tag: &str) -> Animal {
        let mut animal = Animal::new(USER, tag, Sex::Female);
        animal.id = id;
        animal
    }

    fn bred(id: i64, animal_id: i64, days: i64) -> BreedingRecord {
        let mut record =
            BreedingRecord::new(USER, animal_id, days_ago(days), BreedingMethod::Natural);
        record.id = id;
        record
    }

    fn run(
        records: &[BreedingRecord],
        calvings: &[Calving],
        existing: &[Notification],
    ) -> super::ReconcileOutcome {
        run_with(&config(), records, calvings, existing)
    }

    fn run_with(
        config: &EngineConfig,
        records: &[BreedingRecord],
        calvings: &[Calving],
        existing: &[Notification],
    ) -> super::ReconcileOutcome {
        let animals = vec![cow(10, "1042"), cow(11, "1043")];
        reconcile(
            &ReconcileInput {
                user_id: USER,
                today: today(),
                animals: &animals,
                breeding_records: records,
                calvings,
                existing,
            },
            config,
        )
    }

    /// What a store would hold after applying `upserts`.
    fn persisted(upserts: &[NotificationUpsert]) -> Vec<Notification> {
        upserts
            .iter()
            .enumerate()
            .map(|(index, upsert)| Notification {
                id: Uuid::new_v4(),
                user_id: upsert.user_id,
                animal_id: upsert.animal_id,
                channel: upsert.channel,
                dedup_key: upsert.dedup_key.clone(),
                title: upsert.title.clone(),
                body: upsert.body.clone(),
                metadata: upsert.metadata.clone(),
                is_read: false,
                created_at: index as i64,
            })
            .collect()
    }

    #[test]
    fn pd_check_inside_window_is_emitted_with_metadata() {
        // Bred 50 days ago: PD due in 5 days, inside the 7-day window.
        let outcome = run(&[bred(1, 10, 50)], &[], &[]);
        assert!(outcome.warnings.is_empty());
        assert_eq!(outcome.upserts.len(), 1);

        let upsert = &outcome.upserts[0];
        assert_eq!(upsert.kind(), NotificationKind::PdCheck);
        assert_eq!(upsert.scheduled_for(), add_days(today(), 5).unwrap());
        assert_eq!(upsert.animal_id, Some(10));
        assert_eq!(upsert.title, "PD check due for 1042");
        assert_eq!(upsert.metadata["breeding_id"], 1);
        assert_eq!(upsert.supersedes, None);
    }

    #[test]
    fn pd_check_outside_window_is_not_emitted() {
        assert!(run(&[bred(1, 10, 40)], &[], &[]).upserts.is_empty());
        assert!(run(&[bred(1, 10, 56)], &[], &[]).upserts.is_empty());
    }

    #[test]
    fn lookahead_window_comes_from_config() {
        let same_day_only = config().with_lookahead_days(0);
        assert!(run_with(&same_day_only, &[bred(1, 10, 50)], &[], &[])
            .upserts
            .is_empty());
        let due_today = run_with(&same_day_only, &[bred(1, 10, 55)], &[], &[]);
        assert_eq!(due_today.upserts.len(), 1);
        assert_eq!(due_today.upserts[0].scheduled_for(), today());

        let wide = config().with_lookahead_days(10);
        assert_eq!(run_with(&wide, &[bred(1, 10, 46)], &[], &[]).upserts.len(), 1);
    }

    #[test]
    fn second_pass_over_applied_result_is_empty() {
        let records = vec![bred(1, 10, 50), bred(2, 11, 301)];
        let first = run(&records, &[], &[]);
        assert_eq!(first.upserts.len(), 2);

        let stored = persisted(&first.upserts);
        let second = run(&records, &[], &stored);
        assert!(second.upserts.is_empty());
    }

    #[test]
    fn confirmed_pregnancy_gets_calving_reminder() {
        let mut record = bred(1, 10, 275);
        record.pd_result = PdResult::Pregnant;
        let outcome = run(&[record], &[], &[]);
        assert_eq!(outcome.upserts.len(), 1);
        assert_eq!(outcome.upserts[0].kind(), NotificationKind::ExpectedCalving);
        assert_eq!(
            outcome.upserts[0].scheduled_for(),
            add_days(today(), 5).unwrap()
        );
    }

    #[test]
    fn overdue_unchecked_cycle_emits_exactly_one_reopen() {
        let outcome = run(&[bred(1, 10, 300)], &[], &[]);
        assert_eq!(outcome.upserts.len(), 1);
        let upsert = &outcome.upserts[0];
        assert_eq!(upsert.kind(), NotificationKind::ReopenBreeding);
        // 280 days gestation + 14 grace, first exceeded on day 295.
        assert_eq!(upsert.scheduled_for(), add_days(today(), -5).unwrap());
        assert_eq!(reopen_candidates(&outcome.upserts), vec![1]);
    }

    #[test]
    fn overdue_confirmed_pregnancy_also_reopens() {
        let mut record = bred(1, 10, 300);
        record.pd_result = PdResult::Pregnant;
        let outcome = run(&[record], &[], &[]);
        assert_eq!(outcome.upserts.len(), 1);
        assert_eq!(outcome.upserts[0].kind(), NotificationKind::ReopenBreeding);
    }

    #[test]
    fn reopen_waits_for_the_grace_period() {
        assert!(run(&[bred(1, 10, 294)], &[], &[]).upserts.is_empty());
        assert_eq!(run(&[bred(1, 10, 295)], &[], &[]).upserts.len(), 1);
    }

    #[test]
    fn recorded_calving_closes_the_cycle() {
        let mut record = bred(1, 10, 278);
        record.pd_result = PdResult::Pregnant;
        let pending = run(&[record.clone()], &[], &[]);
        assert_eq!(pending.upserts.len(), 1);
        let stored = persisted(&pending.upserts);

        let mut calving = Calving::new(USER, 10, days_ago(0));
        calving.id = 5;
        calving.breeding_id = Some(1);
        let after = run(&[record], &[calving], &stored);
        assert!(after.upserts.is_empty());
        assert!(after.warnings.is_empty());
    }

    #[test]
    fn calving_credited_to_another_service_suppresses_reopen() {
        let unchecked = bred(1, 10, 540);
        let mut confirmed = bred(2, 10, 520);
        confirmed.pd_result = PdResult::Pregnant;
        let mut calving = Calving::new(USER, 10, days_ago(240));
        calving.id = 5;
        calving.breeding_id = Some(2);

        let outcome = run(&[unchecked, confirmed], &[calving], &[]);
        assert!(outcome.upserts.is_empty());
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn negative_pd_stops_all_reminders() {
        let mut record = bred(1, 10, 300);
        record.pd_result = PdResult::NotPregnant;
        assert!(run(&[record], &[], &[]).upserts.is_empty());
    }

    #[test]
    fn shifted_due_date_supersedes_unread_row() {
        let original = run(&[bred(1, 10, 50)], &[], &[]);
        let stored = persisted(&original.upserts);

        // Breeding date corrected one day later: PD moves one day later.
        let shifted = run(&[bred(1, 10, 49)], &[], &stored);
        assert_eq!(shifted.upserts.len(), 1);
        assert_eq!(
            shifted.upserts[0].supersedes.as_ref(),
            Some(&stored[0].dedup_key)
        );
    }

    #[test]
    fn read_rows_are_not_superseded() {
        let original = run(&[bred(1, 10, 50)], &[], &[]);
        let mut stored = persisted(&original.upserts);
        stored[0].is_read = true;

        let shifted = run(&[bred(1, 10, 49)], &[], &stored);
        assert_eq!(shifted.upserts.len(), 1);
        assert_eq!(shifted.upserts[0].supersedes, None);
    }

    #[test]
    fn two_open_records_are_ambiguous_and_withheld() {
        let outcome = run(&[bred(1, 10, 50), bred(2, 10, 52), bred(3, 11, 50)], &[], &[]);
        assert_eq!(outcome.upserts.len(), 1);
        assert_eq!(outcome.upserts[0].source_id(), 3);
        assert_eq!(
            outcome.warnings,
            vec![EngineError::AmbiguousState {
                animal_id: 10,
                breeding_ids: vec![1, 2],
            }]
        );
    }

    #[test]
    fn bad_date_is_isolated_to_its_record() {
        let mut broken = bred(1, 10, 50);
        broken.breeding_date = Some("2024-02-31".to_string());
        let outcome = run(&[broken, bred(2, 11, 50)], &[], &[]);
        assert_eq!(outcome.upserts.len(), 1);
        assert_eq!(outcome.upserts[0].source_id(), 2);
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].code(), "invalid_date");
    }

    #[test]
    fn other_users_rows_are_ignored() {
        let mut foreign = bred(1, 10, 50);
        foreign.user_id = 2;
        assert!(run(&[foreign], &[], &[]).upserts.is_empty());
    }

    #[test]
    fn unknown_animal_falls_back_to_id_in_title() {
        let outcome = run(&[bred(1, 77, 50)], &[], &[]);
        assert_eq!(outcome.upserts[0].title, "PD check due for animal #77");
    }
}
