use herdbook_core::db::open_db_in_memory;
use herdbook_core::{
    Animal, BreedingMethod, BreedingRecord, Calving, CalvingRegistration, PdResult,
    RecordService, RecordServiceError, RecordStore, RepoError, Sex, SqliteRecordRepository,
    StatusOverride,
};

const USER: i64 = 1;
const OTHER_USER: i64 = 2;

#[test]
fn animals_are_scoped_by_user_and_tags_are_normalized() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRecordRepository::try_new(&conn).unwrap();

    let id = repo
        .insert_animal(&Animal::new(USER, "  NL 1042 ", Sex::Female))
        .unwrap();
    repo.insert_animal(&Animal::new(OTHER_USER, "NL-1042", Sex::Female))
        .unwrap();

    let animal = repo.get_animal(USER, id).unwrap().unwrap();
    assert_eq!(animal.ear_tag, "NL-1042");
    assert_eq!(animal.status_override, StatusOverride::None);
    assert!(repo.get_animal(OTHER_USER, id).unwrap().is_none());
    assert_eq!(repo.list_animals(USER).unwrap().len(), 1);
}

#[test]
fn duplicate_ear_tag_in_one_herd_is_a_conflict() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRecordRepository::try_new(&conn).unwrap();

    repo.insert_animal(&Animal::new(USER, "1042", Sex::Female))
        .unwrap();
    let err = repo
        .insert_animal(&Animal::new(USER, "1042", Sex::Male))
        .unwrap_err();
    assert!(matches!(err, RepoError::Conflict(_)), "{err}");
}

#[test]
fn invalid_ear_tag_is_rejected_before_storage() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRecordRepository::try_new(&conn).unwrap();

    let err = repo
        .insert_animal(&Animal::new(USER, "tag#1", Sex::Female))
        .unwrap_err();
    assert!(matches!(err, RepoError::Validation(_)));
    assert!(repo.list_animals(USER).unwrap().is_empty());
}

#[test]
fn parents_must_belong_to_the_same_herd() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRecordRepository::try_new(&conn).unwrap();

    let foreign_dam = repo
        .insert_animal(&Animal::new(OTHER_USER, "900", Sex::Female))
        .unwrap();
    let mut calf = Animal::new(USER, "901", Sex::Female);
    calf.dam_id = Some(foreign_dam);
    let err = repo.insert_animal(&calf).unwrap_err();
    assert!(matches!(err, RepoError::Conflict(_)));

    let breeding = BreedingRecord::new(USER, foreign_dam, "2024-01-01", BreedingMethod::Natural);
    let err = repo.insert_breeding_record(&breeding).unwrap_err();
    assert!(matches!(err, RepoError::Conflict(_)));
}

#[test]
fn pd_result_updates_confirmation_flag() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRecordRepository::try_new(&conn).unwrap();
    let dam = repo
        .insert_animal(&Animal::new(USER, "1042", Sex::Female))
        .unwrap();
    let breeding_id = repo
        .insert_breeding_record(&BreedingRecord::new(
            USER,
            dam,
            "2024-01-01",
            BreedingMethod::ArtificialInsemination,
        ))
        .unwrap();

    let stored = repo.get_breeding_record(USER, breeding_id).unwrap().unwrap();
    assert_eq!(stored.pd_result, PdResult::Unchecked);
    assert_eq!(stored.method, BreedingMethod::ArtificialInsemination);
    assert!(stored.created_at > 0);

    repo.update_pd_result(USER, breeding_id, PdResult::Pregnant, Some("2024-02-25"))
        .unwrap();
    let stored = repo.get_breeding_record(USER, breeding_id).unwrap().unwrap();
    assert!(stored.confirmed_pregnant);
    assert!(stored.is_confirmed_pregnant());
    assert_eq!(stored.pd_check_date.as_deref(), Some("2024-02-25"));

    repo.update_pd_result(USER, breeding_id, PdResult::NotPregnant, Some("2024-03-01"))
        .unwrap();
    let stored = repo.get_breeding_record(USER, breeding_id).unwrap().unwrap();
    assert!(!stored.confirmed_pregnant);
    assert!(stored.is_negative());

    let err = repo
        .update_pd_result(OTHER_USER, breeding_id, PdResult::Pregnant, None)
        .unwrap_err();
    assert!(matches!(err, RepoError::NotFound { .. }));
}

#[test]
fn flag_for_review_reports_first_flag_only() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRecordRepository::try_new(&conn).unwrap();
    let dam = repo
        .insert_animal(&Animal::new(USER, "1042", Sex::Female))
        .unwrap();
    let breeding_id = repo
        .insert_breeding_record(&BreedingRecord::new(
            USER,
            dam,
            "2024-01-01",
            BreedingMethod::Natural,
        ))
        .unwrap();

    assert!(repo.flag_breeding_for_review(USER, breeding_id).unwrap());
    assert!(!repo.flag_breeding_for_review(USER, breeding_id).unwrap());
    assert!(repo
        .get_breeding_record(USER, breeding_id)
        .unwrap()
        .unwrap()
        .needs_review);

    let err = repo.flag_breeding_for_review(USER, 9999).unwrap_err();
    assert!(matches!(err, RepoError::NotFound { .. }));
}

#[test]
fn register_calving_spawns_calf_with_both_parents() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRecordRepository::try_new(&conn).unwrap();
    let service = RecordService::new(SqliteRecordRepository::try_new(&conn).unwrap());

    let dam = repo
        .insert_animal(&Animal::new(USER, "1042", Sex::Female))
        .unwrap();
    let sire = repo
        .insert_animal(&Animal::new(USER, "B-7", Sex::Male))
        .unwrap();
    let mut breeding = BreedingRecord::new(USER, dam, "2024-01-01", BreedingMethod::Natural);
    breeding.sire_id = Some(sire);
    let breeding_id = service.record_breeding(&breeding).unwrap();

    let mut calving = Calving::new(USER, dam, "2024-10-05");
    calving.breeding_id = Some(breeding_id);
    calving.calf_ear_tag = Some(" 1043 ".to_string());
    calving.calf_sex = Some(Sex::Female);
    calving.calf_weight_kg = Some(41.5);

    let CalvingRegistration {
        calving_id,
        calf_id,
    } = service.register_calving(&calving).unwrap();
    let calf = repo.get_animal(USER, calf_id.unwrap()).unwrap().unwrap();
    assert_eq!(calf.ear_tag, "1043");
    assert_eq!(calf.dam_id, Some(dam));
    assert_eq!(calf.sire_id, Some(sire));
    assert_eq!(calf.birth_date.as_deref(), Some("2024-10-05"));

    let calvings = repo.list_calvings(USER).unwrap();
    assert_eq!(calvings.len(), 1);
    assert_eq!(calvings[0].id, calving_id);
    assert_eq!(calvings[0].breeding_id, Some(breeding_id));
    assert_eq!(calvings[0].calf_weight_kg, Some(41.5));
}

#[test]
fn calving_without_calf_tag_spawns_nothing() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRecordRepository::try_new(&conn).unwrap();
    let service = RecordService::new(SqliteRecordRepository::try_new(&conn).unwrap());
    let dam = repo
        .insert_animal(&Animal::new(USER, "1042", Sex::Female))
        .unwrap();

    let mut calving = Calving::new(USER, dam, "2024-10-05");
    calving.calf_ear_tag = Some("   ".to_string());
    let registration = service.register_calving(&calving).unwrap();

    assert!(registration.calf_id.is_none());
    assert_eq!(repo.list_animals(USER).unwrap().len(), 1);
}

#[test]
fn failed_calf_spawn_rolls_back_the_calving() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRecordRepository::try_new(&conn).unwrap();
    let service = RecordService::new(SqliteRecordRepository::try_new(&conn).unwrap());
    let dam = repo
        .insert_animal(&Animal::new(USER, "1042", Sex::Female))
        .unwrap();
    repo.insert_animal(&Animal::new(USER, "1043", Sex::Male))
        .unwrap();

    let mut calving = Calving::new(USER, dam, "2024-10-05");
    calving.calf_ear_tag = Some("1043".to_string());
    calving.calf_sex = Some(Sex::Male);
    let err = service.register_calving(&calving).unwrap_err();

    assert!(matches!(err, RecordServiceError::Repo(RepoError::Conflict(_))));
    assert!(repo.list_calvings(USER).unwrap().is_empty());
}

#[test]
fn calving_rejects_bad_input() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRecordRepository::try_new(&conn).unwrap();
    let service = RecordService::new(SqliteRecordRepository::try_new(&conn).unwrap());
    let dam = repo
        .insert_animal(&Animal::new(USER, "1042", Sex::Female))
        .unwrap();
    let bull = repo
        .insert_animal(&Animal::new(USER, "B-7", Sex::Male))
        .unwrap();

    let bad_date = Calving::new(USER, dam, "2024-02-30");
    assert!(matches!(
        service.register_calving(&bad_date).unwrap_err(),
        RecordServiceError::InvalidDate {
            field: "calving_date",
            ..
        }
    ));

    let male = Calving::new(USER, bull, "2024-10-05");
    assert!(matches!(
        service.register_calving(&male).unwrap_err(),
        RecordServiceError::NotFemale(id) if id == bull
    ));

    let mut unknown_link = Calving::new(USER, dam, "2024-10-05");
    unknown_link.breeding_id = Some(77);
    assert!(matches!(
        service.register_calving(&unknown_link).unwrap_err(),
        RecordServiceError::UnknownBreedingRecord(77)
    ));

    let mut sexless_calf = Calving::new(USER, dam, "2024-10-05");
    sexless_calf.calf_ear_tag = Some("1050".to_string());
    assert!(matches!(
        service.register_calving(&sexless_calf).unwrap_err(),
        RecordServiceError::MissingCalfSex
    ));
}

#[test]
fn calving_linked_to_another_dams_breeding_is_a_conflict() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRecordRepository::try_new(&conn).unwrap();
    let first = repo
        .insert_animal(&Animal::new(USER, "1042", Sex::Female))
        .unwrap();
    let second = repo
        .insert_animal(&Animal::new(USER, "1044", Sex::Female))
        .unwrap();
    let breeding_id = repo
        .insert_breeding_record(&BreedingRecord::new(
            USER,
            first,
            "2024-01-01",
            BreedingMethod::Natural,
        ))
        .unwrap();

    let mut calving = Calving::new(USER, second, "2024-10-05");
    calving.breeding_id = Some(breeding_id);
    let err = repo.insert_calving(&calving).unwrap_err();
    assert!(matches!(err, RepoError::Conflict(_)));
}
