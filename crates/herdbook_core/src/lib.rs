//! Reproductive-cycle engine for dairy herd records.
//!
//! Derives each animal's reproductive status, computes breeding due dates and
//! reconciles scheduled reminders against stored notifications. The engine
//! (`calendar`, `engine`) is pure; `repo` and `service` wire it to SQLite.

pub mod calendar;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use calendar::{add_days, days_between, format_date, is_within, parse_date, DateError};
pub use config::{ConfigError, EngineConfig, CONFIG_PATH_ENV, GESTATION_DAYS_CATTLE};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use engine::due_dates::{compute_due_dates, DueDates};
pub use engine::reconcile::{reconcile, ReconcileInput, ReconcileOutcome};
pub use engine::status::{derive_herd, derive_status, StatusOutcome};
pub use error::{EngineError, EngineResult, RecordRef};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::animal::{Animal, AnimalId, LifecycleStatus, Sex};
pub use model::breeding::{BreedingId, BreedingMethod, BreedingRecord, PdResult};
pub use model::calving::{Calving, CalvingId};
pub use model::notification::{
    DedupKey, Notification, NotificationId, NotificationKind, NotificationUpsert,
};
pub use model::status::{DerivedStatus, ReproductiveStatus, StatusCategory, StatusOverride};
pub use model::UserId;
pub use repo::notification_repo::{
    NotificationPageQuery, NotificationStore, SqliteNotificationRepository, UpsertOutcome,
};
pub use repo::record_repo::{RecordStore, SqliteRecordRepository};
pub use repo::{RepoError, RepoResult};
pub use service::reconcile_service::{
    HerdStatusRow, ReconcileReport, ReconcileService, ReconcileServiceError,
};
pub use service::record_service::{CalvingRegistration, RecordService, RecordServiceError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
