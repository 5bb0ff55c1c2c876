//! Herdbook schema steps.
//!
//! # Invariants
//! - Steps are numbered `1..=n` without gaps; the number reached is stored in
//!   `PRAGMA user_version`.
//! - A step counts as applied only once every table it owns exists.
//! - All pending steps of one `apply_migrations` call commit together.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::{Connection, OptionalExtension};

struct SchemaStep {
    version: u32,
    name: &'static str,
    sql: &'static str,
    /// Tables the step creates; checked after it runs.
    owns: &'static [&'static str],
}

const STEPS: &[SchemaStep] = &[
    SchemaStep {
        version: 1,
        name: "herd_records",
        sql: include_str!("0001_herd_records.sql"),
        owns: &["animals", "breeding_records", "calvings"],
    },
    SchemaStep {
        version: 2,
        name: "notifications",
        sql: include_str!("0002_notifications.sql"),
        owns: &["notifications"],
    },
];

/// Schema version a fully migrated herdbook database reports.
pub fn latest_version() -> u32 {
    STEPS.last().map_or(0, |step| step.version)
}

/// Reads `PRAGMA user_version` from `conn`.
pub fn schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
}

/// Brings `conn` up to [`latest_version`].
///
/// A database newer than this binary is refused rather than downgraded.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let from = schema_version(conn)?;
    let latest = latest_version();
    if from > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: from,
            latest_supported: latest,
        });
    }
    if from == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for step in STEPS.iter().filter(|step| step.version > from) {
        tx.execute_batch(step.sql)?;
        if let Some(table) = first_missing_table(&tx, step.owns)? {
            return Err(DbError::IncompleteMigration {
                version: step.version,
                name: step.name,
                missing_table: table,
            });
        }
        tx.execute_batch(&format!("PRAGMA user_version = {};", step.version))?;
        info!(
            "event=db_migrate module=db status=ok version={} step={}",
            step.version, step.name
        );
    }
    tx.commit()?;

    info!("event=db_migrate module=db status=done from_version={from} to_version={latest}");
    Ok(())
}

fn first_missing_table(
    conn: &Connection,
    tables: &[&'static str],
) -> rusqlite::Result<Option<&'static str>> {
    for &table in tables {
        let found = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1;",
                [table],
                |_| Ok(()),
            )
            .optional()?;
        if found.is_none() {
            return Ok(Some(table));
        }
    }
    Ok(None)
}
