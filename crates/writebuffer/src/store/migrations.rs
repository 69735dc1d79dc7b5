//! Schema versioning for the local store.
//!
//! The stored `schema_version` plays the role of the local database version:
//! object stores are provisioned only when the database is new or when the
//! version increases, and an on-disk version newer than this build
//! understands is refused.

use rusqlite::Connection;
use tracing::info;

use crate::error::{Error, Result};

use super::schema::{BASE_STATEMENTS, CREATE_PENDING_TABLE};

/// The current schema version.
pub const CURRENT_VERSION: i32 = 1;

/// Key used to store the schema version in the metadata table.
const VERSION_KEY: &str = "schema_version";

/// Initialize the database schema.
///
/// Creates the metadata table if needed, then upgrades the database to
/// [`CURRENT_VERSION`]. Running this against an up-to-date database makes no
/// structural change.
///
/// # Errors
///
/// Returns an error if schema creation fails, a migration fails, or the
/// database was written by a newer schema version.
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    for statement in BASE_STATEMENTS {
        conn.execute(statement, [])?;
    }

    let version = get_schema_version(conn)?;
    if version > CURRENT_VERSION {
        return Err(Error::DatabaseMigration {
            message: format!(
                "database schema version {version} is newer than supported version {CURRENT_VERSION}"
            ),
        });
    }
    if version < CURRENT_VERSION {
        info!(from = version, to = CURRENT_VERSION, "Upgrading local store");
        run_migrations(conn, version)?;
    }

    Ok(())
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (fresh database).
pub(crate) fn get_schema_version(conn: &Connection) -> Result<i32> {
    let result: std::result::Result<String, rusqlite::Error> = conn.query_row(
        "SELECT value FROM metadata WHERE key = ?1",
        [VERSION_KEY],
        |row| row.get(0),
    );

    match result {
        Ok(value) => value.parse().map_err(|_| Error::DatabaseMigration {
            message: format!("invalid schema version: {value}"),
        }),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
        Err(e) => Err(e.into()),
    }
}

/// Set the schema version in the database.
pub(crate) fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
        (VERSION_KEY, version.to_string()),
    )?;
    Ok(())
}

/// Run migrations from the given version to the current version.
///
/// All steps run in one transaction so a failed upgrade leaves the previous
/// version intact.
fn run_migrations(conn: &Connection, from_version: i32) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    let mut current = from_version;

    while current < CURRENT_VERSION {
        current += 1;
        run_migration(&tx, current)?;
    }

    set_schema_version(&tx, CURRENT_VERSION)?;
    tx.commit()?;
    Ok(())
}

/// Run a specific migration version.
fn run_migration(conn: &Connection, version: i32) -> Result<()> {
    match version {
        1 => migrate_v1(conn),
        _ => Err(Error::DatabaseMigration {
            message: format!("unknown migration version: {version}"),
        }),
    }
}

/// Migration to version 1: provision the pending records object store.
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute(CREATE_PENDING_TABLE, [])?;
    Ok(())
}
