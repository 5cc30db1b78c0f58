use rusqlite::{Connection, ErrorCode};
use std::path::Path;
use std::thread;
use std::time::Duration;

use super::backup::Backup;
use super::result::OperationResult;
use crate::common::errors::{ErrorKind, ResetError, ResetResult};
use crate::ides::IdeDescriptor;

/// Attempts made while the database is locked
const LOCK_ATTEMPTS: u32 = 5;
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(200);
const BUSY_TIMEOUT: Duration = Duration::from_secs(1);

/// Columns searched for the vendor marker
const MATCH_COLUMNS: &[&str] = &["key", "value"];

/// Deletes vendor rows from an editor's `state.vscdb`
pub struct DatabaseCleaner<'a> {
    backup: &'a dyn Backup,
    marker: String,
}

impl<'a> DatabaseCleaner<'a> {
    pub fn new(backup: &'a dyn Backup, marker: &str) -> Self {
        Self {
            backup,
            marker: marker.trim().to_lowercase(),
        }
    }

    pub fn clean(&self, ide: &IdeDescriptor) -> OperationResult {
        // An empty marker would match every row
        if self.marker.is_empty() {
            return OperationResult::failed(
                "Vendor marker is empty; refusing to clean the database",
                ErrorKind::Unexpected,
                "vendor_marker must not be empty",
            );
        }
        let Some(db_path) = ide.db_path.as_deref() else {
            return OperationResult::failed(
                format!("Database not found for {}", ide.display_name),
                ErrorKind::NotFound,
                "db_path is not set",
            );
        };

        let record = match self.backup.backup(db_path) {
            Ok(record) => record,
            Err(e) => {
                return OperationResult::from_error("Backup failed; database left unchanged", &e)
            }
        };

        match self.delete_with_retry(db_path) {
            Ok(rows) => {
                tracing::info!(
                    "Deleted {} rows matching '{}' from {}",
                    rows,
                    self.marker,
                    db_path.display()
                );
                OperationResult::ok(format!(
                    "Removed {} matching records from {}",
                    rows, ide.display_name
                ))
                .with("rows_deleted", rows)
                .with("db_path", db_path)
                .with("db_backup", &record.backup_path)
            }
            Err(e) => OperationResult::from_error(
                format!("Could not clean the database of {}", ide.display_name),
                &e,
            )
            .with("db_backup", &record.backup_path),
        }
    }

    fn delete_with_retry(&self, db_path: &Path) -> ResetResult<usize> {
        let mut attempt = 1;
        loop {
            match self.delete_matching(db_path) {
                Err(e) if is_locked(&e) && attempt < LOCK_ATTEMPTS => {
                    tracing::debug!(
                        "{} is locked (attempt {}/{}), retrying",
                        db_path.display(),
                        attempt,
                        LOCK_ATTEMPTS
                    );
                    attempt += 1;
                    thread::sleep(LOCK_RETRY_DELAY);
                }
                Err(e) if is_locked(&e) => {
                    return Err(ResetError::ResourceBusy {
                        path: db_path.to_path_buf(),
                        message: format!(
                            "database still locked after {} attempts; close the IDE and retry",
                            LOCK_ATTEMPTS
                        ),
                    })
                }
                Err(e) => {
                    return Err(ResetError::unexpected(
                        format!("clean database '{}'", db_path.display()),
                        e,
                    ))
                }
                Ok(rows) => return Ok(rows),
            }
        }
    }

    fn delete_matching(&self, db_path: &Path) -> rusqlite::Result<usize> {
        let mut conn = Connection::open(db_path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        let tx = conn.transaction()?;
        let mut deleted = 0;
        for table in user_tables(&tx)? {
            let columns = matching_columns(&tx, &table)?;
            if columns.is_empty() {
                continue;
            }
            let predicate = columns
                .iter()
                .map(|c| format!("instr(lower(CAST({} AS TEXT)), ?1) > 0", quote_ident(c)))
                .collect::<Vec<_>>()
                .join(" OR ");
            let sql = format!("DELETE FROM {} WHERE {}", quote_ident(&table), predicate);
            deleted += tx.execute(&sql, [&self.marker])?;
        }
        tx.commit()?;
        Ok(deleted)
    }
}

fn user_tables(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names)
}

fn matching_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(columns
        .into_iter()
        .filter(|c| MATCH_COLUMNS.iter().any(|m| m.eq_ignore_ascii_case(c)))
        .collect())
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn is_locked(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}
