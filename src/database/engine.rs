/*!
 * SQLite-backed package engine.
 */

use log::{debug, info};
use rusqlite::{DatabaseName, params};
use std::io::Read;
use std::path::Path;

use super::connection::PackageConnection;
use super::schema::STORAGES_TABLE;
use super::summary::SummaryProperty;
use super::transform::{Transform, TransformSummary};
use super::PackageEngine;
use crate::errors::DatabaseError;

/// Engine over package files on disk
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteEngine;

impl SqliteEngine {
    /// Create a new engine
    pub fn new() -> Self {
        Self
    }

    /// Replay a transform file onto a transacted database, validating its stamp first
    pub fn apply_transform(&self, database: &mut PackageConnection, transform_path: &Path) -> Result<(), DatabaseError> {
        database.ensure_writable()?;

        if let Some(summary) = TransformSummary::read_from(transform_path)? {
            summary.validate_base(database.connection())?;
        }
        Transform::read_from(transform_path)?.apply(database.connection())
    }

    /// Read back a storage entry
    pub fn read_storage_entry(&self, database: &PackageConnection, name: &str) -> Result<Option<Vec<u8>>, DatabaseError> {
        use rusqlite::OptionalExtension;

        Ok(database
            .connection()
            .query_row("SELECT Data FROM _Storages WHERE Name = ?1", [name], |row| row.get(0))
            .optional()?)
    }

    /// Names of all storage entries, sorted
    pub fn storage_entry_names(&self, database: &PackageConnection) -> Result<Vec<String>, DatabaseError> {
        let mut stmt = database
            .connection()
            .prepare("SELECT Name FROM _Storages ORDER BY Name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }
}

impl PackageEngine for SqliteEngine {
    type Database = PackageConnection;

    fn open_read_only(&self, path: &Path) -> Result<PackageConnection, DatabaseError> {
        PackageConnection::open_read_only(path)
    }

    fn open_transacted(&self, path: &Path) -> Result<PackageConnection, DatabaseError> {
        PackageConnection::open_transacted(path)
    }

    fn generate_delta(
        &self,
        reference: &PackageConnection,
        base: &PackageConnection,
        transform_path: &Path,
    ) -> Result<(), DatabaseError> {
        debug!(
            "Generating transform {:?} -> {:?}",
            base.path(),
            reference.path()
        );
        let transform = Transform::between(reference.connection(), base.connection())?;
        if transform.is_empty() {
            info!("Databases have identical tables; writing an empty transform");
        }
        transform.write_to(transform_path)
    }

    fn create_transform_summary(
        &self,
        reference: &PackageConnection,
        base: &PackageConnection,
        transform_path: &Path,
    ) -> Result<(), DatabaseError> {
        TransformSummary::describe(reference.connection(), base.connection())?.write_to(transform_path)
    }

    fn assign_storage_entry(
        &self,
        database: &mut PackageConnection,
        name: &str,
        data: &mut dyn Read,
        length: u64,
    ) -> Result<(), DatabaseError> {
        database.ensure_writable()?;
        let conn = database.connection();
        let size = i64::try_from(length).map_err(|_| DatabaseError::Engine {
            status: rusqlite::ffi::SQLITE_TOOBIG,
            message: format!("Storage entry of {} bytes is too large", length),
        })?;

        // Insert-or-overwrite keeps a single row per name
        conn.execute(
            "INSERT INTO _Storages (Name, Data) VALUES (?1, zeroblob(?2)) ON CONFLICT(Name) DO UPDATE SET Data = excluded.Data",
            params![name, size],
        )?;
        let row_id: i64 = conn.query_row("SELECT rowid FROM _Storages WHERE Name = ?1", [name], |row| row.get(0))?;

        let mut blob = conn.blob_open(DatabaseName::Main, STORAGES_TABLE, "Data", row_id, false)?;
        let copied = std::io::copy(&mut data.take(length), &mut blob)?;
        if copied != length {
            return Err(DatabaseError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("expected {} bytes for storage entry {}, read {}", length, name, copied),
            )));
        }

        debug!("Assigned storage entry {} ({} bytes)", name, length);
        Ok(())
    }

    fn get_string_property(
        &self,
        database: &mut PackageConnection,
        property: SummaryProperty,
    ) -> Result<Option<String>, DatabaseError> {
        Ok(database.summary()?.get_text(property)?.map(str::to_string))
    }

    fn set_string_property(
        &self,
        database: &mut PackageConnection,
        property: SummaryProperty,
        value: &str,
    ) -> Result<(), DatabaseError> {
        database.ensure_writable()?;
        database.summary()?.set_text(property, value)
    }

    fn persist_summary(&self, database: &mut PackageConnection) -> Result<(), DatabaseError> {
        database.persist_summary()
    }

    fn commit(&self, database: PackageConnection) -> Result<(), DatabaseError> {
        database.commit()
    }
}
