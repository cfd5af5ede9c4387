/*!
 * Package database connection management.
 *
 * A `PackageConnection` is either read-only or transacted. A transacted
 * connection takes the write lock immediately (`BEGIN IMMEDIATE`) and keeps
 * one transaction open until `commit`; dropping it uncommitted rolls back.
 */

use log::{debug, info, warn};
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::schema;
use super::summary::SummaryInfo;
use crate::errors::DatabaseError;

/// How a package is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Reference database; never written
    ReadOnly,
    /// Writable database; changes land only on commit
    Transacted,
}

/// Open package database
pub struct PackageConnection {
    /// Path to the package file
    path: PathBuf,
    mode: OpenMode,
    conn: Connection,
    /// Whether the write transaction is still open
    in_transaction: bool,
    /// Header view, loaded on first use
    summary: Option<SummaryInfo>,
}

impl PackageConnection {
    /// Open an existing package read-only
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self, DatabaseError> {
        let path = path.as_ref().to_path_buf();
        debug!("Opening package read-only: {:?}", path);

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        Self::verify(&conn, &path)?;

        Ok(Self {
            path,
            mode: OpenMode::ReadOnly,
            conn,
            in_transaction: false,
            summary: None,
        })
    }

    /// Open an existing package for a transacted session
    pub fn open_transacted<P: AsRef<Path>>(path: P) -> Result<Self, DatabaseError> {
        let path = path.as_ref().to_path_buf();
        debug!("Opening package transacted: {:?}", path);

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        // A second writer fails instead of waiting for the lock
        conn.busy_timeout(Duration::ZERO)?;

        Self::begin(conn, path)
    }

    /// Create a new, empty package and open it transacted
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, DatabaseError> {
        let path = path.as_ref().to_path_buf();
        info!("Creating package at: {:?}", path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&path)?;
        schema::initialize_package(&conn)?;

        Self::begin(conn, path)
    }

    fn begin(conn: Connection, path: PathBuf) -> Result<Self, DatabaseError> {
        Self::verify(&conn, &path)?;

        // Takes the write lock now so a concurrent writer fails at open time
        conn.execute_batch("BEGIN IMMEDIATE")?;

        Ok(Self {
            path,
            mode: OpenMode::Transacted,
            conn,
            in_transaction: true,
            summary: None,
        })
    }

    fn verify(conn: &Connection, path: &Path) -> Result<(), DatabaseError> {
        if !schema::is_package(conn)? {
            return Err(DatabaseError::NotAPackage(path.to_path_buf()));
        }
        Ok(())
    }

    /// Get the package file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the open mode
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Borrow the underlying SQLite connection
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Fail unless the connection may write
    pub fn ensure_writable(&self) -> Result<(), DatabaseError> {
        if self.mode != OpenMode::Transacted || !self.in_transaction {
            return Err(DatabaseError::ReadOnly(self.path.clone()));
        }
        Ok(())
    }

    /// Header view with staged edits, loaded on first use
    pub fn summary(&mut self) -> Result<&mut SummaryInfo, DatabaseError> {
        let summary = match self.summary.take() {
            Some(summary) => summary,
            None => SummaryInfo::load(&self.conn)?,
        };
        Ok(self.summary.insert(summary))
    }

    /// Write staged header edits into the open transaction
    pub fn persist_summary(&mut self) -> Result<(), DatabaseError> {
        self.ensure_writable()?;
        if let Some(summary) = self.summary.as_mut() {
            summary.persist(&self.conn)?;
        }
        Ok(())
    }

    /// Commit the transaction; the single point of durability
    pub fn commit(mut self) -> Result<(), DatabaseError> {
        self.ensure_writable()?;

        if self.summary.as_ref().is_some_and(SummaryInfo::is_dirty) {
            warn!("Committing {:?} with unpersisted summary changes; they are discarded", self.path);
        }

        self.conn.execute_batch("COMMIT")?;
        self.in_transaction = false;
        info!("Committed package: {:?}", self.path);
        Ok(())
    }
}

impl Drop for PackageConnection {
    fn drop(&mut self) {
        if self.in_transaction {
            debug!("Rolling back uncommitted session on {:?}", self.path);
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                warn!("Rollback of {:?} failed: {}", self.path, e);
            }
        }
    }
}
