/*!
 * Package database engine.
 *
 * The pipeline only talks to a `PackageEngine`, which exposes the handful of
 * capabilities it needs:
 * - opening a reference database read-only and a target database transacted
 * - generating and stamping a transform between them
 * - assigning a named storage entry
 * - reading and writing string summary properties
 * - committing the target
 *
 * `SqliteEngine` is the file-backed implementation; `MemoryEngine` is an
 * in-memory stand-in with failure injection for tests.
 */

use std::io::Read;
use std::path::Path;

use crate::errors::DatabaseError;

pub mod schema;
pub mod summary;
pub mod connection;
pub mod transform;
pub mod engine;
pub mod memory;

// Re-export main types
pub use connection::{OpenMode, PackageConnection};
pub use engine::SqliteEngine;
pub use memory::{FailurePoint, MemoryEngine, MemoryPackage};
pub use summary::{PropertyValue, SummaryProperty};
pub use transform::{Transform, TransformSummary};

/// Capabilities of a package-database engine
///
/// `reference` is the database whose state the transform produces and
/// `base` the one it applies to; in this tool the base is the target.
pub trait PackageEngine {
    /// Open database handle
    type Database;

    /// Open a database that is only read from
    fn open_read_only(&self, path: &Path) -> Result<Self::Database, DatabaseError>;

    /// Open a database for a transacted session; nothing is visible before `commit`
    fn open_transacted(&self, path: &Path) -> Result<Self::Database, DatabaseError>;

    /// Write the delta turning `base` into `reference` to `transform_path`
    fn generate_delta(
        &self,
        reference: &Self::Database,
        base: &Self::Database,
        transform_path: &Path,
    ) -> Result<(), DatabaseError>;

    /// Stamp the transform with validation information about both databases
    fn create_transform_summary(
        &self,
        reference: &Self::Database,
        base: &Self::Database,
        transform_path: &Path,
    ) -> Result<(), DatabaseError>;

    /// Insert or overwrite the storage entry `name` with `length` bytes read from `data`
    fn assign_storage_entry(
        &self,
        database: &mut Self::Database,
        name: &str,
        data: &mut dyn Read,
        length: u64,
    ) -> Result<(), DatabaseError>;

    /// Read a string summary property; `None` when it is absent
    fn get_string_property(
        &self,
        database: &mut Self::Database,
        property: SummaryProperty,
    ) -> Result<Option<String>, DatabaseError>;

    /// Stage a string summary property
    fn set_string_property(
        &self,
        database: &mut Self::Database,
        property: SummaryProperty,
        value: &str,
    ) -> Result<(), DatabaseError>;

    /// Move staged summary edits into the open transaction
    fn persist_summary(&self, database: &mut Self::Database) -> Result<(), DatabaseError>;

    /// Commit the session; on failure every change is discarded
    fn commit(&self, database: Self::Database) -> Result<(), DatabaseError>;
}
