/*!
 * In-memory package engine for testing.
 *
 * Packages live in a map keyed by path. A transacted handle works on a
 * private copy that replaces the stored package only on a successful commit,
 * which gives the same all-or-nothing behavior as the file engine. Any
 * capability can be made to fail with `MemoryEngine::fail_at`.
 */

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::summary::{PropertyValue, SummaryProperty};
use super::PackageEngine;
use crate::errors::{DatabaseError, STATUS_FUNCTION_FAILED};

/// Status used for injected failures
pub const SIMULATED_FAILURE_STATUS: i32 = STATUS_FUNCTION_FAILED;

/// Magic prefix of transforms written by the memory engine
pub const MEMORY_TRANSFORM_MAGIC: &[u8] = b"MEMXFRM\n";

/// Capability that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePoint {
    OpenReadOnly,
    OpenTransacted,
    GenerateDelta,
    TransformSummary,
    AssignStorage,
    GetProperty,
    SetProperty,
    PersistSummary,
    Commit,
}

/// Package contents held by the memory engine
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryPackage {
    /// Stand-in for the relational tables
    pub content: Vec<u8>,
    pub storages: BTreeMap<String, Vec<u8>>,
    pub summary: BTreeMap<SummaryProperty, PropertyValue>,
}

impl MemoryPackage {
    /// Package with the given table content and language template
    pub fn new(content: &[u8], template: Option<&str>) -> Self {
        let mut package = Self {
            content: content.to_vec(),
            ..Self::default()
        };
        if let Some(template) = template {
            package
                .summary
                .insert(SummaryProperty::Template, PropertyValue::Text(template.to_string()));
        }
        package
    }

    /// Text of the language template, if set
    pub fn template(&self) -> Option<&str> {
        self.summary.get(&SummaryProperty::Template).and_then(PropertyValue::as_text)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    packages: HashMap<PathBuf, MemoryPackage>,
    locked: HashSet<PathBuf>,
    fail_at: Option<FailurePoint>,
    calls: Vec<&'static str>,
}

/// Engine keeping packages in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryEngine {
    state: Arc<Mutex<MemoryState>>,
}

/// Open handle of the memory engine
#[derive(Debug)]
pub struct MemoryDatabase {
    path: PathBuf,
    writable: bool,
    working: MemoryPackage,
    staged: BTreeMap<SummaryProperty, PropertyValue>,
    state: Arc<Mutex<MemoryState>>,
}

impl Drop for MemoryDatabase {
    fn drop(&mut self) {
        if self.writable {
            lock(&self.state).locked.remove(&self.path);
        }
    }
}

fn lock(state: &Mutex<MemoryState>) -> MutexGuard<'_, MemoryState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryEngine {
    /// Create an engine with no packages
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a package at a path, replacing any existing one
    pub fn insert_package<P: AsRef<Path>>(&self, path: P, package: MemoryPackage) {
        lock(&self.state).packages.insert(path.as_ref().to_path_buf(), package);
    }

    /// Committed state of a package
    pub fn package<P: AsRef<Path>>(&self, path: P) -> Option<MemoryPackage> {
        lock(&self.state).packages.get(path.as_ref()).cloned()
    }

    /// Make a capability fail from now on
    pub fn fail_at(&self, point: FailurePoint) {
        lock(&self.state).fail_at = Some(point);
    }

    /// Capabilities invoked so far, in order
    pub fn calls(&self) -> Vec<&'static str> {
        lock(&self.state).calls.clone()
    }

    fn enter(&self, call: &'static str, point: FailurePoint) -> Result<(), DatabaseError> {
        let mut state = lock(&self.state);
        state.calls.push(call);
        if state.fail_at == Some(point) {
            return Err(DatabaseError::Engine {
                status: SIMULATED_FAILURE_STATUS,
                message: format!("simulated failure at {}", call),
            });
        }
        Ok(())
    }

    fn open(&self, path: &Path, writable: bool) -> Result<MemoryDatabase, DatabaseError> {
        let mut state = lock(&self.state);
        let package = state.packages.get(path).cloned().ok_or_else(|| DatabaseError::Engine {
            status: rusqlite::ffi::SQLITE_CANTOPEN,
            message: format!("unable to open database file {:?}", path),
        })?;

        if writable && !state.locked.insert(path.to_path_buf()) {
            return Err(DatabaseError::Engine {
                status: rusqlite::ffi::SQLITE_BUSY,
                message: "database is locked".to_string(),
            });
        }

        Ok(MemoryDatabase {
            path: path.to_path_buf(),
            writable,
            working: package,
            staged: BTreeMap::new(),
            state: Arc::clone(&self.state),
        })
    }
}

fn ensure_writable(database: &MemoryDatabase) -> Result<(), DatabaseError> {
    if !database.writable {
        return Err(DatabaseError::ReadOnly(database.path.clone()));
    }
    Ok(())
}

impl PackageEngine for MemoryEngine {
    type Database = MemoryDatabase;

    fn open_read_only(&self, path: &Path) -> Result<MemoryDatabase, DatabaseError> {
        self.enter("open_read_only", FailurePoint::OpenReadOnly)?;
        self.open(path, false)
    }

    fn open_transacted(&self, path: &Path) -> Result<MemoryDatabase, DatabaseError> {
        self.enter("open_transacted", FailurePoint::OpenTransacted)?;
        self.open(path, true)
    }

    fn generate_delta(
        &self,
        reference: &MemoryDatabase,
        _base: &MemoryDatabase,
        transform_path: &Path,
    ) -> Result<(), DatabaseError> {
        self.enter("generate_delta", FailurePoint::GenerateDelta)?;

        if std::fs::metadata(transform_path).is_ok_and(|m| m.len() > 0) {
            return Err(DatabaseError::OutputExists(transform_path.to_path_buf()));
        }

        let mut bytes = MEMORY_TRANSFORM_MAGIC.to_vec();
        bytes.extend_from_slice(&reference.working.content);
        std::fs::write(transform_path, bytes)?;
        Ok(())
    }

    fn create_transform_summary(
        &self,
        _reference: &MemoryDatabase,
        _base: &MemoryDatabase,
        transform_path: &Path,
    ) -> Result<(), DatabaseError> {
        self.enter("create_transform_summary", FailurePoint::TransformSummary)?;

        let bytes = std::fs::read(transform_path)?;
        if !bytes.starts_with(MEMORY_TRANSFORM_MAGIC) {
            return Err(DatabaseError::InvalidTransform(format!(
                "{:?} is not a transform file",
                transform_path
            )));
        }
        Ok(())
    }

    fn assign_storage_entry(
        &self,
        database: &mut MemoryDatabase,
        name: &str,
        data: &mut dyn Read,
        length: u64,
    ) -> Result<(), DatabaseError> {
        self.enter("assign_storage_entry", FailurePoint::AssignStorage)?;
        ensure_writable(database)?;

        let mut bytes = Vec::new();
        data.take(length).read_to_end(&mut bytes)?;
        database.working.storages.insert(name.to_string(), bytes);
        Ok(())
    }

    fn get_string_property(
        &self,
        database: &mut MemoryDatabase,
        property: SummaryProperty,
    ) -> Result<Option<String>, DatabaseError> {
        self.enter("get_string_property", FailurePoint::GetProperty)?;

        let value = database
            .staged
            .get(&property)
            .or_else(|| database.working.summary.get(&property));
        match value {
            None => Ok(None),
            Some(PropertyValue::Text(text)) => Ok(Some(text.clone())),
            Some(other) => Err(DatabaseError::TypeMismatch {
                property: property.id(),
                found: other.type_name(),
            }),
        }
    }

    fn set_string_property(
        &self,
        database: &mut MemoryDatabase,
        property: SummaryProperty,
        value: &str,
    ) -> Result<(), DatabaseError> {
        self.enter("set_string_property", FailurePoint::SetProperty)?;
        ensure_writable(database)?;

        if let Some(existing) = database.working.summary.get(&property) {
            if existing.as_text().is_none() {
                return Err(DatabaseError::TypeMismatch {
                    property: property.id(),
                    found: existing.type_name(),
                });
            }
        }
        database.staged.insert(property, PropertyValue::Text(value.to_string()));
        Ok(())
    }

    fn persist_summary(&self, database: &mut MemoryDatabase) -> Result<(), DatabaseError> {
        self.enter("persist_summary", FailurePoint::PersistSummary)?;
        ensure_writable(database)?;

        let staged = std::mem::take(&mut database.staged);
        database.working.summary.extend(staged);
        Ok(())
    }

    fn commit(&self, mut database: MemoryDatabase) -> Result<(), DatabaseError> {
        self.enter("commit", FailurePoint::Commit)?;
        ensure_writable(&database)?;

        let committed = std::mem::take(&mut database.working);
        lock(&self.state).packages.insert(database.path.clone(), committed);
        Ok(())
    }
}
