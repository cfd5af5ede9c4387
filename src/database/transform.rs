/*!
 * Transform generation, stamping and application.
 *
 * A transform is the table- and row-level delta that turns a base package
 * into a reference package. On disk it is itself a SQLite file with three
 * tables:
 * - `_TransformInfo`: the summary stamp (fingerprints, language lists, flags)
 * - `_TransformTables`: tables to add, drop or alter
 * - `_TransformRows`: rows to insert, update or delete, keyed by primary key
 */

use chrono::Utc;
use log::{debug, info};
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;

use super::schema::{self, CellValue, ColumnDef, TableSchema, quote_identifier};
use super::summary::{SummaryInfo, SummaryProperty};
use crate::errors::DatabaseError;

/// Format version written into every transform
pub const TRANSFORM_FORMAT_VERSION: i64 = 1;

/// Validation flag: refuse to apply onto a base whose content changed
pub const VALIDATE_BASE_FINGERPRINT: u32 = 0x0001;

/// Table-level change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableAction {
    Add,
    Drop,
    /// Append columns to an existing table
    Alter,
}

impl TableAction {
    fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Drop => "drop",
            Self::Alter => "alter",
        }
    }

    fn parse(value: &str) -> Result<Self, DatabaseError> {
        match value {
            "add" => Ok(Self::Add),
            "drop" => Ok(Self::Drop),
            "alter" => Ok(Self::Alter),
            other => Err(DatabaseError::InvalidTransform(format!("unknown table action {:?}", other))),
        }
    }
}

/// Row-level change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowAction {
    Insert,
    Update,
    Delete,
}

impl RowAction {
    fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    fn parse(value: &str) -> Result<Self, DatabaseError> {
        match value {
            "insert" => Ok(Self::Insert),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(DatabaseError::InvalidTransform(format!("unknown row action {:?}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableChange {
    pub table: String,
    pub action: TableAction,
    /// Full layout for `Add`, appended columns for `Alter`, empty for `Drop`
    pub columns: Vec<ColumnDef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowChange {
    pub table: String,
    pub action: RowAction,
    /// Primary key values in key order
    pub key: Vec<CellValue>,
    /// Column values; all columns for inserts, changed columns for updates
    pub data: BTreeMap<String, CellValue>,
}

/// Delta between two packages
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transform {
    pub tables: Vec<TableChange>,
    pub rows: Vec<RowChange>,
}

impl Transform {
    /// Compute the delta turning `base` into `reference`
    pub fn between(reference: &Connection, base: &Connection) -> Result<Self, DatabaseError> {
        let reference_tables = schema::user_tables(reference)?;
        let base_tables = schema::user_tables(base)?;
        let mut transform = Transform::default();

        for name in base_tables.iter().filter(|name| !reference_tables.contains(name)) {
            debug!("Table {} dropped", name);
            transform.tables.push(TableChange {
                table: name.clone(),
                action: TableAction::Drop,
                columns: Vec::new(),
            });
        }

        for name in &reference_tables {
            let reference_schema = TableSchema::load(reference, name)?;
            require_primary_key(&reference_schema)?;

            if !base_tables.contains(name) {
                debug!("Table {} added", name);
                transform.tables.push(TableChange {
                    table: name.clone(),
                    action: TableAction::Add,
                    columns: reference_schema.columns.clone(),
                });
                for row in reference_schema.read_rows(reference)?.into_values() {
                    transform.rows.push(insert_change(&reference_schema, row));
                }
                continue;
            }

            let base_schema = TableSchema::load(base, name)?;
            require_primary_key(&base_schema)?;
            let added = added_columns(&reference_schema, &base_schema)?;
            if !added.is_empty() {
                debug!("Table {} gains {} column(s)", name, added.len());
                transform.tables.push(TableChange {
                    table: name.clone(),
                    action: TableAction::Alter,
                    columns: added,
                });
            }

            transform.diff_rows(&reference_schema, reference, &base_schema, base)?;
        }

        info!(
            "Computed transform: {} table change(s), {} row change(s)",
            transform.tables.len(),
            transform.rows.len()
        );
        Ok(transform)
    }

    fn diff_rows(
        &mut self,
        reference_schema: &TableSchema,
        reference: &Connection,
        base_schema: &TableSchema,
        base: &Connection,
    ) -> Result<(), DatabaseError> {
        let reference_rows = reference_schema.read_rows(reference)?;
        let mut base_rows = base_schema.read_rows(base)?;
        let key_positions = key_positions(reference_schema);
        let null = CellValue::Null;

        for (key, reference_row) in reference_rows {
            match base_rows.remove(&key) {
                None => self.rows.push(insert_change(reference_schema, reference_row)),
                Some(base_row) => {
                    let mut data = BTreeMap::new();
                    for (index, column) in reference_schema.columns.iter().enumerate() {
                        let before = base_row.get(index).unwrap_or(&null);
                        if *before != reference_row[index] {
                            data.insert(column.name.clone(), reference_row[index].clone());
                        }
                    }
                    if !data.is_empty() {
                        self.rows.push(RowChange {
                            table: reference_schema.name.clone(),
                            action: RowAction::Update,
                            key: key_positions.iter().map(|&i| reference_row[i].clone()).collect(),
                            data,
                        });
                    }
                }
            }
        }

        // Rows left over exist only in the base
        for base_row in base_rows.into_values() {
            self.rows.push(RowChange {
                table: base_schema.name.clone(),
                action: RowAction::Delete,
                key: key_positions.iter().map(|&i| base_row[i].clone()).collect(),
                data: BTreeMap::new(),
            });
        }

        Ok(())
    }

    /// Whether the two packages had identical user tables
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.rows.is_empty()
    }

    /// Serialize into a transform file
    ///
    /// A missing or empty file is accepted; a file that already holds data
    /// is refused.
    pub fn write_to(&self, path: &Path) -> Result<(), DatabaseError> {
        if let Ok(metadata) = std::fs::metadata(path) {
            if metadata.len() > 0 {
                return Err(DatabaseError::OutputExists(path.to_path_buf()));
            }
        }

        let mut conn = Connection::open(path)?;
        let tx = conn.transaction()?;
        tx.execute_batch(
            r#"
            CREATE TABLE _TransformInfo (
                Property TEXT PRIMARY KEY,
                Value TEXT NOT NULL
            );

            CREATE TABLE _TransformTables (
                Seq INTEGER PRIMARY KEY,
                TableName TEXT NOT NULL,
                Action TEXT NOT NULL,
                Columns TEXT NOT NULL
            );

            CREATE TABLE _TransformRows (
                Seq INTEGER PRIMARY KEY,
                TableName TEXT NOT NULL,
                Action TEXT NOT NULL,
                RowKey TEXT NOT NULL,
                RowData TEXT NOT NULL
            );
            "#,
        )?;

        tx.execute(
            "INSERT INTO _TransformInfo (Property, Value) VALUES ('FormatVersion', ?1)",
            [TRANSFORM_FORMAT_VERSION.to_string()],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO _TransformTables (Seq, TableName, Action, Columns) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (seq, change) in self.tables.iter().enumerate() {
                stmt.execute(params![
                    seq as i64,
                    change.table,
                    change.action.as_str(),
                    serde_json::to_string(&change.columns)?,
                ])?;
            }

            let mut stmt = tx.prepare(
                "INSERT INTO _TransformRows (Seq, TableName, Action, RowKey, RowData) VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (seq, change) in self.rows.iter().enumerate() {
                stmt.execute(params![
                    seq as i64,
                    change.table,
                    change.action.as_str(),
                    serde_json::to_string(&change.key)?,
                    serde_json::to_string(&change.data)?,
                ])?;
            }
        }

        tx.commit()?;
        debug!("Wrote transform to {:?}", path);
        Ok(())
    }

    /// Read a transform file
    pub fn read_from(path: &Path) -> Result<Self, DatabaseError> {
        let conn = open_transform(path)?;
        let mut transform = Transform::default();

        let mut stmt = conn.prepare("SELECT TableName, Action, Columns FROM _TransformTables ORDER BY Seq")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
        })?;
        for row in rows {
            let (table, action, columns) = row?;
            transform.tables.push(TableChange {
                table,
                action: TableAction::parse(&action)?,
                columns: serde_json::from_str(&columns)?,
            });
        }

        let mut stmt = conn.prepare("SELECT TableName, Action, RowKey, RowData FROM _TransformRows ORDER BY Seq")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;
        for row in rows {
            let (table, action, key, data) = row?;
            transform.rows.push(RowChange {
                table,
                action: RowAction::parse(&action)?,
                key: serde_json::from_str(&key)?,
                data: serde_json::from_str(&data)?,
            });
        }

        Ok(transform)
    }

    /// Replay the delta onto a connection inside its open transaction
    pub fn apply(&self, conn: &Connection) -> Result<(), DatabaseError> {
        for change in &self.tables {
            match change.action {
                TableAction::Drop => {
                    conn.execute_batch(&format!("DROP TABLE {}", quote_identifier(&change.table)))?;
                }
                TableAction::Add => {
                    let layout = TableSchema {
                        name: change.table.clone(),
                        columns: change.columns.clone(),
                    };
                    conn.execute_batch(&layout.create_sql())?;
                }
                TableAction::Alter => {
                    // Added columns never carry NOT NULL without a default; `between` refuses those
                    for column in &change.columns {
                        conn.execute_batch(&format!(
                            "ALTER TABLE {} ADD COLUMN {}",
                            quote_identifier(&change.table),
                            column.definition_sql()
                        ))?;
                    }
                }
            }
        }

        let mut layouts: BTreeMap<&str, TableSchema> = BTreeMap::new();
        for change in &self.rows {
            if !layouts.contains_key(change.table.as_str()) {
                layouts.insert(&change.table, TableSchema::load(conn, &change.table)?);
            }
            let layout = &layouts[change.table.as_str()];
            apply_row(conn, layout, change)?;
        }

        info!(
            "Applied transform: {} table change(s), {} row change(s)",
            self.tables.len(),
            self.rows.len()
        );
        Ok(())
    }
}

/// Validation stamp of a transform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformSummary {
    pub format_version: i64,
    pub base_fingerprint: String,
    pub reference_fingerprint: String,
    /// Language property of the base when the transform was generated
    pub base_languages: Option<String>,
    /// Language property of the reference when the transform was generated
    pub reference_languages: Option<String>,
    pub validation_flags: u32,
    /// RFC 3339 creation time
    pub created_at: String,
}

impl TransformSummary {
    /// Describe the pair of packages a transform was generated from
    pub fn describe(reference: &Connection, base: &Connection) -> Result<Self, DatabaseError> {
        let reference_summary = SummaryInfo::load(reference)?;
        let base_summary = SummaryInfo::load(base)?;

        Ok(Self {
            format_version: TRANSFORM_FORMAT_VERSION,
            base_fingerprint: fingerprint(base)?,
            reference_fingerprint: fingerprint(reference)?,
            base_languages: base_summary
                .get_text(SummaryProperty::Template)?
                .map(str::to_string),
            reference_languages: reference_summary
                .get_text(SummaryProperty::Template)?
                .map(str::to_string),
            validation_flags: VALIDATE_BASE_FINGERPRINT,
            created_at: Utc::now().to_rfc3339(),
        })
    }

    /// Stamp an existing transform file
    pub fn write_to(&self, path: &Path) -> Result<(), DatabaseError> {
        let conn = open_transform(path)?;
        let mut stmt = conn.prepare("INSERT OR REPLACE INTO _TransformInfo (Property, Value) VALUES (?1, ?2)")?;

        let entries = [
            ("FormatVersion", Some(self.format_version.to_string())),
            ("BaseFingerprint", Some(self.base_fingerprint.clone())),
            ("ReferenceFingerprint", Some(self.reference_fingerprint.clone())),
            ("BaseLanguages", self.base_languages.clone()),
            ("ReferenceLanguages", self.reference_languages.clone()),
            ("ValidationFlags", Some(self.validation_flags.to_string())),
            ("CreatedAt", Some(self.created_at.clone())),
        ];
        for (property, value) in entries {
            if let Some(value) = value {
                stmt.execute(params![property, value])?;
            }
        }

        debug!("Stamped transform {:?}", path);
        Ok(())
    }

    /// Read the stamp of a transform file, `None` when it was never stamped
    pub fn read_from(path: &Path) -> Result<Option<Self>, DatabaseError> {
        let conn = open_transform(path)?;
        let get = |property: &str| -> Result<Option<String>, DatabaseError> {
            Ok(conn
                .query_row("SELECT Value FROM _TransformInfo WHERE Property = ?1", [property], |row| {
                    row.get::<_, String>(0)
                })
                .optional()?)
        };

        let (Some(base_fingerprint), Some(reference_fingerprint)) =
            (get("BaseFingerprint")?, get("ReferenceFingerprint")?)
        else {
            return Ok(None);
        };

        let parse_number = |property: &str| -> Result<Option<i64>, DatabaseError> {
            get(property)?
                .map(|value| {
                    value.parse::<i64>().map_err(|e| {
                        DatabaseError::InvalidTransform(format!("{} is not a number: {}", property, e))
                    })
                })
                .transpose()
        };

        Ok(Some(Self {
            format_version: parse_number("FormatVersion")?.unwrap_or(TRANSFORM_FORMAT_VERSION),
            base_fingerprint,
            reference_fingerprint,
            base_languages: get("BaseLanguages")?,
            reference_languages: get("ReferenceLanguages")?,
            validation_flags: parse_number("ValidationFlags")?.unwrap_or(0) as u32,
            created_at: get("CreatedAt")?.unwrap_or_default(),
        }))
    }

    /// Check that a package is the base this transform was generated from
    pub fn validate_base(&self, base: &Connection) -> Result<(), DatabaseError> {
        if self.validation_flags & VALIDATE_BASE_FINGERPRINT == 0 {
            return Ok(());
        }

        let actual = fingerprint(base)?;
        if actual != self.base_fingerprint {
            return Err(DatabaseError::ValidationFailed(format!(
                "base fingerprint {} does not match expected {}",
                actual, self.base_fingerprint
            )));
        }
        Ok(())
    }
}

/// SHA-256 over the canonical content of every user table
pub fn fingerprint(conn: &Connection) -> Result<String, DatabaseError> {
    let mut hasher = Sha256::new();

    for name in schema::user_tables(conn)? {
        let layout = TableSchema::load(conn, &name)?;
        hasher.update(serde_json::to_vec(&layout)?);
        for (key, row) in layout.read_rows(conn)? {
            hasher.update(key.as_bytes());
            hasher.update(serde_json::to_vec(&row)?);
        }
    }

    Ok(format!("{:x}", hasher.finalize()))
}

fn open_transform(path: &Path) -> Result<Connection, DatabaseError> {
    let conn = Connection::open(path)?;
    let tables: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('_TransformInfo', '_TransformTables', '_TransformRows')",
        [],
        |row| row.get(0),
    )?;
    if tables != 3 {
        return Err(DatabaseError::InvalidTransform(format!("{:?} is not a transform file", path)));
    }
    Ok(conn)
}

fn require_primary_key(layout: &TableSchema) -> Result<(), DatabaseError> {
    if layout.key_columns().is_empty() {
        return Err(DatabaseError::StructuralMismatch {
            table: layout.name.clone(),
            reason: "table has no primary key".to_string(),
        });
    }
    Ok(())
}

/// Reference columns beyond the base layout; anything else must match exactly
fn added_columns(reference: &TableSchema, base: &TableSchema) -> Result<Vec<ColumnDef>, DatabaseError> {
    let mismatch = |reason: String| DatabaseError::StructuralMismatch {
        table: reference.name.clone(),
        reason,
    };

    if base.columns.len() > reference.columns.len() {
        return Err(mismatch(format!(
            "reference has {} column(s), base has {}",
            reference.columns.len(),
            base.columns.len()
        )));
    }

    for (before, after) in base.columns.iter().zip(&reference.columns) {
        if before.name != after.name {
            return Err(mismatch(format!("column {} became {}", before.name, after.name)));
        }
        if !before.declared_type.eq_ignore_ascii_case(&after.declared_type) {
            return Err(mismatch(format!(
                "column {} changed type from {} to {}",
                before.name, before.declared_type, after.declared_type
            )));
        }
        if before.primary_key != after.primary_key {
            return Err(mismatch(format!("primary key changed at column {}", before.name)));
        }
        if before.not_null != after.not_null || before.default_value != after.default_value {
            return Err(mismatch(format!("constraints changed on column {}", before.name)));
        }
    }

    let added = reference.columns[base.columns.len()..].to_vec();
    if let Some(key) = added.iter().find(|c| c.primary_key > 0) {
        return Err(mismatch(format!("added column {} is part of the primary key", key.name)));
    }
    if let Some(column) = added.iter().find(|c| c.not_null && c.default_value.is_none()) {
        return Err(mismatch(format!("added column {} is NOT NULL without a default", column.name)));
    }
    Ok(added)
}

fn key_positions(layout: &TableSchema) -> Vec<usize> {
    layout
        .key_columns()
        .iter()
        .filter_map(|c| layout.column_index(&c.name))
        .collect()
}

fn insert_change(layout: &TableSchema, row: Vec<CellValue>) -> RowChange {
    let key = key_positions(layout).iter().map(|&i| row[i].clone()).collect();
    let data = layout
        .columns
        .iter()
        .map(|c| c.name.clone())
        .zip(row)
        .collect();

    RowChange {
        table: layout.name.clone(),
        action: RowAction::Insert,
        key,
        data,
    }
}

fn apply_row(conn: &Connection, layout: &TableSchema, change: &RowChange) -> Result<(), DatabaseError> {
    let keys = layout.key_columns();
    if keys.len() != change.key.len() {
        return Err(DatabaseError::InvalidTransform(format!(
            "row key for {} has {} value(s), table has {} key column(s)",
            layout.name,
            change.key.len(),
            keys.len()
        )));
    }
    let table = quote_identifier(&layout.name);

    let affected = match change.action {
        RowAction::Insert => {
            let columns: Vec<String> = change.data.keys().map(|c| quote_identifier(c)).collect();
            let placeholders: Vec<String> = (1..=change.data.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table,
                columns.join(", "),
                placeholders.join(", ")
            );
            let values: Vec<&CellValue> = change.data.values().collect();
            conn.execute(&sql, rusqlite::params_from_iter(values))?
        }
        RowAction::Update => {
            let assignments: Vec<String> = change
                .data
                .keys()
                .enumerate()
                .map(|(i, c)| format!("{} = ?{}", quote_identifier(c), i + 1))
                .collect();
            let offset = change.data.len();
            let conditions: Vec<String> = keys
                .iter()
                .enumerate()
                .map(|(i, c)| format!("{} IS ?{}", quote_identifier(&c.name), offset + i + 1))
                .collect();
            let sql = format!(
                "UPDATE {} SET {} WHERE {}",
                table,
                assignments.join(", "),
                conditions.join(" AND ")
            );
            let values: Vec<&CellValue> = change.data.values().chain(change.key.iter()).collect();
            conn.execute(&sql, rusqlite::params_from_iter(values))?
        }
        RowAction::Delete => {
            let conditions: Vec<String> = keys
                .iter()
                .enumerate()
                .map(|(i, c)| format!("{} IS ?{}", quote_identifier(&c.name), i + 1))
                .collect();
            let sql = format!("DELETE FROM {} WHERE {}", table, conditions.join(" AND "));
            conn.execute(&sql, rusqlite::params_from_iter(change.key.iter()))?
        }
    };

    if affected != 1 {
        return Err(DatabaseError::ValidationFailed(format!(
            "{} on {} affected {} row(s)",
            change.action.as_str(),
            layout.name,
            affected
        )));
    }
    Ok(())
}
