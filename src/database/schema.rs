/*!
 * Package database schema.
 *
 * A package is a SQLite file holding user tables plus two system tables:
 * `_Storages` for embedded binary entries and `_SummaryInformation` for the
 * typed header. This module creates those tables and introspects user tables
 * for delta generation.
 */

use log::{debug, info};
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{Connection, ToSql};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::DatabaseError;

/// Name of the embedded storage table
pub const STORAGES_TABLE: &str = "_Storages";

/// Name of the summary header table
pub const SUMMARY_TABLE: &str = "_SummaryInformation";

/// Create the system tables of a new package
pub fn initialize_package(conn: &Connection) -> Result<(), DatabaseError> {
    info!("Initializing package system tables");

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS _Storages (
            Name TEXT PRIMARY KEY,
            Data BLOB NOT NULL
        );

        CREATE TABLE IF NOT EXISTS _SummaryInformation (
            PropertyId INTEGER PRIMARY KEY,
            ValueType TEXT NOT NULL CHECK (ValueType IN ('integer', 'text', 'filetime')),
            IntegerValue INTEGER,
            TextValue TEXT
        );
        "#,
    )?;

    Ok(())
}

/// Check that both system tables exist
pub fn is_package(conn: &Connection) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN (?1, ?2)",
        [STORAGES_TABLE, SUMMARY_TABLE],
        |row| row.get(0),
    )?;

    Ok(count == 2)
}

/// Names of all user tables, sorted
pub fn user_tables(conn: &Connection) -> Result<Vec<String>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' AND name NOT LIKE '\\_%' ESCAPE '\\' ORDER BY name",
    )?;

    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    debug!("Found {} user tables", names.len());
    Ok(names)
}

/// Column definition as reported by `PRAGMA table_info`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub declared_type: String,
    pub not_null: bool,
    /// Default expression as written in the table definition
    #[serde(default)]
    pub default_value: Option<String>,
    /// 1-based position within the primary key, 0 when not a key column
    pub primary_key: u32,
}

impl ColumnDef {
    /// Column clause for `CREATE TABLE` and `ALTER TABLE ... ADD COLUMN`
    pub fn definition_sql(&self) -> String {
        let mut part = quote_identifier(&self.name);
        if !self.declared_type.is_empty() {
            part.push(' ');
            part.push_str(&self.declared_type);
        }
        if self.not_null {
            part.push_str(" NOT NULL");
        }
        if let Some(default) = &self.default_value {
            part.push_str(" DEFAULT ");
            part.push_str(default);
        }
        part
    }
}

/// Column layout of a user table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    /// Read the layout of an existing table
    pub fn load(conn: &Connection, table: &str) -> Result<Self, DatabaseError> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_identifier(table)))?;

        let columns = stmt
            .query_map([], |row| {
                Ok(ColumnDef {
                    name: row.get(1)?,
                    declared_type: row.get(2)?,
                    not_null: row.get::<_, i64>(3)? != 0,
                    default_value: row.get(4)?,
                    primary_key: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        if columns.is_empty() {
            return Err(DatabaseError::StructuralMismatch {
                table: table.to_string(),
                reason: "table does not exist".to_string(),
            });
        }

        Ok(Self {
            name: table.to_string(),
            columns,
        })
    }

    /// Key columns, ordered by their key position
    pub fn key_columns(&self) -> Vec<&ColumnDef> {
        let mut keys: Vec<&ColumnDef> = self.columns.iter().filter(|c| c.primary_key > 0).collect();
        keys.sort_by_key(|c| c.primary_key);
        keys
    }

    /// Position of a column by name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// `CREATE TABLE` statement reproducing this layout
    pub fn create_sql(&self) -> String {
        let mut parts: Vec<String> = self.columns.iter().map(ColumnDef::definition_sql).collect();

        let keys = self.key_columns();
        if !keys.is_empty() {
            let key_list: Vec<String> = keys.iter().map(|c| quote_identifier(&c.name)).collect();
            parts.push(format!("PRIMARY KEY ({})", key_list.join(", ")));
        }

        format!("CREATE TABLE {} ({})", quote_identifier(&self.name), parts.join(", "))
    }

    /// Read every row, keyed by the JSON encoding of its primary key values
    ///
    /// SQLite accepts NULL in non-integer key columns that are not declared
    /// `NOT NULL`, and several such rows compare as distinct. Rows like that
    /// cannot be addressed by key, so they are reported as a mismatch.
    pub fn read_rows(&self, conn: &Connection) -> Result<BTreeMap<String, Vec<CellValue>>, DatabaseError> {
        let column_list: Vec<String> = self.columns.iter().map(|c| quote_identifier(&c.name)).collect();
        let sql = format!("SELECT {} FROM {}", column_list.join(", "), quote_identifier(&self.name));
        let key_positions: Vec<usize> = self
            .key_columns()
            .iter()
            .filter_map(|c| self.column_index(&c.name))
            .collect();

        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut result = BTreeMap::new();

        while let Some(row) = rows.next()? {
            let mut cells = Vec::with_capacity(self.columns.len());
            for index in 0..self.columns.len() {
                cells.push(CellValue::from(row.get_ref(index)?));
            }
            let key: Vec<&CellValue> = key_positions.iter().map(|&i| &cells[i]).collect();
            if key.iter().any(|cell| **cell == CellValue::Null) {
                return Err(DatabaseError::StructuralMismatch {
                    table: self.name.clone(),
                    reason: "row with a NULL primary key value".to_string(),
                });
            }
            let encoded = serde_json::to_string(&key)?;
            if result.contains_key(&encoded) {
                return Err(DatabaseError::StructuralMismatch {
                    table: self.name.clone(),
                    reason: format!("duplicate primary key {}", encoded),
                });
            }
            result.insert(encoded, cells);
        }

        Ok(result)
    }
}

/// Quote an SQL identifier
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// A single cell, serializable into a transform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum CellValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl From<ValueRef<'_>> for CellValue {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Self::Null,
            ValueRef::Integer(n) => Self::Integer(n),
            ValueRef::Real(f) => Self::Real(f),
            ValueRef::Text(bytes) => Self::Text(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(bytes) => Self::Blob(bytes.to_vec()),
        }
    }
}

impl ToSql for CellValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::Owned(Value::Null),
            Self::Integer(n) => ToSqlOutput::Owned(Value::Integer(*n)),
            Self::Real(f) => ToSqlOutput::Owned(Value::Real(*f)),
            Self::Text(text) => ToSqlOutput::Borrowed(ValueRef::Text(text.as_bytes())),
            Self::Blob(bytes) => ToSqlOutput::Borrowed(ValueRef::Blob(bytes)),
        })
    }
}
