/*!
 * Summary information header of a package database.
 *
 * Header properties live in the `_SummaryInformation` system table, one row
 * per property id, tagged with their datatype. Edits are staged in memory and
 * only reach the table when `persist` runs inside the open transaction.
 */

use log::debug;
use rusqlite::{Connection, params};
use std::collections::{BTreeMap, BTreeSet};

use crate::errors::{DatabaseError, STATUS_INVALID_PACKAGE};

/// Well-known summary property ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SummaryProperty {
    Codepage,
    Title,
    Subject,
    Author,
    Keywords,
    Comments,
    /// Platform and language list, `"Intel;1033,1036"`
    Template,
    LastAuthor,
    RevisionNumber,
    CreateTime,
    LastSaveTime,
    PageCount,
    WordCount,
    CharCount,
    AppName,
    Security,
}

impl SummaryProperty {
    /// Every known property, in id order
    pub const ALL: [SummaryProperty; 16] = [
        Self::Codepage,
        Self::Title,
        Self::Subject,
        Self::Author,
        Self::Keywords,
        Self::Comments,
        Self::Template,
        Self::LastAuthor,
        Self::RevisionNumber,
        Self::CreateTime,
        Self::LastSaveTime,
        Self::PageCount,
        Self::WordCount,
        Self::CharCount,
        Self::AppName,
        Self::Security,
    ];

    /// Numeric property id stored in the header
    pub fn id(self) -> u32 {
        match self {
            Self::Codepage => 1,
            Self::Title => 2,
            Self::Subject => 3,
            Self::Author => 4,
            Self::Keywords => 5,
            Self::Comments => 6,
            Self::Template => 7,
            Self::LastAuthor => 8,
            Self::RevisionNumber => 9,
            Self::CreateTime => 12,
            Self::LastSaveTime => 13,
            Self::PageCount => 14,
            Self::WordCount => 15,
            Self::CharCount => 16,
            Self::AppName => 18,
            Self::Security => 19,
        }
    }

    /// Look a property up by its numeric id
    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|property| property.id() == id)
    }
}

impl std::fmt::Display for SummaryProperty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Typed header value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Integer(i64),
    Text(String),
    /// Seconds since the Unix epoch
    FileTime(i64),
}

impl PropertyValue {
    /// Datatype tag stored in the `ValueType` column
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Integer(_) => "integer",
            Self::Text(_) => "text",
            Self::FileTime(_) => "filetime",
        }
    }

    /// Borrow the text of a string property
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// In-memory view of the header with staged edits
#[derive(Debug, Clone, Default)]
pub struct SummaryInfo {
    values: BTreeMap<u32, PropertyValue>,
    /// Ids staged since the last load or persist
    edited: BTreeSet<u32>,
}

impl SummaryInfo {
    /// Read the header table
    pub fn load(conn: &Connection) -> Result<Self, DatabaseError> {
        let mut stmt = conn.prepare(
            "SELECT PropertyId, ValueType, IntegerValue, TextValue FROM _SummaryInformation ORDER BY PropertyId",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, u32>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<i64>>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?;

        let mut values = BTreeMap::new();
        for row in rows {
            let (id, value_type, integer, text) = row?;
            let value = match (value_type.as_str(), integer, text) {
                ("integer", Some(n), _) => PropertyValue::Integer(n),
                ("filetime", Some(n), _) => PropertyValue::FileTime(n),
                (numeric @ ("integer" | "filetime"), None, _) => {
                    return Err(DatabaseError::Engine {
                        status: STATUS_INVALID_PACKAGE,
                        message: format!("Summary property {} is typed {:?} but has no value", id, numeric),
                    });
                }
                ("text", _, Some(text)) => PropertyValue::Text(text),
                ("text", _, None) => PropertyValue::Text(String::new()),
                (other, _, _) => {
                    return Err(DatabaseError::Engine {
                        status: STATUS_INVALID_PACKAGE,
                        message: format!("Summary property {} has unknown type {:?}", id, other),
                    });
                }
            };
            values.insert(id, value);
        }

        debug!("Loaded {} summary properties", values.len());
        Ok(Self {
            values,
            edited: BTreeSet::new(),
        })
    }

    /// Current value of a property, staged edits included
    pub fn get(&self, property: SummaryProperty) -> Option<&PropertyValue> {
        self.values.get(&property.id())
    }

    /// Stage a new value
    pub fn set(&mut self, property: SummaryProperty, value: PropertyValue) {
        self.values.insert(property.id(), value);
        self.edited.insert(property.id());
    }

    /// Read a string property; absent reads as `None`, other datatypes fail
    pub fn get_text(&self, property: SummaryProperty) -> Result<Option<&str>, DatabaseError> {
        match self.get(property) {
            None => Ok(None),
            Some(PropertyValue::Text(text)) => Ok(Some(text)),
            Some(other) => Err(DatabaseError::TypeMismatch {
                property: property.id(),
                found: other.type_name(),
            }),
        }
    }

    /// Stage a string value, keeping the property's text datatype
    pub fn set_text(&mut self, property: SummaryProperty, value: &str) -> Result<(), DatabaseError> {
        if let Some(existing) = self.get(property) {
            if existing.as_text().is_none() {
                return Err(DatabaseError::TypeMismatch {
                    property: property.id(),
                    found: existing.type_name(),
                });
            }
        }
        self.set(property, PropertyValue::Text(value.to_string()));
        Ok(())
    }

    /// Whether there are staged edits not yet persisted
    pub fn is_dirty(&self) -> bool {
        !self.edited.is_empty()
    }

    /// Write staged edits into the header table; untouched rows are left as stored
    pub fn persist(&mut self, conn: &Connection) -> Result<(), DatabaseError> {
        if self.edited.is_empty() {
            return Ok(());
        }

        let mut stmt = conn.prepare(
            "INSERT OR REPLACE INTO _SummaryInformation (PropertyId, ValueType, IntegerValue, TextValue) VALUES (?1, ?2, ?3, ?4)",
        )?;

        for (id, value) in self.edited.iter().filter_map(|id| self.values.get_key_value(id)) {
            match value {
                PropertyValue::Integer(n) => {
                    stmt.execute(params![id, value.type_name(), n, Option::<String>::None])?
                }
                PropertyValue::FileTime(n) => {
                    stmt.execute(params![id, value.type_name(), n, Option::<String>::None])?
                }
                PropertyValue::Text(text) => {
                    stmt.execute(params![id, value.type_name(), Option::<i64>::None, text])?
                }
            };
        }

        debug!("Persisted {} summary properties", self.edited.len());
        self.edited.clear();
        Ok(())
    }
}
