/*!
 * Second pipeline stage: embed the transform into the target under the
 * language identifier and register the identifier in the language property.
 *
 * The storage entry and the property edit are committed together. Until
 * `commit` succeeds nothing is visible in the target; a failing commit
 * leaves the target as it was.
 */

use log::{debug, info};
use std::fs::File;
use std::path::Path;

use crate::database::{PackageEngine, SummaryProperty};
use crate::errors::EmbedError;
use crate::language_utils::{self, LanguageMerge, MatchPolicy};

/// Summary property holding the language list
pub const LANGUAGE_PROPERTY: SummaryProperty = SummaryProperty::Template;

/// Outcome of a successful merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
    /// Storage entry that now holds the transform
    pub entry_name: String,
    /// Size of the embedded transform
    pub bytes_embedded: u64,
    /// Language property after the merge
    pub languages: String,
    /// Whether the identifier had to be appended
    pub language_added: bool,
}

/// Embed a transform file into `target` and commit
pub fn merge_into_target<E: PackageEngine>(
    engine: &E,
    mut target: E::Database,
    language_id: &str,
    transform_path: &Path,
    policy: MatchPolicy,
) -> Result<MergeReport, EmbedError> {
    let bytes_embedded = embed_transform(engine, &mut target, language_id, transform_path)?;
    let (languages, language_added) = register_language(engine, &mut target, language_id, policy)?;

    engine
        .persist_summary(&mut target)
        .map_err(|error| EmbedError::PropertyWrite {
            operation: "persist summary",
            source: error,
        })?;

    engine.commit(target).map_err(|error| EmbedError::Commit {
        operation: "commit target",
        source: error,
    })?;

    info!(
        "Embedded {} byte transform as {:?}; languages now {:?}",
        bytes_embedded, language_id, languages
    );

    Ok(MergeReport {
        entry_name: language_id.to_string(),
        bytes_embedded,
        languages,
        language_added,
    })
}

/// Stream the transform into the storage entry named after the language
fn embed_transform<E: PackageEngine>(
    engine: &E,
    target: &mut E::Database,
    language_id: &str,
    transform_path: &Path,
) -> Result<u64, EmbedError> {
    let mut file = File::open(transform_path).map_err(|error| EmbedError::Filesystem {
        operation: "open transform",
        source: error,
    })?;
    let length = file
        .metadata()
        .map_err(|error| EmbedError::Filesystem {
            operation: "stat transform",
            source: error,
        })?
        .len();

    engine
        .assign_storage_entry(target, language_id, &mut file, length)
        .map_err(|error| EmbedError::StorageAssign {
            operation: "assign storage entry",
            source: error,
        })?;

    debug!("Assigned storage entry {:?} ({} bytes)", language_id, length);
    Ok(length)
}

/// Append the identifier to the language property unless it is registered
fn register_language<E: PackageEngine>(
    engine: &E,
    target: &mut E::Database,
    language_id: &str,
    policy: MatchPolicy,
) -> Result<(String, bool), EmbedError> {
    let current = engine
        .get_string_property(target, LANGUAGE_PROPERTY)
        .map_err(|error| EmbedError::PropertyRead {
            operation: "get language property",
            source: error,
        })?
        .unwrap_or_default();

    match language_utils::merge_language(&current, language_id, policy) {
        LanguageMerge::AlreadyPresent => {
            debug!("Language {:?} already listed in {:?}", language_id, current);
            Ok((current, false))
        }
        LanguageMerge::Appended(updated) => {
            engine
                .set_string_property(target, LANGUAGE_PROPERTY, &updated)
                .map_err(|error| EmbedError::PropertyWrite {
                    operation: "set language property",
                    source: error,
                })?;
            debug!("Language property {:?} -> {:?}", current, updated);
            Ok((updated, true))
        }
    }
}
