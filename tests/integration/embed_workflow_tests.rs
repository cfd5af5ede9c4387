/*!
 * End-to-end embedding against package files on disk
 */

use anyhow::Result;
use std::path::Path;

use langembed::app_config::{EmbedConfig, MatchPolicy};
use langembed::app_controller::{Controller, EmbedRequest};
use langembed::database::PackageConnection;
use langembed::database::SqliteEngine;
use langembed::errors::EmbedError;
use crate::common;

fn run_embed(target: &Path, source: &Path, language_id: &str, prefix: &str) -> Result<langembed::MergeReport, EmbedError> {
    common::init_test_logging();
    let config = EmbedConfig {
        temp_prefix: prefix.to_string(),
        ..EmbedConfig::default()
    };
    Controller::with_config(config).run(&EmbedRequest {
        target_path: target.to_path_buf(),
        source_path: source.to_path_buf(),
        language_id: language_id.to_string(),
    })
}

/// Apply the embedded transform to the target and return the result's fingerprint
fn apply_embedded(dir: &Path, target: &Path, language_id: &str) -> Result<String> {
    let bytes = common::read_storage(target, language_id)?.expect("storage entry missing");
    let transform_path = dir.join(format!("{}.mst", language_id));
    std::fs::write(&transform_path, bytes)?;

    let mut db = PackageConnection::open_transacted(target)?;
    SqliteEngine::new().apply_transform(&mut db, &transform_path)?;
    db.commit()?;

    common::table_fingerprint(target)
}

#[test]
fn test_embed_withGermanSource_shouldEmbedTransformAndRegisterLanguage() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let target = common::create_package(dir.path(), "product.pkg", Some("Intel;1033"), common::ENGLISH_TABLES)?;
    let source = common::create_package(dir.path(), "product-de.pkg", Some("Intel;1031"), common::GERMAN_TABLES)?;
    let target_tables = common::table_fingerprint(&target)?;

    let report = run_embed(&target, &source, "1031", "EWGERMAN")?;

    assert!(report.language_added);
    assert!(report.bytes_embedded > 0);
    assert_eq!(common::read_template(&target)?.as_deref(), Some("Intel;1033,1031"));
    assert_eq!(common::storage_names(&target)?, vec!["1031".to_string()]);
    // Embedding leaves the relational tables alone
    assert_eq!(common::table_fingerprint(&target)?, target_tables);
    assert!(common::temp_files_with_prefix("EWGERMAN").is_empty());
    Ok(())
}

#[test]
fn test_embeddedTransform_appliedToTarget_shouldReproduceSource() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let target = common::create_package(dir.path(), "product.pkg", Some("Intel;1033"), common::ENGLISH_TABLES)?;
    let source = common::create_package(dir.path(), "product-de.pkg", Some("Intel;1031"), common::GERMAN_TABLES)?;

    run_embed(&target, &source, "1031", "EWAPPLY")?;

    let patched = apply_embedded(dir.path(), &target, "1031")?;
    assert_eq!(patched, common::table_fingerprint(&source)?);
    Ok(())
}

#[test]
fn test_embed_twice_shouldKeepOneEntryAndOneListing() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let target = common::create_package(dir.path(), "product.pkg", Some("Intel;1033"), common::ENGLISH_TABLES)?;
    let source = common::create_package(dir.path(), "product-de.pkg", Some("Intel;1031"), common::GERMAN_TABLES)?;

    run_embed(&target, &source, "1031", "EWTWICE")?;
    let first = common::read_storage(&target, "1031")?;

    // The localized package changes between the two runs
    let mut db = PackageConnection::open_transacted(&source)?;
    db.connection().execute(
        "UPDATE Control SET Text = 'Fortfahren >' WHERE Dialog = 'Welcome' AND Control = 'Next'",
        [],
    )?;
    db.commit()?;

    let second = run_embed(&target, &source, "1031", "EWTWICE")?;

    assert!(!second.language_added);
    assert_eq!(common::read_template(&target)?.as_deref(), Some("Intel;1033,1031"));
    assert_eq!(common::storage_names(&target)?, vec!["1031".to_string()]);
    assert_ne!(common::read_storage(&target, "1031")?, first);

    // The refreshed entry leads to the changed source, not the first one
    let patched = apply_embedded(dir.path(), &target, "1031")?;
    assert_eq!(patched, common::table_fingerprint(&source)?);
    Ok(())
}

#[test]
fn test_embed_shouldPreserveUntouchedHeaderProperties() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let tables = format!(
        "{}\n INSERT INTO _SummaryInformation VALUES (14, 'integer', 5000000000, NULL);",
        common::ENGLISH_TABLES
    );
    let target = common::create_package(dir.path(), "product.pkg", Some("Intel;1033"), &tables)?;
    let source = common::create_package(dir.path(), "product-de.pkg", Some("Intel;1031"), common::GERMAN_TABLES)?;

    run_embed(&target, &source, "1031", "EWHEADER")?;

    let db = PackageConnection::open_read_only(&target)?;
    let page_count: i64 = db.connection().query_row(
        "SELECT IntegerValue FROM _SummaryInformation WHERE PropertyId = 14",
        [],
        |row| row.get(0),
    )?;
    assert_eq!(page_count, 5_000_000_000);
    assert_eq!(common::read_template(&target)?.as_deref(), Some("Intel;1033,1031"));
    Ok(())
}

#[test]
fn test_embed_severalLanguages_shouldPreserveOrder() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let target = common::create_package(dir.path(), "product.pkg", Some("Intel;1033"), common::ENGLISH_TABLES)?;
    let german = common::create_package(dir.path(), "product-de.pkg", Some("Intel;1031"), common::GERMAN_TABLES)?;
    let french = common::create_package(dir.path(), "product-fr.pkg", Some("Intel;1036"), common::FRENCH_TABLES)?;

    run_embed(&target, &french, "1036", "EWORDER")?;
    run_embed(&target, &german, "1031", "EWORDER")?;

    assert_eq!(common::read_template(&target)?.as_deref(), Some("Intel;1033,1036,1031"));
    assert_eq!(
        common::storage_names(&target)?,
        vec!["1031".to_string(), "1036".to_string()]
    );
    Ok(())
}

#[test]
fn test_embed_withoutLanguageProperty_shouldCreateIt() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let target = common::create_package(dir.path(), "product.pkg", None, common::ENGLISH_TABLES)?;
    let source = common::create_package(dir.path(), "product-de.pkg", None, common::GERMAN_TABLES)?;

    run_embed(&target, &source, "1031", "EWNOPROP")?;

    assert_eq!(common::read_template(&target)?.as_deref(), Some("1031"));
    Ok(())
}

#[test]
fn test_embed_withMissingSource_shouldLeaveTargetUnchanged() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let target = common::create_package(dir.path(), "product.pkg", Some("Intel;1033"), common::ENGLISH_TABLES)?;
    let missing = dir.path().join("missing.pkg");

    let error = run_embed(&target, &missing, "1031", "EWNOSRC").unwrap_err();

    assert_eq!(error.operation(), "open source");
    assert!(error.status_code().is_some());
    assert_eq!(common::read_template(&target)?.as_deref(), Some("Intel;1033"));
    assert!(common::storage_names(&target)?.is_empty());
    assert!(common::temp_files_with_prefix("EWNOSRC").is_empty());
    Ok(())
}

#[test]
fn test_embed_withMismatchedSchema_shouldFailAtGeneration() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let target = common::create_package(dir.path(), "product.pkg", Some("Intel;1033"), common::ENGLISH_TABLES)?;
    let source = common::create_package(
        dir.path(),
        "product-de.pkg",
        Some("Intel;1031"),
        "CREATE TABLE Property (Name TEXT NOT NULL, Value TEXT, PRIMARY KEY (Name));",
    )?;

    let error = run_embed(&target, &source, "1031", "EWSCHEMA").unwrap_err();

    assert!(matches!(error, EmbedError::DeltaGeneration { .. }));
    assert_eq!(common::read_template(&target)?.as_deref(), Some("Intel;1033"));
    assert!(common::storage_names(&target)?.is_empty());
    assert!(common::temp_files_with_prefix("EWSCHEMA").is_empty());
    Ok(())
}

#[test]
fn test_embed_withLockedTarget_shouldFailToOpen() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let target = common::create_package(dir.path(), "product.pkg", Some("Intel;1033"), common::ENGLISH_TABLES)?;
    let source = common::create_package(dir.path(), "product-de.pkg", Some("Intel;1031"), common::GERMAN_TABLES)?;

    let writer = PackageConnection::open_transacted(&target)?;
    let error = run_embed(&target, &source, "1031", "EWLOCKED").unwrap_err();
    drop(writer);

    assert_eq!(error.operation(), "open target");
    assert_eq!(common::read_template(&target)?.as_deref(), Some("Intel;1033"));
    Ok(())
}

#[test]
fn test_embed_withSubstringPolicy_shouldSkipContainedIdentifier() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let target = common::create_package(dir.path(), "product.pkg", Some("Intel;1031"), common::ENGLISH_TABLES)?;
    let source = common::create_package(dir.path(), "product-de.pkg", Some("Intel;1031"), common::GERMAN_TABLES)?;
    let config = EmbedConfig {
        temp_prefix: "EWSUBSTR".to_string(),
        match_policy: MatchPolicy::Substring,
        ..EmbedConfig::default()
    };

    let report = Controller::with_config(config).run(&EmbedRequest {
        target_path: target.clone(),
        source_path: source,
        language_id: "1".to_string(),
    })?;

    assert!(!report.language_added);
    assert_eq!(common::read_template(&target)?.as_deref(), Some("Intel;1031"));
    assert_eq!(common::storage_names(&target)?, vec!["1".to_string()]);
    Ok(())
}
