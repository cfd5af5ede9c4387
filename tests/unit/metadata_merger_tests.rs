/*!
 * Tests for the embedding pipeline against the in-memory engine
 */

use anyhow::Result;
use std::path::{Path, PathBuf};

use langembed::app_config::{EmbedConfig, MatchPolicy};
use langembed::app_controller::{Controller, EmbedRequest};
use langembed::database::memory::MEMORY_TRANSFORM_MAGIC;
use langembed::database::{FailurePoint, MemoryEngine, MemoryPackage, PackageEngine};
use langembed::errors::EmbedError;
use langembed::metadata_merger::merge_into_target;
use crate::common;

fn request(language_id: &str) -> EmbedRequest {
    EmbedRequest {
        target_path: PathBuf::from("product.pkg"),
        source_path: PathBuf::from("product-de.pkg"),
        language_id: language_id.to_string(),
    }
}

fn engine_with(template: Option<&str>, source_content: &[u8]) -> MemoryEngine {
    let engine = MemoryEngine::new();
    engine.insert_package("product.pkg", MemoryPackage::new(b"english tables", template));
    engine.insert_package("product-de.pkg", MemoryPackage::new(source_content, Some("Intel;1031")));
    engine
}

fn controller(engine: &MemoryEngine, prefix: &str) -> Controller<MemoryEngine> {
    common::init_test_logging();
    let config = EmbedConfig {
        temp_prefix: prefix.to_string(),
        ..EmbedConfig::default()
    };
    Controller::new(engine.clone(), config)
}

fn expected_transform(content: &[u8]) -> Vec<u8> {
    let mut bytes = MEMORY_TRANSFORM_MAGIC.to_vec();
    bytes.extend_from_slice(content);
    bytes
}

#[test]
fn test_run_withNewLanguage_shouldEmbedAndAppend() -> Result<()> {
    let engine = engine_with(Some("Intel;1033,1036"), b"german tables");

    let report = controller(&engine, "MMNEW").run(&request("1031"))?;

    assert!(report.language_added);
    assert_eq!(report.entry_name, "1031");
    assert_eq!(report.languages, "Intel;1033,1036,1031");

    let target = engine.package("product.pkg").unwrap();
    assert_eq!(target.template(), Some("Intel;1033,1036,1031"));
    assert_eq!(target.storages.get("1031"), Some(&expected_transform(b"german tables")));
    assert_eq!(target.content, b"english tables".to_vec());
    Ok(())
}

#[test]
fn test_run_twice_shouldNotDuplicateLanguage() -> Result<()> {
    let engine = engine_with(Some("Intel;1033"), b"german tables");
    let controller = controller(&engine, "MMTWICE");

    controller.run(&request("1031"))?;
    let second = controller.run(&request("1031"))?;

    assert!(!second.language_added);
    let target = engine.package("product.pkg").unwrap();
    assert_eq!(target.template(), Some("Intel;1033,1031"));
    assert_eq!(target.storages.len(), 1);
    Ok(())
}

#[test]
fn test_run_withChangedSource_shouldRefreshStorageEntry() -> Result<()> {
    let engine = engine_with(Some("Intel;1033"), b"german tables v1");
    let controller = controller(&engine, "MMREFRESH");
    controller.run(&request("1031"))?;

    engine.insert_package("product-de.pkg", MemoryPackage::new(b"german tables v2", Some("Intel;1031")));
    controller.run(&request("1031"))?;

    let target = engine.package("product.pkg").unwrap();
    assert_eq!(target.storages.len(), 1);
    assert_eq!(target.storages.get("1031"), Some(&expected_transform(b"german tables v2")));
    assert_eq!(target.template(), Some("Intel;1033,1031"));
    Ok(())
}

#[test]
fn test_run_withMissingProperty_shouldCreateIt() -> Result<()> {
    let engine = engine_with(None, b"german tables");

    let report = controller(&engine, "MMMISSING").run(&request("1031"))?;

    assert_eq!(report.languages, "1031");
    assert_eq!(engine.package("product.pkg").unwrap().template(), Some("1031"));
    Ok(())
}

#[test]
fn test_run_withFailingCommit_shouldLeaveTargetUnchanged() -> Result<()> {
    let engine = engine_with(Some("Intel;1033"), b"german tables");
    let before = engine.package("product.pkg").unwrap();
    engine.fail_at(FailurePoint::Commit);

    let error = controller(&engine, "MMCOMMIT").run(&request("1031")).unwrap_err();

    assert!(matches!(error, EmbedError::Commit { .. }));
    assert_eq!(error.operation(), "commit target");
    assert_eq!(engine.package("product.pkg").unwrap(), before);
    assert!(common::temp_files_with_prefix("MMCOMMIT").is_empty());
    Ok(())
}

#[test]
fn test_run_withFailingPropertyWrite_shouldNotEmbed() -> Result<()> {
    let engine = engine_with(Some("Intel;1033"), b"german tables");
    let before = engine.package("product.pkg").unwrap();
    engine.fail_at(FailurePoint::SetProperty);

    let error = controller(&engine, "MMSETPROP").run(&request("1031")).unwrap_err();

    assert!(matches!(error, EmbedError::PropertyWrite { .. }));
    assert_eq!(engine.package("product.pkg").unwrap(), before);
    assert!(!engine.calls().contains(&"commit"));
    Ok(())
}

#[test]
fn test_run_withFailingDelta_shouldStopBeforeEmbedding() -> Result<()> {
    let engine = engine_with(Some("Intel;1033"), b"german tables");
    engine.fail_at(FailurePoint::GenerateDelta);

    let error = controller(&engine, "MMDELTA").run(&request("1031")).unwrap_err();

    assert!(matches!(error, EmbedError::DeltaGeneration { .. }));
    assert!(error.to_string().starts_with("error at generate transform: "));
    assert!(!engine.calls().contains(&"assign_storage_entry"));
    assert!(common::temp_files_with_prefix("MMDELTA").is_empty());
    Ok(())
}

#[test]
fn test_run_withMissingSource_shouldReportOpenSource() {
    let engine = MemoryEngine::new();
    engine.insert_package("product.pkg", MemoryPackage::new(b"english tables", Some("Intel;1033")));

    let error = controller(&engine, "MMNOSRC").run(&request("1031")).unwrap_err();

    assert!(matches!(error, EmbedError::DatabaseOpen { .. }));
    assert_eq!(error.operation(), "open source");
}

#[test]
fn test_run_withKeepTempOnFailure_shouldLeaveTransformBehind() -> Result<()> {
    let engine = engine_with(Some("Intel;1033"), b"german tables");
    engine.fail_at(FailurePoint::Commit);
    let config = EmbedConfig {
        temp_prefix: "MMKEEP".to_string(),
        keep_temp_on_failure: true,
        ..EmbedConfig::default()
    };

    Controller::new(engine.clone(), config).run(&request("1031")).unwrap_err();

    let kept = common::temp_files_with_prefix("MMKEEP");
    assert_eq!(kept.len(), 1);
    for path in kept {
        std::fs::remove_file(path)?;
    }
    Ok(())
}

#[test]
fn test_merge_into_target_withSubstringPolicy_shouldSkipContainedIdentifier() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let transform = dir.path().join("1.mst");
    std::fs::write(&transform, b"transform")?;

    let engine = MemoryEngine::new();
    engine.insert_package("product.pkg", MemoryPackage::new(b"tables", Some("Intel;1031")));
    let target = engine.open_transacted(Path::new("product.pkg"))?;

    let report = merge_into_target(&engine, target, "1", &transform, MatchPolicy::Substring)?;

    assert!(!report.language_added);
    assert_eq!(report.bytes_embedded, 9);
    let package = engine.package("product.pkg").unwrap();
    assert_eq!(package.template(), Some("Intel;1031"));
    assert_eq!(package.storages.get("1"), Some(&b"transform".to_vec()));
    Ok(())
}

#[test]
fn test_merge_into_target_withTokenPolicy_shouldAppendShortIdentifier() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let transform = dir.path().join("1.mst");
    std::fs::write(&transform, b"transform")?;

    let engine = MemoryEngine::new();
    engine.insert_package("product.pkg", MemoryPackage::new(b"tables", Some("Intel;1031")));
    let target = engine.open_transacted(Path::new("product.pkg"))?;

    let report = merge_into_target(&engine, target, "1", &transform, MatchPolicy::Token)?;

    assert!(report.language_added);
    assert_eq!(engine.package("product.pkg").unwrap().template(), Some("Intel;1031,1"));
    Ok(())
}
