/*!
 * Tests for error types and diagnostics
 */

use langembed::errors::{DatabaseError, EmbedError, STATUS_FILE_EXISTS, STATUS_TRANSFORM_FAILURE};
use std::path::PathBuf;

#[test]
fn test_databaseOpenError_shouldNameOperationAndStatus() {
    let error = EmbedError::DatabaseOpen {
        operation: "open target",
        source: DatabaseError::Engine {
            status: 14,
            message: "unable to open database file".to_string(),
        },
    };
    assert_eq!(
        error.to_string(),
        "error at open target: unable to open database file (status 14)"
    );
}

#[test]
fn test_structuralMismatch_shouldMapToTransformFailure() {
    let error = DatabaseError::StructuralMismatch {
        table: "Control".to_string(),
        reason: "table has no primary key".to_string(),
    };
    assert_eq!(error.status_code(), STATUS_TRANSFORM_FAILURE);
    assert!(error.to_string().contains("Control"));
}

#[test]
fn test_deltaGenerationError_shouldCarryEngineStatus() {
    let error = EmbedError::DeltaGeneration {
        operation: "generate transform",
        source: DatabaseError::OutputExists(PathBuf::from("/tmp/CELT1.mst")),
    };
    assert_eq!(error.status_code(), Some(STATUS_FILE_EXISTS));
    assert!(error.to_string().starts_with("error at generate transform: "));
}

#[test]
fn test_usageError_shouldHaveNoStatus() {
    let error = EmbedError::Usage("Language identifier must not be empty".to_string());
    assert_eq!(error.operation(), "usage");
    assert_eq!(error.status_code(), None);
    assert_eq!(error.to_string(), "error at usage: Language identifier must not be empty");
}

#[test]
fn test_ioError_shouldPreferOsCode() {
    let error = DatabaseError::Io(std::io::Error::from_raw_os_error(13));
    assert_eq!(error.status_code(), 13);
}
