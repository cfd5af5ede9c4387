/*!
 * First pipeline stage: write the transform that turns the target into the
 * source and stamp it with validation information.
 */

use log::{debug, info};
use std::path::Path;

use crate::database::PackageEngine;
use crate::errors::EmbedError;

/// Generate and stamp a transform at `transform_path`
///
/// `source` is the reference state, `target` the base the transform applies
/// to. Any failure is fatal; no partial transform is kept in use.
pub fn generate_transform<E: PackageEngine>(
    engine: &E,
    source: &E::Database,
    target: &E::Database,
    transform_path: &Path,
) -> Result<(), EmbedError> {
    debug!("Generating transform into {:?}", transform_path);

    engine
        .generate_delta(source, target, transform_path)
        .map_err(|error| EmbedError::DeltaGeneration {
            operation: "generate transform",
            source: error,
        })?;

    engine
        .create_transform_summary(source, target, transform_path)
        .map_err(|error| EmbedError::DeltaGeneration {
            operation: "create transform summary",
            source: error,
        })?;

    info!("Transform generated: {:?}", transform_path);
    Ok(())
}
