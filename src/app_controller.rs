use log::{debug, info, warn};
use std::path::PathBuf;

use crate::app_config::EmbedConfig;
use crate::database::{PackageEngine, SqliteEngine};
use crate::delta_generator;
use crate::errors::EmbedError;
use crate::file_utils::TransientTransform;
use crate::language_utils;
use crate::metadata_merger::{self, MergeReport};

// @module: Application controller for embedding language transforms

/// One embedding run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedRequest {
    /// Package that is both the transform base and the embedding target
    pub target_path: PathBuf,
    /// Localized package the transform leads to
    pub source_path: PathBuf,
    /// Storage entry name and language list token
    pub language_id: String,
}

/// Main application controller
pub struct Controller<E: PackageEngine> {
    // @field: Package database engine
    engine: E,
    // @field: App configuration
    config: EmbedConfig,
}

impl Controller<SqliteEngine> {
    // @method: Controller over package files on disk
    pub fn with_config(config: EmbedConfig) -> Self {
        Self::new(SqliteEngine::new(), config)
    }
}

impl<E: PackageEngine> Controller<E> {
    // @method: Controller over an arbitrary engine
    pub fn new(engine: E, config: EmbedConfig) -> Self {
        Self { engine, config }
    }

    /// Generate the transform and embed it into the target
    ///
    /// The temporary transform is removed on every exit path unless
    /// `keep_temp_on_failure` is set and the run fails.
    pub fn run(&self, request: &EmbedRequest) -> Result<MergeReport, EmbedError> {
        language_utils::validate_language_identifier(&request.language_id)
            .map_err(|e| EmbedError::Usage(e.to_string()))?;

        info!(
            "Embedding {:?} transform from {:?} into {:?}",
            request.language_id, request.source_path, request.target_path
        );

        let transform = TransientTransform::create(&self.config.temp_prefix)?;

        match self.run_with_transform(request, &transform) {
            Ok(report) => {
                transform.remove()?;
                Ok(report)
            }
            Err(e) => {
                if self.config.keep_temp_on_failure {
                    if let Some(path) = transform.keep() {
                        warn!("Kept temporary transform for diagnosis: {:?}", path);
                    }
                }
                Err(e)
            }
        }
    }

    fn run_with_transform(
        &self,
        request: &EmbedRequest,
        transform: &TransientTransform,
    ) -> Result<MergeReport, EmbedError> {
        let target = self
            .engine
            .open_transacted(&request.target_path)
            .map_err(|error| EmbedError::DatabaseOpen {
                operation: "open target",
                source: error,
            })?;

        let source = self
            .engine
            .open_read_only(&request.source_path)
            .map_err(|error| EmbedError::DatabaseOpen {
                operation: "open source",
                source: error,
            })?;

        delta_generator::generate_transform(&self.engine, &source, &target, transform.path())?;
        drop(source);

        debug!("Merging transform into {:?}", request.target_path);
        metadata_merger::merge_into_target(
            &self.engine,
            target,
            &request.language_id,
            transform.path(),
            self.config.match_policy,
        )
    }
}
