/*!
 * # langembed - embed language transforms into installer packages
 *
 * A Rust library and tool that computes the delta between a base installer
 * package and a localized variant of it, embeds that delta into the base
 * under a language identifier, and registers the identifier in the package's
 * language list, so the base can be patched into the localized variant at
 * install time.
 *
 * ## Features
 *
 * - Table- and row-level transforms between two package databases
 * - Transforms stamped with fingerprints of the packages they came from
 * - Insert-or-overwrite embedding: one storage entry per language
 * - Idempotent, append-only language list updates
 * - Storage entry and header edit committed as one transaction
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `app_controller`: Runs one embedding from start to finish
 * - `delta_generator`: Transform generation stage
 * - `metadata_merger`: Embedding and language registration stage
 * - `language_utils`: Language list parsing and merging
 * - `file_utils`: Temporary transform file handling
 * - `database`: Package database engines:
 *   - `database::engine`: SQLite-backed engine
 *   - `database::memory`: In-memory engine for tests
 *   - `database::transform`: Transform format and delta computation
 * - `errors`: Custom error types for the application
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod database;
pub mod delta_generator;
pub mod errors;
pub mod file_utils;
pub mod language_utils;
pub mod metadata_merger;

// Re-export main types for easier usage
pub use app_config::{EmbedConfig, LogLevel, MatchPolicy};
pub use app_controller::{Controller, EmbedRequest};
pub use database::{MemoryEngine, PackageEngine, SqliteEngine};
pub use errors::{DatabaseError, EmbedError};
pub use language_utils::{LanguageMerge, merge_language};
pub use metadata_merger::MergeReport;
