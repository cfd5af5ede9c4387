// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::Result;
use clap::error::ErrorKind;
use clap::{Parser, ValueEnum};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, debug};
use std::io::Write;
use std::path::PathBuf;

use langembed::app_config::{EmbedConfig, LogLevel, MatchPolicy};
use langembed::app_controller::{Controller, EmbedRequest};

/// CLI Wrapper for MatchPolicy to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliMatchPolicy {
    Token,
    Substring,
}

impl From<CliMatchPolicy> for MatchPolicy {
    fn from(cli_policy: CliMatchPolicy) -> Self {
        match cli_policy {
            CliMatchPolicy::Token => MatchPolicy::Token,
            CliMatchPolicy::Substring => MatchPolicy::Substring,
        }
    }
}

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => LogLevel::Error,
            CliLogLevel::Warn => LogLevel::Warn,
            CliLogLevel::Info => LogLevel::Info,
            CliLogLevel::Debug => LogLevel::Debug,
            CliLogLevel::Trace => LogLevel::Trace,
        }
    }
}

/// langembed - embed a language transform into an installer package
///
/// Generates the transform that turns the target package into the source
/// package, stores it inside the target under the language identifier and
/// adds the identifier to the target's language list.
#[derive(Parser, Debug)]
#[command(name = "langembed")]
#[command(version)]
#[command(about = "Embed a language transform into an installer package")]
#[command(long_about = "Generates the transform that turns the target package into the source package,
stores it inside the target under the language identifier and adds the identifier
to the target's language list. Running twice with the same arguments refreshes the
embedded transform without listing the language twice.

EXAMPLES:
    langembed product.pkg product-de.pkg 1031
    langembed --match-policy substring product.pkg product-fr.pkg 1036
    langembed --log-level debug --keep-temp product.pkg product-ja.pkg 1041")]
struct CommandLineOptions {
    /// Package that is both the transform base and the embedding target
    #[arg(value_name = "TARGET_AND_REFERENCE_DATABASE")]
    target: PathBuf,

    /// Localized package the transform leads to
    #[arg(value_name = "SOURCE_DATABASE")]
    source: PathBuf,

    /// Language identifier, e.g. 1031
    #[arg(value_name = "LANGUAGE_IDENTIFIER")]
    language_id: String,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// How an identifier is recognised as already listed
    #[arg(short, long, value_enum)]
    match_policy: Option<CliMatchPolicy>,

    /// Keep the temporary transform file when the run fails
    #[arg(short, long)]
    keep_temp: bool,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: ANSI colour for log level
    fn color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let color = Self::color_for_level(record.level());

            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "{}{} {:<5} {}\x1B[0m",
                color,
                now,
                record.level(),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

fn main() {
    let options = match CommandLineOptions::try_parse() {
        Ok(options) => options,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => e.exit(),
            _ => {
                // Usage errors exit with 1 like every other failure
                let _ = e.print();
                std::process::exit(1);
            }
        },
    };

    if let Err(message) = run(options) {
        eprintln!("{}", message);
        std::process::exit(1);
    }
}

fn run(options: CommandLineOptions) -> Result<(), String> {
    // Trace is the ceiling; the effective level is set once the config is known
    CustomLogger::init(LevelFilter::Trace).map_err(|e| format!("error at init logger: {}", e))?;
    log::set_max_level(LevelFilter::Warn);

    let mut config = match &options.config {
        Some(path) => EmbedConfig::from_file(path).map_err(|e| format!("error at load config: {:#}", e))?,
        None => EmbedConfig::default(),
    };

    // Override config with CLI options if provided
    if let Some(policy) = options.match_policy {
        config.match_policy = policy.into();
    }
    if options.keep_temp {
        config.keep_temp_on_failure = true;
    }
    if let Some(level) = options.log_level {
        config.log_level = level.into();
    }

    config
        .validate()
        .map_err(|e| format!("error at validate config: {:#}", e))?;
    log::set_max_level(config.log_level.to_level_filter());
    debug!("Effective configuration: {:?}", config);

    let request = EmbedRequest {
        target_path: options.target,
        source_path: options.source,
        language_id: options.language_id,
    };

    let controller = Controller::with_config(config);
    controller.run(&request).map_err(|e| e.to_string())?;

    Ok(())
}
