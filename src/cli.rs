//! Command-line interface.

use crate::config::HarnessConfig;
use crate::core::Result;
use crate::logging::LogFormat;
use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Exit code used when the run is interrupted with Ctrl+C.
pub const INTERRUPTED_EXIT_CODE: u8 = 130;

#[derive(Parser, Debug)]
#[command(name = "logos-test")]
#[command(version)]
#[command(about = "Logos Test Example - Loads and tests Logos plugins")]
pub struct Cli {
    /// Path to the modules directory
    #[arg(short = 'm', long = "module-path", value_name = "path")]
    pub module_path: Option<PathBuf>,

    /// Path to the liblogos_core shared library
    #[arg(long, value_name = "path")]
    pub core_lib: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long, value_name = "file")]
    pub config: Option<PathBuf>,

    /// Plugin to load (repeatable); replaces the configured list
    #[arg(short = 'p', long = "plugin", value_name = "name")]
    pub plugins: Vec<String>,

    /// Delay between loading plugins and the messaging step
    #[arg(long, value_name = "ms")]
    pub settle_ms: Option<u64>,

    /// Skip the messaging module step
    #[arg(long)]
    pub no_messaging: bool,

    /// Skip printing plugin method reports
    #[arg(long)]
    pub no_introspect: bool,

    /// Run against the in-process core instead of liblogos_core
    #[arg(long)]
    pub simulate: bool,

    /// More verbose logging (repeatable)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Log output format
    #[arg(long, value_enum, value_name = "format")]
    pub log_format: Option<LogFormat>,
}

impl Cli {
    /// Build the effective configuration: defaults, then the config file,
    /// then flags.
    pub fn to_config(&self) -> Result<HarnessConfig> {
        let mut config = match &self.config {
            Some(path) => HarnessConfig::from_file(path)?,
            None => HarnessConfig::default(),
        };

        if let Some(path) = &self.module_path {
            config.plugins_dir = Some(path.clone());
        }
        if let Some(path) = &self.core_lib {
            config.core_library = Some(path.clone());
        }
        if !self.plugins.is_empty() {
            config.plugins = self.plugins.clone();
        }
        if let Some(ms) = self.settle_ms {
            config.settle_delay_ms = ms;
        }
        if self.no_messaging {
            config.messaging.enabled = false;
        }
        if self.no_introspect {
            config.introspect = false;
        }

        config.logging.level = config.logging.level.more_verbose(self.verbose);
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Map the core's exit code onto a process exit status. Codes that do not
/// fit become a generic failure.
pub fn exit_status(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}
