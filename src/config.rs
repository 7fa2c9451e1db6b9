//! Command line parameters.

use crate::curve::DEFAULT_MAX_TEMPERATURE;

use std::time::Duration;

use clap::Parser;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error(
        "Setting maximum temperature {requested} above the default {default}. Use --force if this is intentional"
    )]
    ForceRequired { requested: u32, default: u32 },
}

#[derive(Debug, Parser)]
#[command(name = "fanctl", version)]
#[command(about = "Drives GPU fans from a temperature curve", long_about = None)]
pub struct Parameters {
    /// Fan curve: `<TEMP>:<SPEED>` points separated by commas or whitespace, e.g. 35:30,60:70
    #[arg(value_name = "CURVE", default_value = "")]
    pub curve: String,

    /// Seconds between two fan speed updates
    #[arg(
        short = 'n',
        long,
        value_name = "SECONDS",
        default_value_t = 5,
        value_parser = clap::value_parser!(u64).range(1..=5)
    )]
    pub interval_length: u64,

    /// Only log errors
    #[arg(short, long, conflicts_with_all = ["silent", "verbose"])]
    pub quiet: bool,

    /// Log nothing
    #[arg(long, conflicts_with = "verbose")]
    pub silent: bool,

    /// Log debug information
    #[arg(long)]
    pub verbose: bool,

    /// Print `<temperature> <fan speed>` on every update
    #[arg(short, long)]
    pub output_metrics: bool,

    /// Print the fan curve and exit
    #[arg(short, long)]
    pub print_fan_curve: bool,

    /// Don't write a PID file
    #[arg(long)]
    pub no_pidfile: bool,

    /// Highest temperature of the curve, in degrees Celsius
    #[arg(long, value_name = "CELSIUS", default_value_t = DEFAULT_MAX_TEMPERATURE)]
    pub max_temperature: u32,

    /// Allow a maximum temperature above the default
    #[arg(long)]
    pub force: bool,

    /// Enable persistence mode on the device
    #[arg(short = 'P', long, conflicts_with = "print_fan_curve")]
    pub persistence_mode: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Silent,
    Quiet,
    Normal,
    Verbose,
}

impl DiagnosticLevel {
    pub fn filter(self) -> LevelFilter {
        match self {
            DiagnosticLevel::Silent => LevelFilter::OFF,
            DiagnosticLevel::Quiet => LevelFilter::ERROR,
            DiagnosticLevel::Normal => LevelFilter::INFO,
            DiagnosticLevel::Verbose => LevelFilter::DEBUG,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Control,
    PrintFanCurve,
}

impl Parameters {
    /// Checks constraints clap can't express.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_temperature > DEFAULT_MAX_TEMPERATURE && !self.force {
            return Err(ConfigError::ForceRequired {
                requested: self.max_temperature,
                default: DEFAULT_MAX_TEMPERATURE,
            });
        }

        Ok(())
    }

    pub fn diagnostic_level(&self) -> DiagnosticLevel {
        if self.silent {
            DiagnosticLevel::Silent
        } else if self.quiet {
            DiagnosticLevel::Quiet
        } else if self.verbose {
            DiagnosticLevel::Verbose
        } else {
            DiagnosticLevel::Normal
        }
    }

    pub fn mode(&self) -> Mode {
        if self.print_fan_curve {
            Mode::PrintFanCurve
        } else {
            Mode::Control
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_length)
    }

    pub fn use_pidfile(&self) -> bool {
        !self.no_pidfile
    }
}
