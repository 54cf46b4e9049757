//! Logging backend
//!
//! Every crate of the workspace logs through the `log` facade.
//! This module installs a `fern` dispatcher writing to the terminal
//! and, unless disabled, to a log file (optionally rotated per day).

use std::{fs, path::Path, str::FromStr};

use anyhow::{Context, Result};
use fern::colors::{Color, ColoredLevelConfig};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

pub const DEFAULT_LOGS_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

// Per module level override, e.g. to silence a noisy dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleConfig {
    pub module: String,
    pub level: LogLevel,
}

// Written `module=level` on the command line
impl FromStr for ModuleConfig {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (module, level) = value
            .split_once('=')
            .ok_or_else(|| format!("expected MODULE=LEVEL, got '{value}'"))?;
        let module = module.trim();
        if module.is_empty() {
            return Err(format!("no module in '{value}'"));
        }

        let level = LogLevel::from_str(level.trim())
            .map_err(|_| format!("invalid log level '{}'", level.trim()))?;
        Ok(Self {
            module: module.to_string(),
            level,
        })
    }
}

pub struct LoggerConfig<'a> {
    pub level: LogLevel,
    // Level for the log file, same as `level` when not set
    pub file_level: Option<LogLevel>,
    pub dir_path: &'a str,
    pub filename_log: &'a str,
    pub disable_file_logging: bool,
    // Prefix the file name with the current date and rotate it every day
    pub date_based_file: bool,
    pub disable_colors: bool,
    pub module_logs: Vec<ModuleConfig>,
    pub datetime_format: &'a str,
}

fn colors() -> ColoredLevelConfig {
    ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Cyan)
        .trace(Color::Magenta)
}

/// Install the global logger
///
/// Can only be called once per process, a second call returns an error.
pub fn init_logger(config: LoggerConfig<'_>) -> Result<()> {
    let level: LevelFilter = config.level.into();
    let file_level: LevelFilter = config.file_level.unwrap_or(config.level).into();

    let colors = colors();
    let disable_colors = config.disable_colors;
    let datetime_format = config.datetime_format.to_owned();
    let mut stdout_dispatch = fern::Dispatch::new()
        .format(move |out, message, record| {
            let time = chrono::Local::now().format(&datetime_format);
            if disable_colors {
                out.finish(format_args!(
                    "[{}] [{}] [{}] {}",
                    time,
                    record.level(),
                    record.target(),
                    message
                ))
            } else {
                out.finish(format_args!(
                    "[{}] [{}] [{}] {}",
                    time,
                    colors.color(record.level()),
                    record.target(),
                    message
                ))
            }
        })
        .level(level)
        .chain(std::io::stdout());

    for module in config.module_logs.iter() {
        stdout_dispatch = stdout_dispatch.level_for(module.module.clone(), module.level.into());
    }

    let mut base = fern::Dispatch::new()
        .level(level.max(file_level))
        .chain(stdout_dispatch);

    if !config.disable_file_logging {
        fs::create_dir_all(config.dir_path)
            .with_context(|| format!("Error while creating logs directory {}", config.dir_path))?;

        let datetime_format = config.datetime_format.to_owned();
        let file_dispatch = fern::Dispatch::new()
            .format(move |out, message, record| {
                out.finish(format_args!(
                    "[{}] [{}] [{}] {}",
                    chrono::Local::now().format(&datetime_format),
                    record.level(),
                    record.target(),
                    message
                ))
            })
            .level(file_level);

        let file_dispatch = if config.date_based_file {
            let dir = Path::new(config.dir_path).to_string_lossy().into_owned();
            let dir = if dir.ends_with('/') { dir } else { format!("{dir}/") };
            file_dispatch.chain(fern::DateBased::new(
                dir,
                format!("%Y-%m-%d.{}", config.filename_log),
            ))
        } else {
            let path = Path::new(config.dir_path).join(config.filename_log);
            let file = fern::log_file(&path)
                .with_context(|| format!("Error while opening log file {}", path.display()))?;
            file_dispatch.chain(file)
        };

        base = base.chain(file_dispatch);
    }

    base.apply().context("Error while installing the logger")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(LogLevel::from_str("debug").unwrap(), LogLevel::Debug);
        assert_eq!(LogLevel::from_str("WARN").unwrap(), LogLevel::Warn);
        assert!(LogLevel::from_str("verbose").is_err());
        assert_eq!(LogLevel::default().to_string(), "info");
    }

    #[test]
    fn test_log_level_serde() {
        let level: LogLevel = serde_json::from_str("\"trace\"").unwrap();
        assert_eq!(level, LogLevel::Trace);
        assert_eq!(serde_json::to_string(&LogLevel::Off).unwrap(), "\"off\"");
    }

    #[test]
    fn test_module_config_parsing() {
        let config = ModuleConfig::from_str("reqwest = warn").unwrap();
        assert_eq!(
            config,
            ModuleConfig {
                module: "reqwest".into(),
                level: LogLevel::Warn
            }
        );
        assert!(ModuleConfig::from_str("reqwest").is_err());
        assert!(ModuleConfig::from_str("=debug").is_err());
        assert!(ModuleConfig::from_str("reqwest=loud").is_err());
    }

    // The only test installing the global logger of this crate
    #[test]
    fn test_date_based_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let dir_path = format!("{}/", dir.path().display());
        init_logger(LoggerConfig {
            level: LogLevel::Off,
            file_level: Some(LogLevel::Info),
            dir_path: &dir_path,
            filename_log: "test.log",
            disable_file_logging: false,
            date_based_file: true,
            disable_colors: true,
            module_logs: vec![ModuleConfig {
                module: "noisy".into(),
                level: LogLevel::Off,
            }],
            datetime_format: DEFAULT_LOGS_DATETIME_FORMAT,
        })
        .unwrap();

        log::info!("written to the dated file");
        log::debug!("below the file level");
        log::logger().flush();

        let today = chrono::Local::now().format("%Y-%m-%d");
        let content = fs::read_to_string(dir.path().join(format!("{today}.test.log"))).unwrap();
        assert!(content.contains("[INFO]"));
        assert!(content.contains("written to the dated file"));
        assert!(!content.contains("below the file level"));
    }

    #[test]
    fn test_level_filter_conversion() {
        assert_eq!(LevelFilter::from(LogLevel::Off), LevelFilter::Off);
        assert_eq!(LevelFilter::from(LogLevel::Trace), LevelFilter::Trace);
    }
}
