//! CLI command definitions

use crate::core::{ConfigError, RunConfig, Settings};
use clap::Args;
use std::path::{Path, PathBuf};

/// Run the full WRF chain
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to the control file
    #[arg(short, long)]
    pub control: PathBuf,

    /// Force debug mode: render and stage everything, submit nothing
    #[arg(long)]
    pub debug: bool,

    /// Control file overrides (key=value)
    #[arg(long = "set", value_parser = parse_key_value)]
    pub overrides: Vec<(String, String)>,

    /// Don't save the run to history
    #[arg(long)]
    pub no_history: bool,
}

impl RunCommand {
    pub fn load_config(&self) -> Result<RunConfig, ConfigError> {
        load_config(&self.control, &self.overrides, self.debug)
    }
}

/// Validate a control file
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to the control file
    #[arg(short, long)]
    pub control: PathBuf,

    /// Control file overrides (key=value)
    #[arg(long = "set", value_parser = parse_key_value)]
    pub overrides: Vec<(String, String)>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

impl ValidateCommand {
    pub fn load_config(&self) -> Result<RunConfig, ConfigError> {
        load_config(&self.control, &self.overrides, false)
    }
}

/// Show run history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Run name to filter by (`<modeldata>-<starttime>`)
    #[arg(short, long)]
    pub run: Option<String>,

    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Show full details
    #[arg(long)]
    pub verbose: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a specific run by execution ID
    #[arg(long)]
    pub execution_id: Option<String>,
}

/// Read the control file, apply overrides, then validate
pub fn load_config(
    control: &Path,
    overrides: &[(String, String)],
    force_debug: bool,
) -> Result<RunConfig, ConfigError> {
    let mut settings = Settings::from_file(control)?;
    for (key, value) in overrides {
        settings.set(key.clone(), value.clone());
    }
    if force_debug {
        settings.set("debugmode", "1");
    }
    RunConfig::from_settings(&settings)
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("Invalid key=value pair: {}", s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::tests::CONTROL;
    use tempfile::tempdir;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("wrfdir=/scratch/wrf").unwrap(),
            ("wrfdir".to_string(), "/scratch/wrf".to_string())
        );
        assert_eq!(
            parse_key_value("unipost_out=").unwrap(),
            ("unipost_out".to_string(), String::new())
        );
        assert!(parse_key_value("=1").is_err());
        assert!(parse_key_value("debugmode").is_err());
    }

    #[test]
    fn test_overrides_apply_before_validation() {
        let dir = tempdir().unwrap();
        let control = dir.path().join("control.txt");
        std::fs::write(&control, CONTROL).unwrap();

        let overrides = vec![("rundays".to_string(), "3".to_string())];
        let config = load_config(&control, &overrides, true).unwrap();
        assert_eq!(config.run_days, 3);
        assert!(config.debug_mode);

        let bad = vec![("starttime".to_string(), "tomorrow".to_string())];
        assert!(load_config(&control, &bad, false).is_err());
    }
}
