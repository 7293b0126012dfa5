//! Typed run configuration, built once from the control file settings

use crate::core::model_data::ModelDataSource;
use crate::core::settings::Settings;
use chrono::{Duration as ChronoDuration, NaiveDateTime};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Error types for configuration loading and validation
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read control file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML control file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Control file {} defines no settings", .0.display())]
    Empty(PathBuf),

    #[error("Required setting '{0}' is missing")]
    Missing(String),

    #[error("Setting '{key}' has invalid value '{value}': {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Model data source '{0}' is not defined in the program")]
    UnknownModelData(String),
}

/// Node/processor layout for one batch job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobResources {
    pub nodes: u32,
    pub processors: u32,
    pub walltime: Option<String>,
}

impl JobResources {
    /// Total MPI ranks (nodes x processors per node)
    pub fn mpi_total(&self) -> u64 {
        u64::from(self.nodes) * u64::from(self.processors)
    }
}

/// Output format written by the Unified Post Processor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnipostOutput {
    Grib,
    Grib2,
}

/// Post-processing mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PostProcessing {
    /// Run unipost.exe over every wrfout file in a single job
    Unipost {
        output: UnipostOutput,
        resources: JobResources,
    },
    /// Python post-processing runs outside of this program
    Python,
}

/// Validated run configuration
#[derive(Debug, Clone, Serialize)]
pub struct RunConfig {
    pub start_time: NaiveDateTime,
    pub run_days: u32,
    pub run_hours: u32,
    pub model_data: ModelDataSource,

    pub data_dir: PathBuf,
    pub wrf_dir: PathBuf,
    pub geog_dir: PathBuf,
    pub table_dir: PathBuf,
    pub wrf_module: String,

    pub template_dir: PathBuf,
    pub run_files_dir: PathBuf,
    pub vtable_dir: PathBuf,
    pub upp_dir: PathBuf,

    /// Dry-run: never submit jobs or wait on them
    pub debug_mode: bool,
    pub run_geogrid: bool,
    pub post_processing: Option<PostProcessing>,

    pub geogrid: JobResources,
    pub metgrid: JobResources,
    pub real: JobResources,
    pub wrf: JobResources,

    /// Deadline for a job's log to appear (seconds), unbounded when absent
    pub appearance_timeout_secs: Option<u64>,
    /// Deadline for a job to report completion (seconds), unbounded when absent
    pub completion_timeout_secs: Option<u64>,
    /// Upper bound for one shell probe (seconds)
    pub probe_timeout_secs: u64,
    /// Upper bound for one `qsub` invocation (seconds)
    pub submit_timeout_secs: u64,

    pub fetch_workers: usize,
}

impl RunConfig {
    /// Load, parse and validate a control file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Settings::from_file(path)?;
        Self::from_settings(&settings)
    }

    /// Build the typed configuration from raw settings
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let start_time = parse_start_time(required(settings, "starttime")?)?;
        let model_data = ModelDataSource::from_name(required(settings, "modeldata")?)?;

        let post_processing = if flag(settings, "run_postprocessing")? {
            Some(post_processing(settings)?)
        } else {
            None
        };

        let fetch_workers = optional_number(settings, "fetch_workers")?.unwrap_or(6);
        if fetch_workers == 0 {
            return Err(ConfigError::Invalid {
                key: "fetch_workers".to_string(),
                value: "0".to_string(),
                reason: "at least one worker is required".to_string(),
            });
        }

        let run_days = number(settings, "rundays")?;
        let run_hours = number(settings, "runhours")?;
        if run_end(start_time, run_days, run_hours).is_none() {
            return Err(ConfigError::Invalid {
                key: "rundays".to_string(),
                value: run_days.to_string(),
                reason: format!(
                    "a run of {} days {} hours ends past the last representable date",
                    run_days, run_hours
                ),
            });
        }

        Ok(RunConfig {
            start_time,
            run_days,
            run_hours,
            model_data,
            data_dir: required(settings, "datadir")?.into(),
            wrf_dir: required(settings, "wrfdir")?.into(),
            geog_dir: required(settings, "geogdir")?.into(),
            table_dir: required(settings, "tabledir")?.into(),
            wrf_module: required(settings, "wrfmodule")?.to_string(),
            template_dir: settings.fetch("templatedir").unwrap_or("templates").into(),
            run_files_dir: settings.fetch("runfilesdir").unwrap_or("run_files").into(),
            vtable_dir: settings.fetch("vtabledir").unwrap_or("vtables").into(),
            upp_dir: settings.fetch("uppdir").unwrap_or("post/UPP").into(),
            debug_mode: flag(settings, "debugmode")?,
            run_geogrid: flag(settings, "run_geogrid")?,
            post_processing,
            geogrid: job_resources(settings, "geogrid", true)?,
            metgrid: job_resources(settings, "metgrid", true)?,
            real: job_resources(settings, "real", true)?,
            wrf: job_resources(settings, "wrf", true)?,
            appearance_timeout_secs: optional_number(settings, "appearance_timeout")?,
            completion_timeout_secs: optional_number(settings, "completion_timeout")?,
            probe_timeout_secs: command_timeout(settings, "probe_timeout", 60)?,
            submit_timeout_secs: command_timeout(settings, "submit_timeout", 120)?,
            fetch_workers,
        })
    }

    /// Saturates at the last representable date for hand-built configs
    pub fn end_time(&self) -> NaiveDateTime {
        run_end(self.start_time, self.run_days, self.run_hours).unwrap_or(NaiveDateTime::MAX)
    }

    /// Start time in the control file format (YYYYMMDDHH)
    pub fn start_stamp(&self) -> String {
        self.start_time.format("%Y%m%d%H").to_string()
    }

    /// Directory holding every artifact of this run: `<wrfdir>/<YYYYMMDD>`
    pub fn run_dir(&self) -> PathBuf {
        self.wrf_dir
            .join(self.start_time.format("%Y%m%d").to_string())
    }

    pub fn output_dir(&self) -> PathBuf {
        self.run_dir().join("output")
    }

    pub fn post_dir(&self) -> PathBuf {
        self.run_dir().join("postprd")
    }

    /// Downloaded model data: `<datadir>/<modeldata>/<starttime>`
    pub fn model_data_dir(&self) -> PathBuf {
        self.data_dir
            .join(self.model_data.name())
            .join(self.start_stamp())
    }

    /// Name used in run history
    pub fn run_name(&self) -> String {
        format!("{}-{}", self.model_data.name(), self.start_stamp())
    }

    pub fn appearance_timeout(&self) -> Option<Duration> {
        self.appearance_timeout_secs.map(Duration::from_secs)
    }

    pub fn completion_timeout(&self) -> Option<Duration> {
        self.completion_timeout_secs.map(Duration::from_secs)
    }
}

fn run_end(start: NaiveDateTime, days: u32, hours: u32) -> Option<NaiveDateTime> {
    start
        .checked_add_signed(ChronoDuration::days(i64::from(days)))?
        .checked_add_signed(ChronoDuration::hours(i64::from(hours)))
}

/// Subprocess timeout in seconds; zero would fail every call
fn command_timeout(settings: &Settings, key: &str, default: u64) -> Result<u64, ConfigError> {
    match optional_number(settings, key)? {
        None => Ok(default),
        Some(0) => Err(ConfigError::Invalid {
            key: key.to_string(),
            value: "0".to_string(),
            reason: "timeout must be at least one second".to_string(),
        }),
        Some(secs) => Ok(secs),
    }
}

fn required<'a>(settings: &'a Settings, key: &str) -> Result<&'a str, ConfigError> {
    match settings.fetch(key) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(key.to_string())),
    }
}

fn number<T: FromStr>(settings: &Settings, key: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    let value = required(settings, key)?;
    parse_number(key, value)
}

fn optional_number<T: FromStr>(settings: &Settings, key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match settings.fetch(key) {
        Some(value) if !value.is_empty() => parse_number(key, value).map(Some),
        _ => Ok(None),
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// 0/1 toggles; an absent flag is off
fn flag(settings: &Settings, key: &str) -> Result<bool, ConfigError> {
    match settings.fetch(key) {
        None | Some("") | Some("0") => Ok(false),
        Some("1") => Ok(true),
        Some(other) => Err(ConfigError::Invalid {
            key: key.to_string(),
            value: other.to_string(),
            reason: "expected 0 or 1".to_string(),
        }),
    }
}

fn parse_start_time(value: &str) -> Result<NaiveDateTime, ConfigError> {
    let invalid = |reason: &str| ConfigError::Invalid {
        key: "starttime".to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    };

    if value.len() != 10 || !value.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid("expected YYYYMMDDHH"));
    }
    // chrono needs minutes to build a full timestamp
    NaiveDateTime::parse_from_str(&format!("{}00", value), "%Y%m%d%H%M")
        .map_err(|e| invalid(&e.to_string()))
}

fn job_resources(
    settings: &Settings,
    job: &str,
    with_walltime: bool,
) -> Result<JobResources, ConfigError> {
    let walltime = if with_walltime {
        Some(required(settings, &format!("{}_walltime", job))?.to_string())
    } else {
        None
    };
    Ok(JobResources {
        nodes: number(settings, &format!("num_{}_nodes", job))?,
        processors: number(settings, &format!("num_{}_processors", job))?,
        walltime,
    })
}

fn post_processing(settings: &Settings) -> Result<PostProcessing, ConfigError> {
    let unipost = flag(settings, "post_run_unipost")?;
    let python = flag(settings, "post_run_python")?;

    match (unipost, python) {
        (true, true) => Err(ConfigError::Invalid {
            key: "post_run_python".to_string(),
            value: "1".to_string(),
            reason: "unipost and python post-processing are mutually exclusive".to_string(),
        }),
        (false, false) => Err(ConfigError::Missing(
            "post_run_unipost or post_run_python".to_string(),
        )),
        (false, true) => Ok(PostProcessing::Python),
        (true, false) => {
            let output = match required(settings, "unipost_out")? {
                "grib" => UnipostOutput::Grib,
                "grib2" => UnipostOutput::Grib2,
                other => {
                    return Err(ConfigError::Invalid {
                        key: "unipost_out".to_string(),
                        value: other.to_string(),
                        reason: "expected grib or grib2".to_string(),
                    })
                }
            };
            Ok(PostProcessing::Unipost {
                output,
                resources: job_resources(settings, "upp", false)?,
            })
        }
    }
}
