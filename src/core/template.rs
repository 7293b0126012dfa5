//! Template rendering - `[placeholder]` substitution over static template files

use crate::core::config::RunConfig;
use chrono::{Datelike, Duration, NaiveDateTime, Timelike};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Failed to read template {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn placeholder_regex() -> Option<&'static Regex> {
    static PLACEHOLDER: OnceLock<Option<Regex>> = OnceLock::new();
    PLACEHOLDER
        .get_or_init(|| Regex::new(r"\[[a-z0-9_]+\]").ok())
        .as_ref()
}

/// Placeholder -> value map, assembled once from the run configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplacementKeys {
    keys: BTreeMap<String, String>,
}

impl ReplacementKeys {
    pub fn from_config(config: &RunConfig) -> Self {
        let mut keys = Self::default();
        let start = config.start_time;
        let end = config.end_time();

        keys.insert("run_days", config.run_days);
        keys.insert("run_hours", config.run_hours);
        keys.insert("start_date", start.format("%Y-%m-%d_%H:%M:%S"));
        keys.insert("end_date", end.format("%Y-%m-%d_%H:%M:%S"));
        keys.insert_time("start", start);
        keys.insert_time("end", end);

        keys.insert("wrf_module", &config.wrf_module);
        keys.insert("geog_path", config.geog_dir.display());
        keys.insert("table_path", config.table_dir.display());
        keys.insert("run_dir", config.run_dir().display());
        keys.insert("out_geogrid_path", config.output_dir().display());
        keys.insert("run_output_dir", config.output_dir().display());
        keys.insert("data_dir", config.model_data_dir().display());

        for (job, resources) in [
            ("geogrid", &config.geogrid),
            ("metgrid", &config.metgrid),
            ("real", &config.real),
            ("wrf", &config.wrf),
        ] {
            keys.insert(&format!("num_{}_nodes", job), resources.nodes);
            keys.insert(&format!("num_{}_processors", job), resources.processors);
            if let Some(walltime) = &resources.walltime {
                keys.insert(&format!("{}_walltime", job), walltime);
            }
            keys.insert(&format!("mpi_{}_total", job), resources.mpi_total());
        }

        // Digital filter initialization window
        let dfi_back = start - Duration::hours(1);
        let dfi_fwd = start + Duration::minutes(30);
        keys.insert_time("dfi_back", dfi_back);
        keys.insert("dfi_back_minute", dfi_back.minute());
        keys.insert_time("dfi_fwd", dfi_fwd);
        keys.insert("dfi_fwd_minute", dfi_fwd.minute());

        keys
    }

    /// Insert `[name]`
    pub fn insert(&mut self, name: &str, value: impl ToString) {
        self.keys.insert(format!("[{}]", name), value.to_string());
    }

    /// `[<prefix>_year]` etc, unpadded
    fn insert_time(&mut self, prefix: &str, time: NaiveDateTime) {
        self.insert(&format!("{}_year", prefix), time.year());
        self.insert(&format!("{}_month", prefix), time.month());
        self.insert(&format!("{}_day", prefix), time.day());
        self.insert(&format!("{}_hour", prefix), time.hour());
    }

    pub fn get(&self, placeholder: &str) -> Option<&str> {
        self.keys.get(placeholder).map(String::as_str)
    }

    /// Substitute every known placeholder in `text`
    pub fn replace(&self, text: &str) -> String {
        self.keys
            .iter()
            .fold(text.to_string(), |acc, (key, value)| acc.replace(key, value))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Renders template files with the run's replacement keys
#[derive(Debug, Clone)]
pub struct TemplateWriter {
    keys: ReplacementKeys,
}

impl TemplateWriter {
    pub fn new(keys: ReplacementKeys) -> Self {
        Self { keys }
    }

    pub fn keys(&self) -> &ReplacementKeys {
        &self.keys
    }

    /// Render template text; `extra` keys are applied after the run keys
    pub fn render(&self, text: &str, extra: &ReplacementKeys) -> String {
        extra.replace(&self.keys.replace(text))
    }

    /// Render `template` into `dest`, warning about placeholders left unresolved
    pub fn generate(
        &self,
        template: &Path,
        dest: &Path,
        extra: &ReplacementKeys,
    ) -> Result<(), TemplateError> {
        let text = std::fs::read_to_string(template).map_err(|source| TemplateError::Read {
            path: template.to_path_buf(),
            source,
        })?;

        let rendered = self.render(&text, extra);
        for leftover in unresolved_placeholders(&rendered) {
            warn!(
                template = %template.display(),
                "Unresolved placeholder {} left in {}",
                leftover,
                dest.display()
            );
        }

        std::fs::write(dest, rendered).map_err(|source| TemplateError::Write {
            path: dest.to_path_buf(),
            source,
        })?;
        debug!("Rendered {} -> {}", template.display(), dest.display());
        Ok(())
    }
}

/// Placeholders still present in rendered text
pub fn unresolved_placeholders(text: &str) -> Vec<String> {
    let Some(regex) = placeholder_regex() else {
        return Vec::new();
    };
    let mut found: Vec<String> = regex
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect();
    found.sort();
    found.dedup();
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::tests::settings;
    use tempfile::tempdir;

    fn keys() -> ReplacementKeys {
        ReplacementKeys::from_config(&RunConfig::from_settings(&settings()).unwrap())
    }

    #[test]
    fn test_date_keys() {
        let keys = keys();
        assert_eq!(keys.get("[start_date]"), Some("2018-06-01_00:00:00"));
        assert_eq!(keys.get("[end_date]"), Some("2018-06-02_06:00:00"));
        assert_eq!(keys.get("[start_month]"), Some("6"));
        assert_eq!(keys.get("[end_day]"), Some("2"));
        assert_eq!(keys.get("[end_hour]"), Some("6"));
    }

    #[test]
    fn test_dfi_window() {
        let keys = keys();
        // One hour back from 2018-06-01 00:00 crosses into May
        assert_eq!(keys.get("[dfi_back_month]"), Some("5"));
        assert_eq!(keys.get("[dfi_back_day]"), Some("31"));
        assert_eq!(keys.get("[dfi_back_hour]"), Some("23"));
        assert_eq!(keys.get("[dfi_fwd_hour]"), Some("0"));
        assert_eq!(keys.get("[dfi_fwd_minute]"), Some("30"));
    }

    #[test]
    fn test_path_and_job_keys() {
        let keys = keys();
        assert_eq!(keys.get("[run_dir]"), Some("/scratch/wrf/20180601"));
        assert_eq!(keys.get("[run_output_dir]"), Some("/scratch/wrf/20180601/output"));
        assert_eq!(keys.get("[data_dir]"), Some("/data/model/CFSv2/2018060100"));
        assert_eq!(keys.get("[mpi_wrf_total]"), Some("256"));
        assert_eq!(keys.get("[wrf_walltime]"), Some("48:00:00"));
    }

    #[test]
    fn test_render_applies_extra_keys() {
        let writer = TemplateWriter::new(keys());
        let mut extra = ReplacementKeys::default();
        extra.insert("ungrib_prefix", "3D");

        let rendered = writer.render(" prefix = '[ungrib_prefix]', start = '[start_date]'", &extra);
        assert_eq!(rendered, " prefix = '3D', start = '2018-06-01_00:00:00'");
    }

    #[test]
    fn test_generate_writes_destination() {
        let dir = tempdir().unwrap();
        let template = dir.path().join("real.job.template");
        let dest = dir.path().join("real.job");
        std::fs::write(
            &template,
            "#PBS -l nodes=[num_real_nodes]:ppn=[num_real_processors]\nmpirun -np [mpi_real_total] real.exe\n[mystery]\n",
        )
        .unwrap();

        let writer = TemplateWriter::new(keys());
        writer
            .generate(&template, &dest, &ReplacementKeys::default())
            .unwrap();

        let written = std::fs::read_to_string(&dest).unwrap();
        assert!(written.contains("nodes=2:ppn=16"));
        assert!(written.contains("mpirun -np 32 real.exe"));
        assert_eq!(unresolved_placeholders(&written), vec!["[mystery]"]);
    }

    #[test]
    fn test_missing_template() {
        let dir = tempdir().unwrap();
        let writer = TemplateWriter::new(ReplacementKeys::default());
        let err = writer
            .generate(
                &dir.path().join("nope.template"),
                &dir.path().join("out"),
                &ReplacementKeys::default(),
            )
            .unwrap_err();
        assert!(matches!(err, TemplateError::Read { .. }));
    }
}
