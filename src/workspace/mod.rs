//! Run directory layout, input staging and cleanup

pub mod cleanup;

use crate::core::{ReplacementKeys, RunConfig, TemplateError, TemplateWriter, UnipostOutput};
use globset::Glob;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

pub use cleanup::{Cleaner, CleanupCategory, CleanupProfile, FsCleaner};

/// Marker the generated UPP job appends to its log once every file is processed
pub const UPP_SUCCESS_MARKER: &str = "UPP JOB COMPLETE";

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid file pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error(transparent)]
    Template(#[from] TemplateError),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StagingError + '_ {
    move |source| StagingError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Directories a run works in
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunDirs {
    pub run_dir: PathBuf,
    pub output_dir: PathBuf,
    pub post_dir: PathBuf,
    pub model_data_dir: PathBuf,
}

impl RunDirs {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            run_dir: config.run_dir(),
            output_dir: config.output_dir(),
            post_dir: config.post_dir(),
            model_data_dir: config.model_data_dir(),
        }
    }

    /// Create the run, output, post-processing and model data directories
    pub fn create(&self) -> Result<(), StagingError> {
        for dir in [
            &self.run_dir,
            &self.output_dir,
            &self.post_dir,
            &self.model_data_dir,
        ] {
            std::fs::create_dir_all(dir).map_err(io_error(dir))?;
        }
        debug!("Created run directories under {}", self.run_dir.display());
        Ok(())
    }
}

/// Entries of `dir` whose file name matches `pattern`, sorted; a missing directory has none
pub fn matching_entries(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>, StagingError> {
    let matcher = Glob::new(pattern)
        .map_err(|source| StagingError::Pattern {
            pattern: pattern.to_string(),
            source,
        })?
        .compile_matcher();

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(StagingError::Io {
                path: dir.to_path_buf(),
                source,
            })
        }
    };

    let mut matches: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| matcher.is_match(entry.file_name()))
        .map(|entry| entry.path())
        .collect();
    matches.sort();
    Ok(matches)
}

/// Copy every regular file in `source_dir` matching `pattern` into `dest_dir`
pub fn copy_matching(
    source_dir: &Path,
    pattern: &str,
    dest_dir: &Path,
) -> Result<usize, StagingError> {
    let mut copied = 0;
    for source in matching_entries(source_dir, pattern)? {
        if !source.is_file() {
            continue;
        }
        let Some(name) = source.file_name() else {
            continue;
        };
        let dest = dest_dir.join(name);
        std::fs::copy(&source, &dest).map_err(io_error(&source))?;
        copied += 1;
    }
    debug!(
        "Copied {} file(s) matching {} from {} to {}",
        copied,
        pattern,
        source_dir.display(),
        dest_dir.display()
    );
    Ok(copied)
}

/// `ln -sf source dest`
pub fn force_symlink(source: &Path, dest: &Path) -> Result<(), StagingError> {
    match std::fs::symlink_metadata(dest) {
        Ok(_) => std::fs::remove_file(dest).map_err(io_error(dest))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(StagingError::Io {
                path: dest.to_path_buf(),
                source,
            })
        }
    }
    std::os::unix::fs::symlink(source, dest).map_err(io_error(dest))
}

/// Filesystem work a stage does right before its job is submitted
#[derive(Debug, Clone)]
pub enum StagingAction {
    /// Delete files in `dir` matching `pattern`
    RemoveMatching { dir: PathBuf, pattern: String },
    /// Symlink `source` into `dest_dir` under its own name
    Link { source: PathBuf, dest_dir: PathBuf },
    /// Symlink every entry of `source_dir` into `dest_dir`
    LinkAll { source_dir: PathBuf, dest_dir: PathBuf },
    /// Render the UPP job over the wrfout files present at submission time
    RenderUppJob(UppJobPlan),
}

impl StagingAction {
    pub fn apply(&self) -> Result<(), StagingError> {
        match self {
            StagingAction::RemoveMatching { dir, pattern } => {
                for path in matching_entries(dir, pattern)? {
                    debug!("Removing {}", path.display());
                    std::fs::remove_file(&path).map_err(io_error(&path))?;
                }
                Ok(())
            }
            StagingAction::Link { source, dest_dir } => {
                let name = source.file_name().unwrap_or(source.as_os_str());
                force_symlink(source, &dest_dir.join(name))
            }
            StagingAction::LinkAll {
                source_dir,
                dest_dir,
            } => {
                for source in matching_entries(source_dir, "*")? {
                    if let Some(name) = source.file_name() {
                        force_symlink(&source, &dest_dir.join(name))?;
                    }
                }
                Ok(())
            }
            StagingAction::RenderUppJob(plan) => plan.render(),
        }
    }
}

/// Inputs for the single UPP job covering every wrfout file
#[derive(Debug, Clone)]
pub struct UppJobPlan {
    pub template: PathBuf,
    pub dest: PathBuf,
    pub output_dir: PathBuf,
    pub output: UnipostOutput,
    pub mpi_total: u64,
    pub writer: TemplateWriter,
}

impl UppJobPlan {
    /// Job body: one itag + unipost.exe run per wrfout file, then the success marker
    pub fn job_contents(&self, wrfout_files: &[PathBuf]) -> String {
        let mut contents = String::from("echo \"Starting UPP\" > upp.log\n");
        for file in wrfout_files {
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            // wrfout_d01_2018-06-01_00:00:00
            let domain = name.get(7..10).unwrap_or("d01");
            let stamp = name
                .len()
                .checked_sub(19)
                .and_then(|start| name.get(start..))
                .unwrap_or_default();
            let log_name = format!(
                "unipost_log_{}_{}.log",
                domain,
                stamp.replace('-', "_")
            );

            contents.push_str("cat > itag <<EOF\n");
            contents.push_str(&format!("{}\nnetcdf\n", file.display()));
            if self.output == UnipostOutput::Grib2 {
                contents.push_str("grib2\n");
            }
            contents.push_str(&format!("{}\nNCAR\nEOF\n", stamp));
            contents.push_str(&format!(
                "mpirun -np {} unipost.exe > {} || {{ echo \"unipost.exe error on {}\" >> upp.log; exit 1; }}\n",
                self.mpi_total, log_name, name
            ));
        }
        contents.push_str(&format!("echo \"{}\" >> upp.log\n", UPP_SUCCESS_MARKER));
        contents
    }

    pub fn render(&self) -> Result<(), StagingError> {
        let files = matching_entries(&self.output_dir, "wrfout*")?;
        info!("Running UPP on {} wrfout file(s)", files.len());

        let mut extra = ReplacementKeys::default();
        extra.insert("upp_job_contents", self.job_contents(&files));
        self.writer.generate(&self.template, &self.dest, &extra)?;
        Ok(())
    }
}

/// Shell script running ungrib.exe once per model file extension
pub fn ungrib_job_script(
    config: &RunConfig,
    extensions: &[&str],
    vtables: &[&str],
) -> String {
    let mut script = String::from("#!/bin/sh\n");
    script.push_str(&format!("module add {}\n", config.wrf_module));
    script.push_str(&format!("cd {}\n", config.run_dir().display()));
    script.push_str(&format!(
        "link_grib.csh {}/\n",
        config.model_data_dir().display()
    ));
    script.push_str(": > ungrib.out\n");
    for (ext, vtable) in extensions.iter().zip(vtables) {
        script.push_str(&format!("cp {} Vtable\n", vtable));
        script.push_str(&format!("cp namelist.wps.{} namelist.wps\n", ext));
        script.push_str(&format!(
            "ungrib.exe >> ungrib.out 2>&1 || {{ echo \"ungrib.exe error ({})\" >> ungrib.out; exit 1; }}\n",
            ext
        ));
    }
    script.push_str("echo \"UNGRIB JOB COMPLETE\" >> ungrib.out\n");
    script
}
