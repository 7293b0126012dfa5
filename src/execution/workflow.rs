//! The `run` command: prepare the run directory, then hand the stages to the controller

use crate::core::{ProbeExecutor, ReplacementKeys, RunConfig, TemplateError, TemplateWriter};
use crate::execution::catalog::standard_stages;
use crate::execution::controller::PipelineController;
use crate::fetch::{Downloader, FetchError, FetchPlan, FetchReport};
use crate::scheduler::JobScheduler;
use crate::workspace::{
    copy_matching, ungrib_job_script, Cleaner, CleanupProfile, FsCleaner, RunDirs, StagingError,
};
use indicatif::ProgressBar;
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Failures before the first stage is submitted
#[derive(Debug, Error)]
pub enum PreparationError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Staging(#[from] StagingError),
}

/// Job files rendered from `<name>.template` into the run directory
pub const JOB_TEMPLATES: [&str; 4] = ["geogrid.job", "metgrid.job", "real.job", "wrf.job"];

/// One configured run
pub struct Workflow<'a> {
    config: &'a RunConfig,
    dirs: RunDirs,
    writer: TemplateWriter,
}

impl<'a> Workflow<'a> {
    pub fn new(config: &'a RunConfig) -> Self {
        Self {
            config,
            dirs: RunDirs::from_config(config),
            writer: TemplateWriter::new(ReplacementKeys::from_config(config)),
        }
    }

    pub fn dirs(&self) -> &RunDirs {
        &self.dirs
    }

    pub fn writer(&self) -> &TemplateWriter {
        &self.writer
    }

    /// Filesystem cleaner for this run's directories; debug runs only log
    pub fn cleaner(&self) -> FsCleaner {
        FsCleaner::new(self.dirs.clone()).dry_run(self.config.debug_mode)
    }

    /// Purge the previous run, create directories, fetch model data, render
    /// templates and stage inputs
    pub async fn prepare<D, C>(
        &self,
        downloader: &D,
        cleaner: &C,
        progress: &ProgressBar,
    ) -> Result<FetchReport, PreparationError>
    where
        D: Downloader + ?Sized,
        C: Cleaner + ?Sized,
    {
        info!("Preparing run in {}", self.dirs.run_dir.display());
        cleaner.clean(&CleanupProfile::PRE_RUN);
        self.dirs.create()?;

        let report = FetchPlan::from_config(self.config)
            .run(downloader, progress)
            .await
            .into_result()?;

        self.render_templates()?;
        self.stage_inputs()?;
        Ok(report)
    }

    /// One `namelist.wps.<ext>` per model file extension, `namelist.input`
    /// and the stage job files
    pub fn render_templates(&self) -> Result<(), PreparationError> {
        let templates = &self.config.template_dir;
        let model = self.config.model_data;
        let none = ReplacementKeys::default();

        for ext in model.file_extensions() {
            let mut extra = ReplacementKeys::default();
            extra.insert("ungrib_prefix", ext);
            extra.insert("fg_name", model.fg_name());
            self.writer.generate(
                &templates.join("namelist.wps.template"),
                &self.dirs.run_dir.join(format!("namelist.wps.{}", ext)),
                &extra,
            )?;
        }

        self.writer.generate(
            &templates.join("namelist.input.template"),
            &self.dirs.output_dir.join("namelist.input"),
            &none,
        )?;

        for job in JOB_TEMPLATES {
            self.writer.generate(
                &templates.join(format!("{}.template", job)),
                &self.dirs.run_dir.join(job),
                &none,
            )?;
        }
        info!("Rendered templates from {}", templates.display());
        Ok(())
    }

    /// Run tables into the output directory, Vtables and the ungrib job into the run directory
    pub fn stage_inputs(&self) -> Result<(), PreparationError> {
        let model = self.config.model_data;

        let tables = copy_matching(&self.config.run_files_dir, "*", &self.dirs.output_dir)?;
        let vtables = copy_matching(
            &self.config.vtable_dir,
            &format!("Vtable.{}*", model.name()),
            &self.dirs.run_dir,
        )?;
        info!(
            "Staged {} run file(s) and {} Vtable(s)",
            tables, vtables
        );

        let script = ungrib_job_script(self.config, model.file_extensions(), model.vtables());
        write_executable(&self.dirs.run_dir.join("ungrib.job"), &script)?;
        Ok(())
    }

    /// Controller over the standard stages of this run
    pub fn controller<S, P, C>(
        &self,
        scheduler: S,
        probes: P,
        cleaner: C,
    ) -> PipelineController<S, P, C>
    where
        S: JobScheduler,
        P: ProbeExecutor,
        C: Cleaner,
    {
        PipelineController::new(
            standard_stages(self.config, &self.writer),
            scheduler,
            probes,
            cleaner,
        )
        .with_debug_mode(self.config.debug_mode)
        .with_run_name(self.config.run_name())
    }
}

fn write_executable(path: &Path, contents: &str) -> Result<(), StagingError> {
    let io_error = |source: std::io::Error| StagingError::Io {
        path: path.to_path_buf(),
        source,
    };
    std::fs::write(path, contents).map_err(io_error)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
            .map_err(io_error)?;
    }
    Ok(())
}
