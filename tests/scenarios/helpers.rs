//! Test doubles and fixtures for whole-run scenarios

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use wrf_pipeline::core::{
    ExecutionStatus, LocalProbeExecutor, PipelineState, Probe, ProbeError, ProbeExecutor,
    RunConfig, Settings, StageResult,
};
use wrf_pipeline::execution::{ExecutionEvent, PipelineError, Workflow};
use wrf_pipeline::scheduler::{JobScheduler, SubmitError};
use wrf_pipeline::workspace::{Cleaner, CleanupProfile, RunDirs};

const CONTROL: &str = "\
starttime 2018060100
rundays 1
runhours 6
modeldata CFSv2
geogdir /data/geog
tabledir /data/tables
wrfmodule wrf-3.9.1
num_geogrid_nodes 1
num_geogrid_processors 8
num_metgrid_nodes 2
num_metgrid_processors 8
num_real_nodes 2
num_real_processors 16
num_wrf_nodes 8
num_wrf_processors 32
geogrid_walltime 00:30:00
metgrid_walltime 01:00:00
real_walltime 01:00:00
wrf_walltime 48:00:00
";

const UPP_TEMPLATE: &str = "#!/bin/sh\nmodule add [wrf_module]\n[upp_job_contents]";

/// A run rooted in a temporary directory
pub struct TestRun {
    _root: TempDir,
    pub config: RunConfig,
}

/// Build a run whose wrfdir, datadir and templates live in a fresh tempdir.
/// `overrides` are applied on top of the base control file.
pub fn test_run(overrides: &[(&str, &str)]) -> TestRun {
    let root = tempfile::tempdir().unwrap();
    let templates = root.path().join("templates");
    std::fs::create_dir_all(&templates).unwrap();
    std::fs::write(templates.join("upp.job.template"), UPP_TEMPLATE).unwrap();

    let mut settings = Settings::parse(CONTROL);
    settings.set("wrfdir", root.path().join("wrf").display().to_string());
    settings.set("datadir", root.path().join("data").display().to_string());
    settings.set("templatedir", templates.display().to_string());
    settings.set("uppdir", root.path().join("UPP").display().to_string());
    for (key, value) in overrides {
        settings.set(*key, *value);
    }

    let config = RunConfig::from_settings(&settings).unwrap();
    RunDirs::from_config(&config).create().unwrap();
    TestRun {
        _root: root,
        config,
    }
}

/// Files a fake job writes (relative to its workdir) when submitted
pub type JobOutput = Vec<(&'static str, &'static str)>;

/// Scheduler that "runs" each job by writing its log files immediately
#[derive(Clone, Default)]
pub struct FakeScheduler {
    jobs: HashMap<String, JobOutput>,
    rejected: Option<String>,
    submitted: Arc<Mutex<Vec<String>>>,
}

impl FakeScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every job of the standard chain succeeds
    pub fn succeeding() -> Self {
        Self::new()
            .job("geogrid.job", geogrid_success())
            .job("ungrib.job", ungrib_success())
            .job("metgrid.job", metgrid_success())
            .job("real.job", real_success())
            .job("wrf.job", wrf_success())
            .job("upp.job", upp_success())
    }

    /// Files written when `script` is submitted; replaces earlier output for it
    pub fn job(mut self, script: &str, files: JobOutput) -> Self {
        self.jobs.insert(script.to_string(), files);
        self
    }

    /// A job that is submitted but never writes anything
    pub fn silent(mut self, script: &str) -> Self {
        self.jobs.insert(script.to_string(), Vec::new());
        self
    }

    /// The scheduler refuses `script`
    pub fn reject(mut self, script: &str) -> Self {
        self.rejected = Some(script.to_string());
        self
    }

    pub fn submitted(&self) -> Vec<String> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobScheduler for FakeScheduler {
    async fn submit(&self, script: &Path, workdir: &Path) -> Result<(), SubmitError> {
        let name = script.display().to_string();
        if self.rejected.as_deref() == Some(name.as_str()) {
            return Err(SubmitError::Rejected {
                script: script.to_path_buf(),
                code: 1,
                stderr: "qsub: Unauthorized Request".to_string(),
            });
        }

        self.submitted.lock().unwrap().push(name.clone());
        for (path, contents) in self.jobs.get(&name).into_iter().flatten() {
            let dest = workdir.join(path);
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(dest, contents).unwrap();
        }
        Ok(())
    }
}

/// Probe executor returning scripted outputs for selected probes, one per call
/// (the last one repeats), and reading the filesystem for everything else
#[derive(Clone, Default)]
pub struct ScriptedProbes {
    scripts: HashMap<String, Vec<String>>,
    calls: Arc<Mutex<HashMap<String, usize>>>,
    local: LocalProbeExecutor,
}

impl ScriptedProbes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the outputs of the probe displayed as `probe`, e.g. `tail -n 3 ungrib.out`
    pub fn script(mut self, probe: &str, outputs: &[&str]) -> Self {
        self.scripts.insert(
            probe.to_string(),
            outputs.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    /// How many times a scripted probe was run
    pub fn calls(&self, probe: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(probe)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl ProbeExecutor for ScriptedProbes {
    async fn run(&self, probe: &Probe, workdir: &Path) -> Result<String, ProbeError> {
        let key = probe.to_string();
        let Some(outputs) = self.scripts.get(&key) else {
            return self.local.run(probe, workdir).await;
        };

        let mut calls = self.calls.lock().unwrap();
        let count = calls.entry(key).or_insert(0);
        let output = outputs
            .get(*count)
            .or_else(|| outputs.last())
            .cloned()
            .unwrap_or_default();
        *count += 1;
        Ok(output)
    }
}

/// Cleaner that only records which profiles were applied
#[derive(Clone, Default)]
pub struct RecordingCleaner {
    profiles: Arc<Mutex<Vec<&'static str>>>,
}

impl RecordingCleaner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn profiles(&self) -> Vec<&'static str> {
        self.profiles.lock().unwrap().clone()
    }
}

impl Cleaner for RecordingCleaner {
    fn clean(&self, profile: &CleanupProfile) {
        self.profiles.lock().unwrap().push(profile.name);
    }
}

/// Everything a scenario can assert on
pub struct ScenarioResult {
    pub status: Result<ExecutionStatus, PipelineError>,
    pub state: PipelineState,
    pub submitted: Vec<String>,
    pub cleaned: Vec<&'static str>,
    pub events: Vec<ExecutionEvent>,
}

/// Drive the standard stage chain of `run` to the end
pub async fn run_scenario<P>(run: &TestRun, scheduler: FakeScheduler, probes: P) -> ScenarioResult
where
    P: ProbeExecutor + 'static,
{
    let cleaner = RecordingCleaner::new();
    let events = Arc::new(Mutex::new(Vec::new()));

    let workflow = Workflow::new(&run.config);
    let mut controller = workflow.controller(scheduler.clone(), probes, cleaner.clone());
    let sink = events.clone();
    controller.add_event_handler(move |event| sink.lock().unwrap().push(event));

    let status = controller.run().await;
    let state = controller.into_state();
    let events = events.lock().unwrap().clone();

    ScenarioResult {
        status,
        state,
        submitted: scheduler.submitted(),
        cleaned: cleaner.profiles(),
        events,
    }
}

/// Assert the result recorded for `stage`
pub fn assert_stage(result: &ScenarioResult, stage: &str, expected: StageResult) {
    assert_eq!(
        result.state.result_of(stage),
        Some(expected),
        "unexpected result for stage {}",
        stage
    );
}

/// Assert the order stages were recorded in
pub fn assert_recorded_order(result: &ScenarioResult, expected: &[&str]) {
    let actual: Vec<_> = result
        .state
        .records()
        .iter()
        .map(|r| r.stage.as_str())
        .collect();
    assert_eq!(actual, expected, "stage record order mismatch");
}

pub fn geogrid_success() -> JobOutput {
    vec![(
        "geogrid.log.0000",
        "Processing domain 1 of 1\n  Processing XLAT and XLONG\n*** Successful completion of program geogrid.exe ***\n",
    )]
}

pub fn ungrib_success() -> JobOutput {
    vec![(
        "ungrib.out",
        "Inventory for date = 2018-06-02 06:00:00\nwriting FILE:2018-06-02_06\nUNGRIB JOB COMPLETE\n",
    )]
}

pub fn metgrid_success() -> JobOutput {
    vec![(
        "metgrid.log.0000",
        "Processing 2018-06-02_06\n    FILE\n*** Successful completion of program metgrid.exe ***\n",
    )]
}

pub fn real_success() -> JobOutput {
    vec![
        ("output/rsl.out.0000", "d01 2018-06-02_06:00:00 real_em: SUCCESS COMPLETE REAL_EM INIT\n"),
        ("output/rsl.error.0000", "d01 2018-06-02_06:00:00 real_em: SUCCESS COMPLETE REAL_EM INIT\n"),
        ("output/wrfinput_d01", ""),
        ("output/wrfbdy_d01", ""),
    ]
}

pub fn wrf_success() -> JobOutput {
    vec![
        ("output/rsl.out.0000", "d01 2018-06-02_06:00:00 wrf: SUCCESS COMPLETE WRF\n"),
        ("output/rsl.error.0000", "d01 2018-06-02_06:00:00 wrf: SUCCESS COMPLETE WRF\n"),
        ("output/wrfout_d01_2018-06-01_00:00:00", ""),
        ("output/wrfout_d01_2018-06-02_06:00:00", ""),
    ]
}

pub fn upp_success() -> JobOutput {
    vec![("upp.log", "Starting UPP\nUPP JOB COMPLETE\n")]
}
