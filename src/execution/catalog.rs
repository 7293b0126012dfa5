//! The standard WRF stage sequence

use crate::core::{
    Condition, ConditionSet, PostProcessing, Probe, RunConfig, TemplateWriter, UnipostOutput,
    Verdict,
};
use crate::execution::controller::{PlannedStage, StageGate};
use crate::execution::stage::StageSpec;
use crate::execution::waiter::WaitSpec;
use crate::workspace::{StagingAction, UppJobPlan, UPP_SUCCESS_MARKER};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Marker appended to ungrib.out by the generated ungrib job
pub const UNGRIB_SUCCESS_MARKER: &str = "UNGRIB JOB COMPLETE";

/// Substrings that mark a failed WRF program in its logs
const FAILURE_MARKERS: [&str; 3] = ["fatal", "runtime", "error"];

/// Success condition on `probe` followed by the standard failure markers on `failure_probe`
fn completion_set(probe: Probe, marker: &str, failure_probe: Probe) -> ConditionSet {
    let failures = FAILURE_MARKERS
        .iter()
        .map(|needle| Condition::contains(failure_probe.clone(), *needle, Verdict::Failure))
        .collect();
    ConditionSet::completion(Condition::contains(probe, marker, Verdict::Success), failures)
}

/// Completion on a single log, success and failure read from the same tail
fn log_completion(log: &str, lines: usize, marker: &str, interval_secs: u64) -> WaitSpec {
    let probe = Probe::tail(log, lines);
    WaitSpec::new(
        completion_set(probe.clone(), marker, probe),
        Duration::from_secs(interval_secs),
    )
}

/// Completion on the rank-0 rsl files of real.exe / wrf.exe
fn rsl_completion(marker: &str, interval_secs: u64) -> WaitSpec {
    WaitSpec::new(
        completion_set(
            Probe::tail("output/rsl.out.0000", 1),
            marker,
            Probe::tail("output/rsl.error.0000", 1),
        ),
        Duration::from_secs(interval_secs),
    )
}

fn geogrid(config: &RunConfig) -> PlannedStage {
    let spec = StageSpec::new(
        "geogrid",
        config.run_dir(),
        "geogrid.job",
        "geogrid.log*",
        log_completion(
            "geogrid.log.0000",
            3,
            "Successful completion of program geogrid.exe",
            25,
        ),
    );
    PlannedStage::mandatory(spec).gated(StageGate::Flag {
        name: "run_geogrid",
        enabled: config.run_geogrid,
    })
}

fn ungrib(config: &RunConfig) -> PlannedStage {
    let spec = StageSpec::new(
        "ungrib",
        config.run_dir(),
        "ungrib.job",
        "ungrib.out",
        log_completion("ungrib.out", 3, UNGRIB_SUCCESS_MARKER, 25),
    );
    PlannedStage::mandatory(spec)
}

fn metgrid(config: &RunConfig) -> PlannedStage {
    let spec = StageSpec::new(
        "metgrid",
        config.run_dir(),
        "metgrid.job",
        "metgrid.log*",
        log_completion(
            "metgrid.log.0000",
            3,
            "Successful completion of program metgrid.exe",
            25,
        ),
    );
    PlannedStage::mandatory(spec)
}

fn real(config: &RunConfig) -> PlannedStage {
    let spec = StageSpec::new(
        "real",
        config.run_dir(),
        "real.job",
        "output/rsl.out.0000",
        rsl_completion("SUCCESS", 60),
    )
    .with_required_output("output/wrfinput_d01")
    .with_required_output("output/wrfbdy_d01");
    PlannedStage::mandatory(spec)
}

fn wrf(config: &RunConfig) -> PlannedStage {
    let output_dir = config.output_dir();
    let spec = StageSpec::new(
        "wrf",
        config.run_dir(),
        "wrf.job",
        "output/rsl.out.0000",
        rsl_completion("SUCCESS COMPLETE WRF", 180),
    )
    // rsl files left by real.exe would satisfy the appearance wait immediately
    .with_staging(StagingAction::RemoveMatching {
        dir: output_dir.clone(),
        pattern: "rsl.out.*".to_string(),
    })
    .with_staging(StagingAction::RemoveMatching {
        dir: output_dir,
        pattern: "rsl.error.*".to_string(),
    });
    PlannedStage::mandatory(spec)
}

/// UPP control files linked into the post directory for an output format
pub fn upp_links(upp_dir: &Path, output: UnipostOutput) -> Vec<PathBuf> {
    let parm = upp_dir.join("parm");
    let mut links = match output {
        UnipostOutput::Grib => vec![parm.join("wrf_cntrl.parm")],
        UnipostOutput::Grib2 => vec![
            parm.join("postcntrl.xml"),
            parm.join("post_avblflds.xml"),
            parm.join("params_grib2_tbl_new"),
        ],
    };
    links.push(upp_dir.join("scripts").join("cbar.gs"));
    links.push(parm.join("nam_micro_lookup.dat"));
    links.push(parm.join("hires_micro_lookup.dat"));
    links
}

fn upp(config: &RunConfig, writer: &TemplateWriter) -> PlannedStage {
    let post_dir = config.post_dir();
    let mut spec = StageSpec::new(
        "upp",
        &post_dir,
        "upp.job",
        "upp.log",
        log_completion("upp.log", 3, UPP_SUCCESS_MARKER, 60),
    );

    let gate = match &config.post_processing {
        Some(PostProcessing::Unipost { output, resources }) => {
            for source in upp_links(&config.upp_dir, *output) {
                spec = spec.with_staging(StagingAction::Link {
                    source,
                    dest_dir: post_dir.clone(),
                });
            }
            spec = spec
                .with_staging(StagingAction::LinkAll {
                    source_dir: config.upp_dir.join("includes"),
                    dest_dir: post_dir.clone(),
                })
                .with_staging(StagingAction::RenderUppJob(UppJobPlan {
                    template: config.template_dir.join("upp.job.template"),
                    dest: post_dir.join("upp.job"),
                    output_dir: config.output_dir(),
                    output: *output,
                    mpi_total: resources.mpi_total(),
                    writer: writer.clone(),
                }));
            StageGate::Flag {
                name: "run_postprocessing",
                enabled: true,
            }
        }
        Some(PostProcessing::Python) => StageGate::Delegated {
            reason: "python post-processing runs outside of this pipeline".to_string(),
        },
        None => StageGate::Flag {
            name: "run_postprocessing",
            enabled: false,
        },
    };

    PlannedStage::mandatory(spec).gated(gate).recoverable()
}

/// geogrid, ungrib, metgrid, real, wrf, upp - in that order, with the
/// configured wait deadlines applied to every stage
pub fn standard_stages(config: &RunConfig, writer: &TemplateWriter) -> Vec<PlannedStage> {
    let appearance = config.appearance_timeout();
    let completion = config.completion_timeout();

    vec![
        geogrid(config),
        ungrib(config),
        metgrid(config),
        real(config),
        wrf(config),
        upp(config, writer),
    ]
    .into_iter()
    .map(|mut planned| {
        planned.spec = planned.spec.with_timeouts(appearance, completion);
        planned
    })
    .collect()
}
