//! Test: Timeouts - configured wait deadlines

use crate::helpers::*;
use wrf_pipeline::core::{ExecutionStatus, LocalProbeExecutor, StageResult};
use wrf_pipeline::execution::{PipelineError, WaitPhase};

/// Test a job whose log never appears
#[tokio::test(start_paused = true)]
async fn test_job_never_starts() {
    let run = test_run(&[("appearance_timeout", "600")]);
    let scheduler = FakeScheduler::succeeding().silent("wrf.job");
    let result = run_scenario(&run, scheduler, LocalProbeExecutor::new()).await;

    match &result.status {
        Err(PipelineError::WaitTimeout { stage, phase }) => {
            assert_eq!(stage.as_str(), "wrf");
            assert_eq!(*phase, WaitPhase::Appearance);
        }
        other => panic!("Expected WaitTimeout, got {:?}", other),
    }
    assert_stage(&result, "wrf", StageResult::TimedOut);
    assert_eq!(result.state.status, ExecutionStatus::Failed);
    assert_eq!(result.cleaned, vec!["fatal"]);
}

/// Test a job that starts but never reports completion
#[tokio::test(start_paused = true)]
async fn test_job_never_completes() {
    let run = test_run(&[("completion_timeout", "3600")]);
    let scheduler = FakeScheduler::succeeding().job(
        "ungrib.job",
        vec![("ungrib.out", "Inventory for date = 2018-06-01 00:00:00\n")],
    );
    let result = run_scenario(&run, scheduler, LocalProbeExecutor::new()).await;

    match &result.status {
        Err(PipelineError::WaitTimeout { stage, phase }) => {
            assert_eq!(stage.as_str(), "ungrib");
            assert_eq!(*phase, WaitPhase::Completion);
        }
        other => panic!("Expected WaitTimeout, got {:?}", other),
    }
    assert_eq!(result.submitted, vec!["ungrib.job"]);
}

/// Test that a timeout on the recoverable UPP stage still aborts the run
#[tokio::test(start_paused = true)]
async fn test_upp_timeout_is_fatal() {
    let run = test_run(&[
        ("run_postprocessing", "1"),
        ("post_run_unipost", "1"),
        ("unipost_out", "grib2"),
        ("num_upp_nodes", "1"),
        ("num_upp_processors", "12"),
        ("appearance_timeout", "300"),
    ]);
    let scheduler = FakeScheduler::succeeding().silent("upp.job");
    let result = run_scenario(&run, scheduler, LocalProbeExecutor::new()).await;

    assert!(matches!(
        &result.status,
        Err(PipelineError::WaitTimeout { stage, .. }) if stage == "upp"
    ));
    assert_eq!(result.state.status, ExecutionStatus::Failed);
}
