//! Test: Failure Handling - fatal and recoverable stage outcomes

use crate::helpers::*;
use wrf_pipeline::core::{ExecutionStatus, LocalProbeExecutor, StageResult};
use wrf_pipeline::execution::PipelineError;

/// Test that a failure marker in the metgrid log aborts the run
#[tokio::test(start_paused = true)]
async fn test_metgrid_failure_is_fatal() {
    let run = test_run(&[]);
    let scheduler = FakeScheduler::succeeding().job(
        "metgrid.job",
        vec![(
            "metgrid.log.0000",
            "Processing 2018-06-01_00\nmetgrid.exe: fatal error in interp_module\n",
        )],
    );
    let result = run_scenario(&run, scheduler, LocalProbeExecutor::new()).await;

    match &result.status {
        Err(PipelineError::ProbeFailureMatch { stage, artifact }) => {
            assert_eq!(stage.as_str(), "metgrid");
            assert_eq!(artifact.as_str(), "metgrid.log.0000");
        }
        other => panic!("Expected ProbeFailureMatch, got {:?}", other),
    }
    assert_eq!(result.state.status, ExecutionStatus::Failed);
    assert_stage(&result, "metgrid", StageResult::Failed);

    // Later stages never run or get recorded
    assert_eq!(result.submitted, vec!["ungrib.job", "metgrid.job"]);
    assert_eq!(result.state.result_of("real"), None);
    assert_eq!(result.state.result_of("wrf"), None);

    assert_eq!(result.cleaned, vec!["fatal"]);
}

/// Test that real.exe reporting success without its boundary file fails the run
#[tokio::test(start_paused = true)]
async fn test_real_missing_boundary_file() {
    let run = test_run(&[]);
    let scheduler = FakeScheduler::succeeding().job(
        "real.job",
        vec![
            ("output/rsl.out.0000", "d01 real_em: SUCCESS COMPLETE REAL_EM INIT\n"),
            ("output/wrfinput_d01", ""),
        ],
    );
    let result = run_scenario(&run, scheduler, LocalProbeExecutor::new()).await;

    match &result.status {
        Err(PipelineError::ProbeFailureMatch { stage, artifact }) => {
            assert_eq!(stage.as_str(), "real");
            assert_eq!(artifact.as_str(), "output/wrfbdy_d01");
        }
        other => panic!("Expected ProbeFailureMatch, got {:?}", other),
    }
    assert!(!result.submitted.contains(&"wrf.job".to_string()));
    assert_eq!(result.cleaned, vec!["fatal"]);
}

/// Test that a failed UPP job does not fail the run
#[tokio::test(start_paused = true)]
async fn test_upp_failure_is_recoverable() {
    let run = test_run(&[
        ("run_postprocessing", "1"),
        ("post_run_unipost", "1"),
        ("unipost_out", "grib"),
        ("num_upp_nodes", "1"),
        ("num_upp_processors", "4"),
    ]);
    let scheduler = FakeScheduler::succeeding().job(
        "upp.job",
        vec![(
            "upp.log",
            "Starting UPP\nunipost.exe error on wrfout_d01_2018-06-01_00:00:00\n",
        )],
    );
    let result = run_scenario(&run, scheduler, LocalProbeExecutor::new()).await;

    let status = *result.status.as_ref().unwrap();
    assert_eq!(status, ExecutionStatus::CompletedWithFailures);
    assert_eq!(status.exit_code(), 2);
    assert_stage(&result, "wrf", StageResult::Success);
    assert_stage(&result, "upp", StageResult::Failed);
    assert_eq!(result.cleaned, vec!["success"]);
}

/// Test that a rejected submission aborts the run whatever the stage
#[tokio::test(start_paused = true)]
async fn test_rejected_submission_is_fatal() {
    let run = test_run(&[]);
    let scheduler = FakeScheduler::succeeding().reject("real.job");
    let result = run_scenario(&run, scheduler, LocalProbeExecutor::new()).await;

    match &result.status {
        Err(PipelineError::SubmissionFailure { stage, .. }) => assert_eq!(stage.as_str(), "real"),
        other => panic!("Expected SubmissionFailure, got {:?}", other),
    }
    assert_stage(&result, "real", StageResult::Failed);
    assert_eq!(result.submitted, vec!["ungrib.job", "metgrid.job"]);
    assert_eq!(result.cleaned, vec!["fatal"]);
}
