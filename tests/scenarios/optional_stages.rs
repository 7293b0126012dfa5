//! Test: Optional Stages - geogrid and post-processing gates

use crate::helpers::*;
use wrf_pipeline::core::{ExecutionStatus, LocalProbeExecutor, StageResult};

/// Test the default control file: no geogrid, no post-processing
#[tokio::test(start_paused = true)]
async fn test_disabled_stages_are_skipped() {
    let run = test_run(&[]);
    let result = run_scenario(&run, FakeScheduler::succeeding(), LocalProbeExecutor::new()).await;

    assert_eq!(*result.status.as_ref().unwrap(), ExecutionStatus::Completed);
    assert_stage(&result, "geogrid", StageResult::Skipped);
    assert_stage(&result, "upp", StageResult::Skipped);
    assert_eq!(
        result.submitted,
        vec!["ungrib.job", "metgrid.job", "real.job", "wrf.job"]
    );

    // Skipped stages are still recorded, in plan order
    assert_recorded_order(
        &result,
        &["geogrid", "ungrib", "metgrid", "real", "wrf", "upp"],
    );
    let geogrid = &result.state.records()[0];
    assert_eq!(geogrid.detail.as_deref(), Some("run_geogrid is not set"));
}

/// Test that python post-processing is left to the outside world
#[tokio::test(start_paused = true)]
async fn test_python_post_processing_is_delegated() {
    let run = test_run(&[("run_postprocessing", "1"), ("post_run_python", "1")]);
    let result = run_scenario(&run, FakeScheduler::succeeding(), LocalProbeExecutor::new()).await;

    assert_eq!(*result.status.as_ref().unwrap(), ExecutionStatus::Completed);
    assert_stage(&result, "upp", StageResult::Success);
    assert!(!result.submitted.contains(&"upp.job".to_string()));
    assert!(!run.config.post_dir().join("upp.job").exists());
}
