//! Test: Debug Mode - nothing is submitted or waited on

use crate::helpers::*;
use wrf_pipeline::core::{ExecutionStatus, LocalProbeExecutor, StageResult};

#[tokio::test(start_paused = true)]
async fn test_debug_mode_submits_nothing() {
    let run = test_run(&[("debugmode", "1"), ("run_geogrid", "1")]);
    let result = run_scenario(&run, FakeScheduler::succeeding(), LocalProbeExecutor::new()).await;

    assert_eq!(*result.status.as_ref().unwrap(), ExecutionStatus::Completed);
    assert!(result.submitted.is_empty());

    for stage in ["geogrid", "ungrib", "metgrid", "real", "wrf"] {
        assert_stage(&result, stage, StageResult::Success);
    }
    // Gates still apply before debug mode
    assert_stage(&result, "upp", StageResult::Skipped);

    let ungrib = &result.state.records()[1];
    assert_eq!(ungrib.detail.as_deref(), Some("debug mode"));
}
