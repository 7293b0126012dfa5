//! Test: Polling - stages wait until their logs say they are done

use crate::helpers::*;
use wrf_pipeline::core::{ExecutionStatus, StageResult};

const METGRID_TAIL: &str = "tail -n 3 metgrid.log.0000";

/// Test that metgrid keeps polling while its log shows progress
#[tokio::test(start_paused = true)]
async fn test_metgrid_resolves_after_progress() {
    let run = test_run(&[]);

    // An unresolved tick reads the tail four times: the success marker, then
    // each of the three failure markers
    let mut outputs = vec!["Processing 2018-06-01_06"; 8];
    outputs.push("*** Successful completion of program metgrid.exe ***");
    let probes = ScriptedProbes::new().script(METGRID_TAIL, &outputs);

    let result = run_scenario(&run, FakeScheduler::succeeding(), probes.clone()).await;

    assert_eq!(*result.status.as_ref().unwrap(), ExecutionStatus::Completed);
    assert_stage(&result, "metgrid", StageResult::Success);
    assert_eq!(probes.calls(METGRID_TAIL), 9);
}

/// Test that the success marker wins when failure text is also present
#[tokio::test(start_paused = true)]
async fn test_success_marker_checked_before_failures() {
    let run = test_run(&[]);
    let probes = ScriptedProbes::new().script(
        "tail -n 3 ungrib.out",
        &["WARNING: error reading field SOILHGT, skipped\nUNGRIB JOB COMPLETE"],
    );

    let result = run_scenario(&run, FakeScheduler::succeeding(), probes).await;

    assert_eq!(*result.status.as_ref().unwrap(), ExecutionStatus::Completed);
    assert_stage(&result, "ungrib", StageResult::Success);
}
