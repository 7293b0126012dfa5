//! Test: Success Chain - every stage runs in order

use crate::helpers::*;
use wrf_pipeline::core::{ExecutionStatus, LocalProbeExecutor, StageResult};
use wrf_pipeline::execution::ExecutionEvent;

const UNIPOST: [(&str, &str); 6] = [
    ("run_geogrid", "1"),
    ("run_postprocessing", "1"),
    ("post_run_unipost", "1"),
    ("unipost_out", "grib2"),
    ("num_upp_nodes", "1"),
    ("num_upp_processors", "12"),
];

/// Test the full chain with geogrid and UPP enabled
#[tokio::test(start_paused = true)]
async fn test_full_chain_completes() {
    let run = test_run(&UNIPOST);
    let result = run_scenario(&run, FakeScheduler::succeeding(), LocalProbeExecutor::new()).await;

    assert_eq!(*result.status.as_ref().unwrap(), ExecutionStatus::Completed);
    assert_eq!(result.state.status, ExecutionStatus::Completed);
    assert_recorded_order(
        &result,
        &["geogrid", "ungrib", "metgrid", "real", "wrf", "upp"],
    );
    assert_eq!(
        result.submitted,
        vec!["geogrid.job", "ungrib.job", "metgrid.job", "real.job", "wrf.job", "upp.job"]
    );
    for record in result.state.records() {
        assert_eq!(record.result, StageResult::Success, "stage {}", record.stage);
    }

    // Success cleanup only, exactly once
    assert_eq!(result.cleaned, vec!["success"]);
}

/// Test that the UPP job is rendered over the wrfout files wrf.exe left behind
#[tokio::test(start_paused = true)]
async fn test_upp_job_covers_every_wrfout_file() {
    let run = test_run(&UNIPOST);
    let result = run_scenario(&run, FakeScheduler::succeeding(), LocalProbeExecutor::new()).await;
    assert!(result.status.is_ok());

    let job = std::fs::read_to_string(run.config.post_dir().join("upp.job")).unwrap();
    assert!(job.starts_with("#!/bin/sh\nmodule add wrf-3.9.1\n"));
    assert!(job.contains("wrfout_d01_2018-06-01_00:00:00"));
    assert!(job.contains("wrfout_d01_2018-06-02_06:00:00"));
    assert!(job.contains("mpirun -np 12 unipost.exe"));
    assert!(job.contains("grib2"));
    assert!(job.trim_end().ends_with("echo \"UPP JOB COMPLETE\" >> upp.log"));

    // Control files are linked into the post directory
    let link = run.config.post_dir().join("postcntrl.xml");
    assert!(std::fs::symlink_metadata(link).unwrap().file_type().is_symlink());
}

/// Test that wrf.exe does not see the rsl files real.exe left behind
#[tokio::test(start_paused = true)]
async fn test_wrf_clears_rsl_files_from_real() {
    let run = test_run(&[]);
    let result = run_scenario(&run, FakeScheduler::succeeding(), LocalProbeExecutor::new()).await;
    assert!(result.status.is_ok());

    let rsl = std::fs::read_to_string(run.config.output_dir().join("rsl.out.0000")).unwrap();
    assert!(rsl.contains("SUCCESS COMPLETE WRF"));
    assert!(!rsl.contains("REAL_EM"));
}

/// Test the event stream brackets the run
#[tokio::test(start_paused = true)]
async fn test_events_bracket_the_run() {
    let run = test_run(&UNIPOST);
    let result = run_scenario(&run, FakeScheduler::succeeding(), LocalProbeExecutor::new()).await;

    match result.events.first() {
        Some(ExecutionEvent::PipelineStarted {
            run_name,
            total_stages,
            ..
        }) => {
            assert_eq!(run_name, "CFSv2-2018060100");
            assert_eq!(*total_stages, 6);
        }
        other => panic!("Expected PipelineStarted first, got {:?}", other),
    }
    match result.events.last() {
        Some(ExecutionEvent::PipelineCompleted { status, .. }) => {
            assert_eq!(*status, ExecutionStatus::Completed);
        }
        other => panic!("Expected PipelineCompleted last, got {:?}", other),
    }

    let completed = result
        .events
        .iter()
        .filter(|e| matches!(e, ExecutionEvent::StageCompleted { .. }))
        .count();
    assert_eq!(completed, 6);
}
