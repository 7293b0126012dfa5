//! Scenario-based tests for wrf-pipeline
//!
//! Each scenario drives the standard stage chain against a fake scheduler
//! whose jobs write their logs into a temporary run directory.

mod helpers;

mod debug_mode;
mod failure_handling;
mod optional_stages;
mod polling;
mod success_chain;
mod timeouts;
