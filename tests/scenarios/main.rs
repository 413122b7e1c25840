//! Scenario tests: full builds run against a scripted command runner

mod helpers;

mod disabled_deploy;
mod environment;
mod fail_fast;
mod matrix_expansion;
mod reporting;
