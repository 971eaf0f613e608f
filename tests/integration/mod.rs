//! Integration test suite for convoy.
//!
//! These tests exercise full runs from task request to report, including
//! hook ordering, guard evaluation, parallel dispatch, timeouts, and the
//! built-in deployment registry. They use a recording transport and do
//! not open SSH connections, making them safe to run in CI environments.

mod fixtures;

mod guards;
mod ordering;
mod timeouts;
