// system-tests/tests/race_flag.rs
// ============================================================================
// Module: Race Flag Suite
// Description: Aggregates race-detector flag outcomes system tests into one binary.
// Purpose: Keep end-to-end coverage of race-detector flag outcomes in one place.
// Dependencies: suites/race_flag.rs, helpers
// ============================================================================

//! ## Overview
//! Aggregates race-detector flag outcomes system tests into one binary.
//! Stub tools are shell scripts, so the suite only runs on unix.

#![cfg(unix)]
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod helpers;

#[path = "suites/race_flag.rs"]
mod race_flag;
