// system-tests/tests/helpers/mod.rs
// ============================================================================
// Module: System Test Helpers
// Description: Shared helpers for flagcheck system-tests.
// Purpose: Provide stub tools, fixture workspaces, and artifact utilities.
// Dependencies: system-tests, flagcheck-core
// ============================================================================

//! ## Overview
//! Shared helpers for flagcheck system-tests.
//! Invariants:
//! - Every stub tool lives in its own temporary directory.
//! - Every harness created here is torn down by its owner.

#![allow(dead_code, reason = "Shared helpers are reused across multiple test suites.")]

pub mod artifacts;
pub mod fixtures;
pub mod harness;
