// system-tests/src/lib.rs
// ============================================================================
// Module: Flagcheck System Tests Library
// Description: Shared configuration for end-to-end harness suites.
// Purpose: Provide common settings for the system-test binaries.
// Dependencies: std
// ============================================================================

//! ## Overview
//! This crate hosts configuration shared by the system-test binaries in
//! `system-tests/tests`. The suites drive stub build tools written as shell
//! scripts through the full harness and only run on unix.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
