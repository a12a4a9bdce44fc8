// crates/flagcheck-cli/src/lib.rs
// ============================================================================
// Module: Flagcheck CLI Library
// Description: Shared helpers for the flagcheck binary.
// Purpose: Keep scenario execution, reporting, and logging testable.
// Dependencies: flagcheck-core, serde_jcs, tokio, tracing-subscriber
// ============================================================================

//! ## Overview
//! The `flagcheck` binary is a thin dispatcher; the pieces it composes live
//! here so they can be exercised without spawning the binary:
//! - [`execute`] runs scenarios concurrently under one harness,
//! - [`report`] aggregates results into JSON and human-readable summaries,
//! - [`logging`] installs the tracing subscriber.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod execute;
pub mod logging;
pub mod report;
