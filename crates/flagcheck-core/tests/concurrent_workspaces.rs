// crates/flagcheck-core/tests/concurrent_workspaces.rs
// ============================================================================
// Module: Concurrent Workspace Tests
// Description: Parallel materialization under one parent directory.
// Purpose: Ensure concurrent scenarios never share or clobber a workspace.
// ============================================================================

//! Concurrency tests for workspace materialization.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions favor direct unwrap/expect for clarity."
)]

use std::collections::BTreeSet;
use std::sync::Arc;

use flagcheck_core::WorkspaceSpec;
use flagcheck_core::materialize_in;

const WORKERS: usize = 16;

#[test]
fn parallel_materialization_yields_unique_roots() {
    let parent = tempfile::tempdir().unwrap();
    let parent_path = Arc::new(parent.path().to_path_buf());

    let handles: Vec<_> = (0 .. WORKERS)
        .map(|worker| {
            let parent_path = Arc::clone(&parent_path);
            std::thread::spawn(move || {
                let spec = WorkspaceSpec::new()
                    .with_file("BUILD.bazel", format!("# worker {worker}\n"))
                    .unwrap()
                    .with_file("src/lib.go", "package lib\n")
                    .unwrap();
                let workspace = materialize_in(&parent_path, &spec).unwrap();
                let marker = workspace.read_to_string("BUILD.bazel").unwrap();
                (workspace, worker, marker)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|handle| handle.join().unwrap()).collect();
    let roots: BTreeSet<_> = results.iter().map(|(ws, _, _)| ws.root().to_path_buf()).collect();
    assert_eq!(roots.len(), WORKERS);
    for (_, worker, marker) in &results {
        assert_eq!(marker, &format!("# worker {worker}\n"));
    }

    drop(results);
    assert_eq!(std::fs::read_dir(parent.path()).unwrap().count(), 0);
}
