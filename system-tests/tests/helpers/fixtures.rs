// system-tests/tests/helpers/fixtures.rs
// ============================================================================
// Module: Fixture Workspaces
// Description: Go race-detector fixture projects and the stub Bazel script.
// Purpose: Model a project that only compiles without the race flag.
// Dependencies: flagcheck-core
// ============================================================================

use flagcheck_core::WorkspaceSpec;
use flagcheck_core::parse_bundle;

/// Flag enabling the Go race detector under `rules_go`.
pub const RACE_FLAG: &str = "--@io_bazel_rules_go//go/config:race";

/// Target exercised by every race fixture.
pub const RACE_TARGET: &str = "//:racy_test";

/// Project whose `!race` file does not compile and whose test has a data race.
pub const RACE_BUNDLE: &str = r#"
Fixture: builds only with the race detector enabled; the race is real.
-- BUILD.bazel --
load("@io_bazel_rules_go//go:def.bzl", "go_library", "go_test")

go_library(
    name = "racy",
    srcs = ["race_off.go", "race_on.go", "racy.go"],
    importpath = "example.com/racy",
)

go_test(
    name = "racy_test",
    srcs = ["racy_test.go"],
    embed = [":racy"],
)
-- race_off.go --
//go:build !race

package racy

func TriggerRace() {
	Does Not Compile
}
-- race_on.go --
//go:build race

package racy

func TriggerRace() { Race() }
-- racy.go --
package racy

func Race() {
	done := make(chan bool)
	m := make(map[string]string)
	m["name"] = "world"
	go func() {
		m["name"] = "data race"
		done <- true
	}()
	_ = m["name"]
	<-done
}
-- racy_test.go --
package racy

import "testing"

func TestRace(t *testing.T) { TriggerRace() }
"#;

/// Race-free replacement for `racy.go`.
const SAFE_RACY_GO: &str = "package racy\n\nfunc Race() {\n\tm := map[string]string{\"name\": \"world\"}\n\t_ = m[\"name\"]\n}\n";

/// Stub `bazel test` that mimics the relevant Bazel and race detector behavior.
///
/// Without the race flag it fails to build (exit 1) while `race_off.go` holds
/// uncompilable code. With the flag it fails tests (exit 3) while `racy.go`
/// spawns a goroutine, and succeeds otherwise.
pub const STUB_BAZEL: &str = r#"
echo "stub bazel: $*"
race=0
for arg in "$@"; do
  case "$arg" in
    --@io_bazel_rules_go//go/config:race|--features=race) race=1 ;;
  esac
done
if [ "$race" = 0 ]; then
  if grep -q "Does Not Compile" race_off.go 2>/dev/null; then
    echo "ERROR: race_off.go:6:7: syntax error: unexpected Not" >&2
    echo "FAILED: Build did NOT complete successfully" >&2
    exit 1
  fi
  echo "INFO: Build completed successfully"
  exit 0
fi
if grep -q "go func" racy.go; then
  echo "WARNING: DATA RACE"
  echo "--- FAIL: TestRace"
  echo "FAIL: //:racy_test" >&2
  exit 3
fi
echo "//:racy_test PASSED"
exit 0
"#;

/// Returns the race fixture workspace.
pub fn race_workspace() -> WorkspaceSpec {
    parse_bundle(RACE_BUNDLE).expect("race bundle parses")
}

/// Returns the race fixture with the goroutine removed from `racy.go`.
pub fn race_free_workspace() -> WorkspaceSpec {
    let racy = race_workspace();
    let mut fixed = WorkspaceSpec::new();
    for (path, contents) in racy.entries() {
        let contents = if path == std::path::Path::new("racy.go") { SAFE_RACY_GO } else { contents };
        fixed.insert(path, contents.to_string()).expect("fixture paths are valid");
    }
    fixed
}
