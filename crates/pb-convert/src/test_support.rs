//! Scripted stand-in for Pandoc used by unit tests.

use std::path::PathBuf;
use std::sync::Arc;

use crate::admission::AdmissionControl;
use crate::executor::ConversionExecutor;
use crate::tools::ToolConfig;

/// Behaves like Pandoc for the arguments the executor generates. Markers in
/// the input select a behaviour: FAIL exits non-zero with stderr, FLOOD
/// writes a lot of stderr, NOOUT exits 0 without output, SLEEP hangs, ARGS
/// echoes the argument list into the output.
pub(crate) const FAKE_PANDOC: &str = r#"
out=""; from=""; to="pdf"; in=""; all="$*"
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift ;;
    -f) from="$2"; shift ;;
    -t) to="$2"; shift ;;
    */input.*) in="$1" ;;
  esac
  shift
done
if grep -q FAIL "$in"; then echo "pandoc: simulated failure" >&2; exit 64; fi
if grep -q FLOOD "$in"; then head -c 10000 /dev/zero | tr '\0' e >&2; exit 1; fi
if grep -q NOOUT "$in"; then exit 0; fi
if grep -q SLEEP "$in"; then exec sleep 30; fi
printf '%s->%s\n' "$from" "$to" > "$out"
if grep -q ARGS "$in"; then echo "$all" >> "$out"; fi
cat "$in" >> "$out"
"#;

pub(crate) fn fake_tool() -> ToolConfig {
    ToolConfig {
        name: "pandoc".into(),
        path: PathBuf::from("/bin/sh"),
        args: vec!["-c".into(), FAKE_PANDOC.into(), "pandoc".into()],
    }
}

pub(crate) fn fake_executor(limit: usize) -> Arc<ConversionExecutor> {
    fake_executor_with(limit, None)
}

pub(crate) fn fake_executor_with(limit: usize, root: Option<PathBuf>) -> Arc<ConversionExecutor> {
    Arc::new(
        ConversionExecutor::new(Some(fake_tool()), AdmissionControl::new(limit))
            .with_temp_root(root),
    )
}
