//! Shared helpers for trace-file integration tests.

use serde_json::Value;
use std::fs;
use std::path::Path;

/// Parse a coordinator-written trace file.
///
/// The shared file is intentionally not strict JSON: it opens with `[`, has
/// one object per line with a trailing comma, and is never closed. This
/// parser mirrors what a real consumer has to do.
pub fn parse_trace(path: &Path) -> Vec<Value> {
    let content = fs::read_to_string(path).expect("trace file missing");
    let mut events = Vec::new();
    for line in content.lines() {
        let line = line.trim().trim_end_matches(',');
        if line.is_empty() || line == "[" || line == "]" {
            continue;
        }
        let value: Value = serde_json::from_str(line)
            .unwrap_or_else(|e| panic!("unparseable trace line {line:?}: {e}"));
        events.push(value);
    }
    events
}
