//! Trace-file path resolution
//!
//! The master process resolves the shared trace path once, from the host
//! application's command line: `--trace-file=<path>` or `--trace-file
//! <path>`, falling back to `<application name>.trace` and finally a fixed
//! default. The result is absolutized before being published to child
//! processes, which inherit it through the environment and never resolve a
//! path themselves.

use std::path::{Path, PathBuf};

/// Fallback trace file name when neither a flag nor an application name is
/// available.
pub const DEFAULT_TRACE_FILE: &str = "application.trace";

const TRACE_FILE_FLAG: &str = "--trace-file";

/// Resolve the trace file path from the host argv and optional application
/// name. `args` is the full argv including the program name; the last
/// occurrence of the flag wins. An empty flag value counts as unset.
pub fn resolve_trace_path(args: &[String], app_name: Option<&str>) -> PathBuf {
    let mut path: Option<PathBuf> = None;
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        if let Some(value) = arg.strip_prefix("--trace-file=") {
            if !value.is_empty() {
                path = Some(PathBuf::from(value));
            }
        } else if arg == TRACE_FILE_FLAG {
            if let Some(value) = iter.next() {
                path = Some(PathBuf::from(value));
            }
        }
    }

    let path = path
        .or_else(|| app_name.map(|name| PathBuf::from(format!("{name}.trace"))))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_TRACE_FILE));
    absolutize(&path)
}

/// Application name derived from the current executable, if any.
pub fn application_name() -> Option<String> {
    let exe = std::env::current_exe().ok()?;
    exe.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
}

fn absolutize(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
