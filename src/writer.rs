//! Single-process direct trace writer
//!
//! [`TraceWriter`] is the simpler variant of the subsystem for programs that
//! never fork: it owns the output stream for its whole lifetime, serializes
//! each event immediately under an internal mutex, and writes the closing
//! bracket on drop. Because one writer owns the stream, it can place commas
//! *between* entries rather than after each one, so a cleanly dropped writer
//! leaves strict, parseable JSON. Not crash-safe: abnormal termination
//! leaves the array unterminated.
//!
//! For process families sharing one file, use
//! [`crate::system::TracingSystem`] instead.

use crate::event::{ArgMap, Event, EventKind, InstantScope};
use crate::locked_file::TraceError;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;
use tracing::warn;

struct WriterInner {
    out: BufWriter<File>,
    wrote_entry: bool,
}

/// Exclusive single-process trace stream.
///
/// Creation errors are surfaced once, at construction; every write after
/// that is best-effort and never fails the caller.
pub struct TraceWriter {
    path: PathBuf,
    base: Instant,
    inner: Mutex<WriterInner>,
}

impl TraceWriter {
    /// Create (truncating) the trace file and write the opening bracket.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, TraceError> {
        let path = path.into();
        let file = File::create(&path).map_err(|source| TraceError::Open {
            path: path.clone(),
            source,
        })?;
        let mut out = BufWriter::new(file);
        out.write_all(b"[").map_err(TraceError::Write)?;
        Ok(TraceWriter {
            path,
            base: Instant::now(),
            inner: Mutex::new(WriterInner {
                out,
                wrote_entry: false,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_begin(&self, name: &str, args: ArgMap, categories: &[&str]) {
        let mut event = Event::new(EventKind::Begin, name, self.elapsed_micros());
        event.set_args(args);
        event.set_categories(categories);
        self.write_event(&event);
    }

    pub fn write_end(&self, name: &str, args: ArgMap, categories: &[&str]) {
        let mut event = Event::new(EventKind::End, name, self.elapsed_micros());
        event.set_args(args);
        event.set_categories(categories);
        self.write_event(&event);
    }

    pub fn write_counter(&self, name: &str, series: &str, value: f64, categories: &[&str]) {
        let mut event = Event::new(
            EventKind::Counter { id: None },
            name,
            self.elapsed_micros(),
        );
        event.set_value(series, value);
        event.set_categories(categories);
        self.write_event(&event);
    }

    pub fn write_instant(&self, name: &str, scope: InstantScope) {
        let event = Event::new(EventKind::Instant { scope }, name, self.elapsed_micros());
        self.write_event(&event);
    }

    fn elapsed_micros(&self) -> i64 {
        self.base.elapsed().as_micros() as i64
    }

    fn write_event(&self, event: &Event) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let separator = if inner.wrote_entry { "," } else { "" };
        let line = format!("{separator}\n  {}", event.to_json());
        if let Err(error) = inner.out.write_all(line.as_bytes()) {
            warn!(%error, path = %self.path.display(), "trace write failed, event dropped");
            return;
        }
        inner.wrote_entry = true;
    }
}

impl Drop for TraceWriter {
    fn drop(&mut self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(error) = inner
            .out
            .write_all(b"\n]\n")
            .and_then(|()| inner.out.flush())
        {
            warn!(%error, path = %self.path.display(), "failed to close trace stream");
        }
    }
}
