//! Tracefile - cross-thread, cross-process trace-event logging
//!
//! This library buffers trace events per thread and serializes them to one
//! shared Chrome-trace-format file that a whole family of processes appends
//! to concurrently, coordinated by advisory file locks and an
//! environment-variable master/slave handoff.
//!
//! # Architecture
//!
//! - [`event`] — typed event records (duration begin/end, counter, instant,
//!   metadata) and their JSON serialization.
//! - [`manager`] — the per-thread buffer; appends are contention-free and
//!   flushes transfer batch ownership to the coordinator.
//! - [`system`] — the process-singleton coordinator: master/slave election,
//!   the cross-process flush path, and the emit API.
//! - [`locked_file`] — the `flock(2)` wrapper gating every header write and
//!   batch append.
//! - [`scope`] — RAII begin/end instrumentation.
//! - [`writer`] — the simpler single-process direct writer that closes the
//!   file to strict JSON.
//!
//! # Example
//!
//! ```no_run
//! use tracefile::{trace_counter, trace_thread_name, trace_scope, TracingSystem};
//!
//! fn main() {
//!     let _tracing = TracingSystem::init();
//!     trace_thread_name("main");
//!     {
//!         let _scope = trace_scope!("load", &["io"], { "file" => "x.mda" });
//!         trace_counter("progress", &[("items", 128.0)], &["io"]);
//!     }
//!     // Guard drop drains every per-thread buffer to the trace file.
//! }
//! ```
//!
//! # Output caveats
//!
//! The shared multi-process file keeps a trailing comma after every object
//! (no writer can know it is last) and is never closed with `]`; consumers
//! must tolerate both, or the trace must come from a [`writer::TraceWriter`]
//! which emits strict JSON. Abnormal termination can leave a truncated
//! final line in either mode.
//!
//! Tracing is best-effort throughout: no failure in this subsystem ever
//! reaches an instrumentation call site.

pub mod config;
pub mod event;
pub mod locked_file;
pub mod manager;
pub mod scope;
pub mod system;
pub mod writer;

pub use event::{ArgMap, Event, EventKind, InstantScope, Phase};
pub use locked_file::{LockMode, LockedFile, TraceError};
pub use manager::{EventManager, EventSink, FLUSH_THRESHOLD};
pub use scope::TraceScope;
pub use system::{
    trace_begin, trace_counter, trace_end, trace_end_named, trace_instant, trace_process_name,
    trace_thread_name, Role, TracingGuard, TracingSystem,
};
pub use writer::TraceWriter;
