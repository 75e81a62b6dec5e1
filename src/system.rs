//! Process-wide tracing coordinator
//!
//! One [`TracingSystem`] exists per process. On first initialization it runs
//! the master/slave election: the first process in a family to start (no
//! `TRACE_MASTER` in the environment) becomes master, resolves the trace
//! path, writes the one-time file header under an exclusive lock and only
//! then publishes the path through `TRACE_FILE` for children to inherit.
//! Later processes see the marker, read the published path and skip the
//! header write.
//!
//! Emitting is strictly best-effort: with no coordinator installed, or after
//! shutdown, every emit operation is a silent no-op. Flush failures are
//! logged at warning level and the batch is dropped; nothing ever propagates
//! to an instrumentation call site.
//!
//! Note on file well-formedness: the shared file carries a trailing comma
//! after every object because no process can know it is writing the last
//! one. Consumers must tolerate that (or use [`crate::writer::TraceWriter`],
//! which closes the array with strict JSON).

use crate::config;
use crate::event::{ArgMap, Event, EventKind, InstantScope};
use crate::locked_file::{LockMode, LockedFile, TraceError};
use crate::manager::{EventManager, EventSink};
use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Instant;
use tracing::{debug, warn};

/// Environment marker set by the electing master (holds its pid).
pub const MASTER_ENV: &str = "TRACE_MASTER";
/// Environment variable carrying the absolute trace path to children.
pub const PATH_ENV: &str = "TRACE_FILE";

/// Outcome of the election for this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// First process in the family; wrote the header and published the path.
    Master,
    /// Inherited the path from a master through the environment.
    Slave,
}

/// Coordinator lifecycle. Never transitions back to `Active` from
/// `Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SystemState {
    Electing = 0,
    MasterInitialized = 1,
    SlaveInitialized = 2,
    Active = 3,
    Draining = 4,
    Terminated = 5,
}

impl SystemState {
    fn from_u8(value: u8) -> SystemState {
        match value {
            0 => SystemState::Electing,
            1 => SystemState::MasterInitialized,
            2 => SystemState::SlaveInitialized,
            3 => SystemState::Active,
            4 => SystemState::Draining,
            _ => SystemState::Terminated,
        }
    }
}

/// Flush path shared by every per-thread buffer in this process.
///
/// Serializes flushes from sibling threads with a process-wide mutex, then
/// appends the batch under the cross-process exclusive file lock. A sink
/// without a path is the degraded drop-events mode.
pub struct FileSink {
    path: Option<PathBuf>,
    flush_lock: Mutex<()>,
}

impl FileSink {
    pub fn new(path: Option<PathBuf>) -> Self {
        FileSink {
            path,
            flush_lock: Mutex::new(()),
        }
    }

    fn append_batch(&self, path: &Path, events: &[Event]) -> Result<(), TraceError> {
        let mut file = LockedFile::append(path, LockMode::Exclusive)?;
        let mut out = String::with_capacity(events.len() * 96);
        for event in events {
            out.push_str("  ");
            out.push_str(&event.to_json().to_string());
            out.push_str(",\n");
        }
        file.write_all(out.as_bytes())?;
        Ok(())
    }
}

impl EventSink for FileSink {
    fn write_batch(&self, events: Vec<Event>) {
        let Some(path) = &self.path else {
            warn!(dropped = events.len(), "no trace file resolved, dropping batch");
            return;
        };
        let _serialized = self
            .flush_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Err(error) = self.append_batch(path, &events) {
            warn!(%error, dropped = events.len(), "trace flush failed, dropping batch");
        }
    }
}

struct ThreadSlot {
    token: u64,
    manager: Arc<Mutex<EventManager>>,
}

impl Drop for ThreadSlot {
    fn drop(&mut self) {
        if let Ok(mut manager) = self.manager.lock() {
            manager.flush();
        }
        if let Some(system) = SYSTEM.get() {
            if let Ok(mut registry) = system.registry.lock() {
                registry.remove(&self.token);
            }
        }
    }
}

thread_local! {
    static LOCAL: RefCell<Option<ThreadSlot>> = const { RefCell::new(None) };
}

static SYSTEM: OnceLock<TracingSystem> = OnceLock::new();

/// Process-singleton coordinator. Construct through [`TracingSystem::init`].
pub struct TracingSystem {
    path: Option<PathBuf>,
    role: Role,
    base: Instant,
    sink: Arc<FileSink>,
    registry: Mutex<HashMap<u64, Arc<Mutex<EventManager>>>>,
    state: AtomicU8,
}

impl TracingSystem {
    /// Install the process-wide coordinator, electing against the inherited
    /// environment and the current argv. Returns the guard whose drop drains
    /// every live per-thread buffer.
    ///
    /// A second call is a no-op warning (singleton by construction
    /// contract); the returned guard then owns nothing.
    pub fn init() -> TracingGuard {
        let args: Vec<String> = std::env::args().collect();
        Self::init_with_args(&args)
    }

    /// Same as [`TracingSystem::init`] with an explicit argv, for callers
    /// that pre-process their command line.
    pub fn init_with_args(args: &[String]) -> TracingGuard {
        let mut installed = false;
        SYSTEM.get_or_init(|| {
            installed = true;
            Self::build(args)
        });
        if !installed {
            warn!("tracing system instance already present");
        }
        TracingGuard { owner: installed }
    }

    /// The installed coordinator, if it exists and is accepting events.
    pub fn instance() -> Option<&'static TracingSystem> {
        SYSTEM.get().filter(|s| s.state() == SystemState::Active)
    }

    fn build(args: &[String]) -> Self {
        let (role, path) = Self::elect(args);
        let system = TracingSystem {
            path: path.clone(),
            role,
            base: Instant::now(),
            sink: Arc::new(FileSink::new(path)),
            registry: Mutex::new(HashMap::new()),
            state: AtomicU8::new(SystemState::Electing as u8),
        };
        system.transition(match role {
            Role::Master => SystemState::MasterInitialized,
            Role::Slave => SystemState::SlaveInitialized,
        });
        system.transition(SystemState::Active);
        system
    }

    /// Run the election against the current environment. Exposed for tests;
    /// `init` is the normal entry point.
    ///
    /// A `None` path means the degraded drop-events mode: header write
    /// failed, or a slave found no published path.
    pub fn elect(args: &[String]) -> (Role, Option<PathBuf>) {
        match std::env::var(MASTER_ENV) {
            Err(_) => {
                std::env::set_var(MASTER_ENV, std::process::id().to_string());
                let path =
                    config::resolve_trace_path(args, config::application_name().as_deref());
                match Self::write_header(&path) {
                    Ok(()) => {
                        // The path becomes visible to children only after
                        // the header exists on disk, so no slave can observe
                        // a not-yet-initialized file.
                        std::env::set_var(PATH_ENV, &path);
                        debug!(path = %path.display(), "tracing master initialized");
                        (Role::Master, Some(path))
                    }
                    Err(error) => {
                        warn!(%error, path = %path.display(), "trace header write failed, tracing disabled");
                        (Role::Master, None)
                    }
                }
            }
            Ok(master_pid) => match std::env::var(PATH_ENV) {
                Ok(published) => {
                    debug!(%master_pid, path = %published, "tracing slave initialized");
                    (Role::Slave, Some(PathBuf::from(published)))
                }
                Err(_) => {
                    warn!(%master_pid, "master marker present but no trace path published, tracing disabled");
                    (Role::Slave, None)
                }
            },
        }
    }

    fn write_header(path: &Path) -> Result<(), TraceError> {
        let mut file = LockedFile::create_truncate(path)?;
        file.write_all(b"[\n")?;
        Ok(())
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn trace_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn state(&self) -> SystemState {
        SystemState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn transition(&self, next: SystemState) {
        let previous = self.state.swap(next as u8, Ordering::AcqRel);
        debug!(from = ?SystemState::from_u8(previous), to = ?next, "tracing state transition");
    }

    /// Microseconds since coordinator initialization (the `ts` base).
    pub fn elapsed_micros(&self) -> i64 {
        self.base.elapsed().as_micros() as i64
    }

    /// Append through the calling thread's buffer, creating and registering
    /// the buffer on first use. The buffer's mutex is only ever contended by
    /// the teardown drain, so the hot path is effectively lock-free.
    fn append(&'static self, event: Event) {
        let _ = LOCAL.try_with(|slot| {
            let mut slot = slot.borrow_mut();
            let entry = slot.get_or_insert_with(|| self.register_thread());
            let mut manager = entry
                .manager
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            manager.append(event);
        });
    }

    fn register_thread(&self) -> ThreadSlot {
        let token = crate::event::thread_token();
        let manager = Arc::new(Mutex::new(EventManager::new(
            self.sink.clone() as Arc<dyn EventSink>
        )));
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token, manager.clone());
        ThreadSlot { token, manager }
    }

    fn drain(&self) {
        self.transition(SystemState::Draining);
        let managers: Vec<_> = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for manager in managers {
            if let Ok(mut manager) = manager.lock() {
                manager.flush();
            }
        }
        self.transition(SystemState::Terminated);
    }
}

/// Owner handle returned by [`TracingSystem::init`]. Dropping it drains
/// every live per-thread buffer and terminates the coordinator; subsequent
/// emits are no-ops.
#[must_use = "dropping the guard immediately shuts tracing down"]
pub struct TracingGuard {
    owner: bool,
}

impl TracingGuard {
    /// Whether this guard installed the coordinator (false for the inert
    /// guard returned by a duplicate init).
    pub fn is_owner(&self) -> bool {
        self.owner
    }
}

impl Drop for TracingGuard {
    fn drop(&mut self) {
        if !self.owner {
            return;
        }
        if let Some(system) = SYSTEM.get() {
            system.drain();
        }
    }
}

/// Emit a duration-begin event.
pub fn trace_begin(name: &str, args: ArgMap, categories: &[&str]) {
    emit(EventKind::Begin, name, args, categories);
}

/// Emit an anonymous duration-end event (pairs with the most recent begin on
/// the same thread).
pub fn trace_end(args: ArgMap, categories: &[&str]) {
    emit(EventKind::End, "", args, categories);
}

/// Emit a named duration-end event.
pub fn trace_end_named(name: &str, args: ArgMap, categories: &[&str]) {
    emit(EventKind::End, name, args, categories);
}

/// Emit one counter sample carrying one or more series values.
pub fn trace_counter(name: &str, series: &[(&str, f64)], categories: &[&str]) {
    let Some(system) = TracingSystem::instance() else {
        return;
    };
    let mut event = Event::new(
        EventKind::Counter { id: None },
        name,
        system.elapsed_micros(),
    );
    for (series_name, value) in series {
        event.set_value(*series_name, *value);
    }
    event.set_categories(categories);
    system.append(event);
}

/// Emit an instant event with the given visibility scope.
pub fn trace_instant(name: &str, scope: InstantScope) {
    let Some(system) = TracingSystem::instance() else {
        return;
    };
    let event = Event::new(EventKind::Instant { scope }, name, system.elapsed_micros());
    system.append(event);
}

/// Name the calling thread in the trace (metadata event).
pub fn trace_thread_name(name: &str) {
    metadata("thread_name", name);
}

/// Name the calling process in the trace (metadata event).
pub fn trace_process_name(name: &str) {
    metadata("process_name", name);
}

fn metadata(kind: &str, value: &str) {
    let Some(system) = TracingSystem::instance() else {
        return;
    };
    let mut event = Event::new(EventKind::Metadata, kind, system.elapsed_micros());
    event.set_arg("name", serde_json::Value::from(value));
    system.append(event);
}

fn emit(kind: EventKind, name: &str, args: ArgMap, categories: &[&str]) {
    let Some(system) = TracingSystem::instance() else {
        return;
    };
    let mut event = Event::new(kind, name, system.elapsed_micros());
    event.set_args(args);
    event.set_categories(categories);
    system.append(event);
}
