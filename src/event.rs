//! Trace event model and JSON serialization
//!
//! Events follow the Chrome Trace Event Format: each event serializes to one
//! JSON object with `name`, `cat`, `ph`, `pid`, `tid`, `ts` and `args`
//! always present, plus variant-specific fields (`id` for counters with an
//! explicit id, `s` for instant events) appended after the base fields.
//!
//! Serialization never fails: argument values outside the supported set
//! (number, string, bool, nested object) are coerced to their string
//! rendering so best-effort logging is preserved.

use fnv::FnvHasher;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::cell::Cell;
use std::hash::{Hash, Hasher};

/// Argument map attached to an event (`args` in the output object).
pub type ArgMap = Map<String, Value>;

/// Single-character event kind tag (`ph` in the output object).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Duration begin (`B`)
    Begin,
    /// Duration end (`E`)
    End,
    /// Counter sample (`C`)
    Counter,
    /// Instant event (`i`)
    Instant,
    /// Metadata record (`M`)
    Metadata,
}

impl Phase {
    pub fn as_char(self) -> char {
        match self {
            Phase::Begin => 'B',
            Phase::End => 'E',
            Phase::Counter => 'C',
            Phase::Instant => 'i',
            Phase::Metadata => 'M',
        }
    }
}

/// Scope of an instant event (`s` in the output object).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstantScope {
    /// Visible across the whole trace (`g`)
    Global,
    /// Visible to the emitting process (`p`)
    Process,
    /// Visible to the emitting thread (`t`)
    #[default]
    Thread,
}

impl InstantScope {
    pub fn as_char(self) -> char {
        match self {
            InstantScope::Global => 'g',
            InstantScope::Process => 'p',
            InstantScope::Thread => 't',
        }
    }
}

/// Closed set of event variants, dispatched by tag rather than virtual call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// Start of a named duration span
    Begin,
    /// End of a duration span (name optional for anonymous ends)
    End,
    /// Counter sample; series values live in `args`
    Counter {
        /// Optional explicit counter id, emitted as `id` when set
        id: Option<i32>,
    },
    /// Point-in-time event with a visibility scope
    Instant { scope: InstantScope },
    /// Metadata record (conventionally `thread_name` / `process_name`)
    Metadata,
}

impl EventKind {
    pub fn phase(&self) -> Phase {
        match self {
            EventKind::Begin => Phase::Begin,
            EventKind::End => Phase::End,
            EventKind::Counter { .. } => Phase::Counter,
            EventKind::Instant { .. } => Phase::Instant,
            EventKind::Metadata => Phase::Metadata,
        }
    }
}

/// One trace event record.
///
/// A zero `pid` or `tid` handed to the constructor is replaced by the real
/// process id / thread token, so serialized events never carry an unset
/// identity.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    name: String,
    categories: Vec<String>,
    kind: EventKind,
    ts: i64,
    pid: u32,
    tid: u64,
    args: ArgMap,
    cname: Option<String>,
}

impl Event {
    /// Create an event stamped with the current process and thread identity.
    pub fn new(kind: EventKind, name: impl Into<String>, ts: i64) -> Self {
        Self::with_identity(kind, name, ts, 0, 0)
    }

    /// Create an event with an explicit identity; zero means "fill in the
    /// caller's real pid/tid".
    pub fn with_identity(
        kind: EventKind,
        name: impl Into<String>,
        ts: i64,
        tid: u64,
        pid: u32,
    ) -> Self {
        let pid = if pid == 0 { std::process::id() } else { pid };
        let tid = if tid == 0 { thread_token() } else { tid };
        Event {
            name: name.into(),
            categories: Vec::new(),
            kind,
            ts,
            pid,
            tid,
            args: ArgMap::new(),
            cname: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    pub fn phase(&self) -> Phase {
        self.kind.phase()
    }

    pub fn ts(&self) -> i64 {
        self.ts
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn tid(&self) -> u64 {
        self.tid
    }

    pub fn args(&self) -> &ArgMap {
        &self.args
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn set_categories<S: AsRef<str>>(&mut self, categories: &[S]) {
        self.categories = categories.iter().map(|c| c.as_ref().to_string()).collect();
    }

    pub fn set_args(&mut self, args: ArgMap) {
        self.args = args;
    }

    pub fn set_arg(&mut self, key: impl Into<String>, value: Value) {
        self.args.insert(key.into(), value);
    }

    /// Record one counter series sample (counter events only by convention).
    pub fn set_value(&mut self, series: impl Into<String>, value: f64) {
        self.args.insert(series.into(), Value::from(value));
    }

    pub fn cname(&self) -> Option<&str> {
        self.cname.as_deref()
    }

    pub fn set_cname(&mut self, cname: impl Into<String>) {
        self.cname = Some(cname.into());
    }

    /// Serialize to the Chrome trace JSON object.
    ///
    /// Base fields first, then the variant's own fields. This cannot fail;
    /// unsupported arg values are coerced by [`coerce_arg`].
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("name".into(), Value::from(self.name.clone()));
        obj.insert("cat".into(), Value::from(self.categories.join(",")));
        obj.insert("ph".into(), Value::from(self.phase().as_char().to_string()));
        obj.insert("pid".into(), Value::from(self.pid));
        obj.insert("tid".into(), Value::from(self.tid));
        obj.insert("ts".into(), Value::from(self.ts.max(0)));
        if let Some(cname) = &self.cname {
            obj.insert("cname".into(), Value::from(cname.clone()));
        }
        let args: ArgMap = self
            .args
            .iter()
            .map(|(k, v)| (k.clone(), coerce_arg(v.clone())))
            .collect();
        obj.insert("args".into(), Value::Object(args));

        match &self.kind {
            EventKind::Counter { id: Some(id) } => {
                obj.insert("id".into(), Value::from(*id));
            }
            EventKind::Instant { scope } => {
                obj.insert("s".into(), Value::from(scope.as_char().to_string()));
            }
            _ => {}
        }
        Value::Object(obj)
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Coerce an arg value into the supported output set.
///
/// Numbers, strings and booleans pass through. Nested objects are coerced
/// recursively. Anything else (null, arrays) becomes its compact string
/// rendering so serialization can never fail.
pub fn coerce_arg(value: Value) -> Value {
    match value {
        Value::Number(_) | Value::String(_) | Value::Bool(_) => value,
        Value::Object(map) => {
            Value::Object(map.into_iter().map(|(k, v)| (k, coerce_arg(v))).collect())
        }
        other => Value::from(other.to_string()),
    }
}

/// Stable per-thread identity token.
///
/// FNV-1a hash of [`std::thread::ThreadId`], cached in a thread local. The
/// token is process-local and never 0 (0 is the "fill me in" sentinel).
pub fn thread_token() -> u64 {
    thread_local! {
        static TOKEN: Cell<u64> = const { Cell::new(0) };
    }
    TOKEN.with(|cached| {
        let mut token = cached.get();
        if token == 0 {
            let mut hasher = FnvHasher::default();
            std::thread::current().id().hash(&mut hasher);
            token = hasher.finish();
            if token == 0 {
                token = 1;
            }
            cached.set(token);
        }
        token
    })
}
