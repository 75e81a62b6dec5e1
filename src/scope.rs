//! Scoped begin/end instrumentation
//!
//! [`TraceScope`] emits a duration-begin event on construction and the
//! matching named end event on drop, so the end is emitted on every exit
//! path including early return and unwinding. Built purely on the
//! coordinator's public emit API; with no coordinator installed both halves
//! are silent no-ops.

use crate::event::ArgMap;
use crate::system::{trace_begin, trace_end_named};

/// RAII guard pairing a begin event with its end event.
///
/// Bind it to a local (`let _scope = ...`); dropping it immediately emits a
/// zero-length span.
#[must_use = "the scope ends when this guard drops"]
pub struct TraceScope {
    name: String,
    categories: Vec<String>,
}

impl TraceScope {
    pub fn new(name: &str, args: ArgMap, categories: &[&str]) -> Self {
        trace_begin(name, args, categories);
        TraceScope {
            name: name.to_string(),
            categories: categories.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for TraceScope {
    fn drop(&mut self) {
        let categories: Vec<&str> = self.categories.iter().map(String::as_str).collect();
        trace_end_named(&self.name, ArgMap::new(), &categories);
    }
}

/// Build a [`TraceScope`] with optional categories and `key => value` args.
///
/// ```
/// use tracefile::trace_scope;
///
/// fn load() {
///     let _scope = trace_scope!("load", &["io"], { "file" => "x.mda" });
///     // ... end event emitted on any exit path
/// }
/// ```
#[macro_export]
macro_rules! trace_scope {
    ($name:expr) => {
        $crate::TraceScope::new($name, $crate::ArgMap::new(), &[])
    };
    ($name:expr, $categories:expr) => {
        $crate::TraceScope::new($name, $crate::ArgMap::new(), $categories)
    };
    ($name:expr, $categories:expr, { $($key:expr => $value:expr),* $(,)? }) => {{
        let mut args = $crate::ArgMap::new();
        $(
            args.insert(($key).to_string(), ::serde_json::json!($value));
        )*
        $crate::TraceScope::new($name, args, $categories)
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_without_coordinator_is_harmless() {
        let scope = TraceScope::new("load", ArgMap::new(), &["io"]);
        assert_eq!(scope.name(), "load");
        drop(scope);
    }

    #[test]
    fn test_scope_survives_early_return() {
        fn body(fail: bool) -> Result<(), String> {
            let _scope = TraceScope::new("body", ArgMap::new(), &[]);
            if fail {
                return Err("failed".to_string());
            }
            Ok(())
        }
        assert!(body(false).is_ok());
        assert!(body(true).is_err());
    }

    #[test]
    fn test_macro_forms() {
        let plain = trace_scope!("plain");
        assert_eq!(plain.name(), "plain");

        let with_cats = trace_scope!("cats", &["io", "disk"]);
        assert_eq!(with_cats.name(), "cats");

        let with_args = trace_scope!("args", &["io"], {
            "file" => "x.mda",
            "attempt" => 2,
        });
        assert_eq!(with_args.name(), "args");
    }
}
