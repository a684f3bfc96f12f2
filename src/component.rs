// ============================================================================
// component.rs — lifecycle capability traits and the component catalog
// ============================================================================
//
// A component may implement any subset of {start, run, stop, reset}.
// Capabilities are modeled as four narrow traits rather than inheritance;
// a concrete component implements `Component` plus whichever capability
// traits apply, and exposes them structurally through the `as_*` methods
// so the runtime can detect what it supports without downcasting.
// ============================================================================

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::Context;

#[async_trait]
pub trait Startable: Send + Sync {
    async fn start(&self, ctx: &Context) -> anyhow::Result<()>;
}

#[async_trait]
pub trait Runable: Send + Sync {
    async fn run(&self, ctx: &Context) -> anyhow::Result<()>;
}

#[async_trait]
pub trait Stopable: Send + Sync {
    async fn stop(&self, ctx: &Context) -> anyhow::Result<()>;
}

#[async_trait]
pub trait Resetable: Send + Sync {
    async fn reset(&self, ctx: &Context) -> anyhow::Result<()>;
}

/// A component instance, structurally exposing whichever lifecycle
/// capabilities it implements. Default impls return `None`; a component
/// overrides the ones it actually implements.
pub trait Component: Send + Sync {
    fn as_startable(&self) -> Option<&dyn Startable> {
        None
    }
    fn as_runable(&self) -> Option<&dyn Runable> {
        None
    }
    fn as_stopable(&self) -> Option<&dyn Stopable> {
        None
    }
    fn as_resetable(&self) -> Option<&dyn Resetable> {
        None
    }
}

/// Builds a component instance from its context and its TOML argument
/// table. Returns an error if the args don't match the component's own
/// schema.
pub type Constructor =
    fn(ctx: &Context, args: toml::Table) -> anyhow::Result<Arc<dyn Component>>;

type Catalog = Mutex<HashMap<String, Constructor>>;

fn catalog() -> &'static Catalog {
    static CATALOG: OnceLock<Catalog> = OnceLock::new();
    CATALOG.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Registers a component type under its canonical (snake_case) name.
/// Idempotent: registering the same name again replaces the constructor.
pub fn register(name: &str, constructor: Constructor) {
    catalog()
        .lock()
        .expect("component catalog poisoned")
        .insert(name.to_string(), constructor);
}

/// Looks up a registered constructor by canonical component-type name.
pub fn lookup(name: &str) -> Option<Constructor> {
    catalog()
        .lock()
        .expect("component catalog poisoned")
        .get(name)
        .copied()
}

/// All currently-registered component-type names, for `component list`.
pub fn registered_names() -> Vec<String> {
    let mut names: Vec<String> = catalog()
        .lock()
        .expect("component catalog poisoned")
        .keys()
        .cloned()
        .collect();
    names.sort();
    names
}

/// Converts a type name (as written in Rust, e.g. `Exec`, `Homebrew`) to
/// its canonical snake_case catalog key. Ported from the original's
/// two-pass regex (acronym boundary, then lower/digit→upper boundary)
/// without pulling in a regex dependency for one helper.
pub fn camel_to_snake(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let n = chars.len();
    let mut underscore_before = vec![false; n];

    // Pass 1: an uppercase letter starting a lowercase run, preceded by
    // any character, e.g. the "S" in "HTTPServer" (preceded by "P").
    for i in 1..n {
        if chars[i].is_uppercase() && i + 1 < n && chars[i + 1].is_lowercase() {
            underscore_before[i] = true;
        }
    }

    // Pass 2: a lowercase letter or digit immediately followed by an
    // uppercase letter, e.g. the "S" in "MdSum" (preceded by digit "5").
    for i in 1..n {
        if chars[i].is_uppercase() && (chars[i - 1].is_lowercase() || chars[i - 1].is_ascii_digit())
        {
            underscore_before[i] = true;
        }
    }

    let mut out = String::with_capacity(n + 4);
    for (i, &c) in chars.iter().enumerate() {
        if i > 0 && underscore_before[i] {
            out.push('_');
        }
        out.push(c.to_ascii_lowercase());
    }
    out
}

/// Registers the reference components shipped with this crate. Idempotent
/// and cheap to call repeatedly (tests call it directly since Rust has no
/// import-time registration side effect to rely on).
pub fn register_builtin_components() {
    static ONCE: std::sync::Once = std::sync::Once::new();
    ONCE.call_once(|| {
        crate::components::exec::register();
        crate::components::homebrew::register();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camel_case_conversion() {
        assert_eq!(camel_to_snake("Exec"), "exec");
        assert_eq!(camel_to_snake("Homebrew"), "homebrew");
        assert_eq!(camel_to_snake("HomeBrew"), "home_brew");
        assert_eq!(camel_to_snake("HTTPServer"), "http_server");
        assert_eq!(camel_to_snake("Md5Sum"), "md5_sum");
    }

    #[test]
    fn register_then_lookup() {
        fn ctor(_ctx: &Context, _args: toml::Table) -> anyhow::Result<Arc<dyn Component>> {
            struct Noop;
            impl Component for Noop {}
            Ok(Arc::new(Noop))
        }
        register("test_only_component", ctor);
        assert!(lookup("test_only_component").is_some());
        assert!(lookup("definitely_not_registered").is_none());
    }
}
