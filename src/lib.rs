// ============================================================================
// lib.rs — overrun-core: workspace discovery, target registry, lifecycle
// runtime
// ============================================================================
//
// The CLI binary (`main.rs`) is the only external collaborator: argument
// parsing, "doctor"/"config" rendering, and logging configuration all live
// there. This crate exposes the three core subsystems — configuration
// resolution, target graph construction, and the lifecycle scheduler — plus
// the component capability model and the reference components that ground
// it.
// ============================================================================

pub mod component;
pub mod components;
pub mod config;
pub mod context;
pub mod error;
pub mod options;
pub mod registry;
pub mod runtime;
pub mod target;
pub mod types;

pub use component::{register_builtin_components, Component, Resetable, Runable, Startable, Stopable};
pub use config::{Config, ConfigOptions, ConfigSource};
pub use context::Context;
pub use error::{ConfigError, RegistryError, RuntimeError};
pub use registry::Registry;
pub use target::Target;
pub use types::{ComponentDef, TargetDef, TargetDoc};
