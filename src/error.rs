// ============================================================================
// error.rs — subsystem error taxonomy
// ============================================================================
//
// Errors are modeled as result variants at subsystem boundaries rather than
// as out-of-band exceptions: callers branch on the cause, and "doctor" can
// introspect a `ConfigError` without anything having been raised.
// ============================================================================

use std::path::PathBuf;

/// Why `Config::attempt_init` could not produce a usable `Config`.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("OVERRUN_CONFIG points to a file that does not exist: {0}")]
    EnvPathNotFound(PathBuf),

    #[error("config flag points to a file that does not exist: {0}")]
    ExplicitPathNotFound(PathBuf),

    #[error("the config file is not valid toml: {0}")]
    InvalidToml(String),

    #[error("the config is not valid: {0}")]
    InvalidConfig(String),

    #[error("not in an overrun project directory")]
    NotInProject,

    #[error("failed to read the config file: {0}")]
    IoError(String),
}

/// Why `Registry::attempt_init` or dependency-graph construction failed.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no usable configuration: {0}")]
    NoConfig(ConfigError),

    #[error("target dependencies are cyclical: {0}")]
    DependencyCycle(String),

    #[error("no target named '{0}' exists")]
    UnknownDependency(String),

    #[error("unknown component type '{0}' in target '{1}'")]
    UnknownComponentType(String, String),

    #[error("{} name collision(s):\n{}", .0.len(), .0.join("\n"))]
    NameCollision(Vec<String>),

    #[error("{} invalid target document(s):\n{}", .0.len(), .0.join("\n"))]
    InvalidTargetDocument(Vec<String>),
}

/// Failures surfaced by the lifecycle scheduler.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("stop signal received")]
    Cancelled,

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("target '{target}' failed to start: {source}")]
    ComponentStart {
        target: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("target '{target}' failed while running: {source}")]
    ComponentRun {
        target: String,
        #[source]
        source: anyhow::Error,
    },
}
