// ============================================================================
// config.rs — configuration resolution and workspace discovery
// ============================================================================
//
// Locates the config file (if any), deserializes `ConfigOptions` with
// default-filling, then discovers the current working project (CWP), its
// siblings, and the target directories beneath each project in `projects`.
// ============================================================================

use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const ENV_CONFIG_PATH: &str = "OVERRUN_CONFIG";

// ---------------------------------------------------------------------------
// Patterns: knobs that drive project/sibling/target-directory discovery
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patterns {
    /// A directory is a project root if it has a direct child matching any
    /// of these (files or directories both count).
    #[serde(default = "default_projects")]
    pub projects: Vec<PathBuf>,

    /// Glob patterns searched for sibling projects. Absolute patterns are
    /// expanded against the filesystem root; relative ones against the CWP.
    #[serde(default = "default_siblings")]
    pub siblings: Vec<String>,

    /// Paths, relative to any project root, scanned for target files.
    #[serde(default = "default_target_directories")]
    pub target_directories: Vec<PathBuf>,
}

impl Default for Patterns {
    fn default() -> Self {
        Patterns {
            projects: default_projects(),
            siblings: default_siblings(),
            target_directories: default_target_directories(),
        }
    }
}

fn default_projects() -> Vec<PathBuf> {
    vec![PathBuf::from(".overrun")]
}

fn default_siblings() -> Vec<String> {
    vec!["../*".to_string()]
}

fn default_target_directories() -> Vec<PathBuf> {
    vec![PathBuf::from(".overrun/targets")]
}

// ---------------------------------------------------------------------------
// ConfigOptions: the deserialized shape of the config file
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConfigOptions {
    #[serde(default)]
    pub patterns: Patterns,
}

// ---------------------------------------------------------------------------
// Config: the resolved workspace
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub pwd: PathBuf,
    pub options: ConfigOptions,
    pub current_working_project: PathBuf,
    pub sibling_projects: HashSet<PathBuf>,
    pub projects: HashSet<PathBuf>,
    pub target_directories: HashMap<PathBuf, HashSet<PathBuf>>,
}

/// Where to read the config file from, if anywhere.
pub enum ConfigSource<'a> {
    /// An explicit `--config` style path.
    Path(PathBuf),
    /// An in-memory TOML document (tests, or a caller that already has the
    /// bytes in hand).
    Reader(&'a mut dyn Read),
}

impl Config {
    /// Resolves the workspace rooted at the current directory.
    ///
    /// Resolution order for the config file: `$OVERRUN_CONFIG`, then
    /// `config_file` if given, then `~/.config/overrun/config.toml`, then no
    /// file at all (defaults only).
    pub fn attempt_init(config_file: Option<ConfigSource>) -> Result<Config, ConfigError> {
        let options = load_options(config_file)?;

        let pwd = std::env::current_dir()
            .map_err(|e| ConfigError::IoError(e.to_string()))?
            .canonicalize()
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let current_working_project = find_current_working_project(&pwd, &options)?;
        let sibling_projects = find_sibling_projects(&current_working_project, &options)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let mut projects = sibling_projects.clone();
        projects.insert(current_working_project.clone());

        let target_directories = find_target_directories(&projects, &options);

        Ok(Config {
            pwd,
            options,
            current_working_project,
            sibling_projects,
            projects,
            target_directories,
        })
    }
}

fn load_options(config_file: Option<ConfigSource>) -> Result<ConfigOptions, ConfigError> {
    let contents = match resolve_config_source(config_file)? {
        Some(contents) => contents,
        None => return Ok(ConfigOptions::default()),
    };

    // Parse and schema-validate in separate passes so the two failure modes
    // surface as distinct cause codes: malformed TOML vs. a well-formed
    // document that doesn't match `ConfigOptions`.
    let value: toml::Value =
        toml::from_str(&contents).map_err(|e| ConfigError::InvalidToml(e.to_string()))?;
    ConfigOptions::deserialize(value).map_err(|e| ConfigError::InvalidConfig(e.to_string()))
}

/// Figures out which bytes (if any) to parse, honoring the env var /
/// explicit path / default path precedence described in `ConfigSource`.
fn resolve_config_source(config_file: Option<ConfigSource>) -> Result<Option<String>, ConfigError> {
    if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
        let path = expand_tilde(Path::new(&env_path));
        if !path.exists() {
            return Err(ConfigError::EnvPathNotFound(path));
        }
        return Ok(Some(read_file(&path)?));
    }

    match config_file {
        Some(ConfigSource::Path(path)) => {
            let expanded = expand_tilde(&path);
            if !expanded.exists() {
                return Err(ConfigError::ExplicitPathNotFound(path));
            }
            Ok(Some(read_file(&expanded)?))
        }
        Some(ConfigSource::Reader(reader)) => {
            let mut contents = String::new();
            reader
                .read_to_string(&mut contents)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            Ok(Some(contents))
        }
        None => {
            let default = expand_tilde(Path::new("~/.config/overrun/config.toml"));
            if default.exists() {
                Ok(Some(read_file(&default)?))
            } else {
                Ok(None)
            }
        }
    }
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))
}

fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}

// ---------------------------------------------------------------------------
// CWP discovery
// ---------------------------------------------------------------------------

fn has_project_indicator(dir: &Path, options: &ConfigOptions) -> bool {
    options
        .patterns
        .projects
        .iter()
        .any(|indicator| dir.join(indicator).exists())
}

fn find_current_working_project(
    pwd: &Path,
    options: &ConfigOptions,
) -> Result<PathBuf, ConfigError> {
    let mut dir = pwd;
    loop {
        if has_project_indicator(dir, options) {
            return Ok(dir.to_path_buf());
        }
        match dir.parent() {
            Some(parent) => dir = parent,
            None => {
                // `dir` is now the filesystem root; already checked above.
                return Err(ConfigError::NotInProject);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Sibling discovery
// ---------------------------------------------------------------------------

fn find_sibling_projects(
    cwp: &Path,
    options: &ConfigOptions,
) -> std::io::Result<HashSet<PathBuf>> {
    let mut candidates: HashSet<PathBuf> = HashSet::new();

    for pattern in &options.patterns.siblings {
        if Path::new(pattern).is_absolute() {
            candidates.extend(sibling_absolute_expansions(pattern, cwp));
        } else {
            candidates.extend(sibling_relative_expansions(pattern, cwp));
        }
    }

    Ok(candidates
        .into_iter()
        .filter(|path| has_project_indicator(path, options))
        .collect())
}

fn canonical_or_self(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

fn sibling_absolute_expansions(pattern: &str, cwp: &Path) -> HashSet<PathBuf> {
    let cwp = canonical_or_self(cwp);
    glob::glob(pattern)
        .into_iter()
        .flatten()
        .filter_map(Result::ok)
        .map(|p| canonical_or_self(&p))
        .filter(|p| p != &cwp)
        .collect()
}

fn sibling_relative_expansions(pattern: &str, cwp: &Path) -> HashSet<PathBuf> {
    let cwp_canon = canonical_or_self(cwp);
    let full_pattern = cwp.join(pattern);
    let pattern_str = full_pattern.to_string_lossy().to_string();
    glob::glob(&pattern_str)
        .into_iter()
        .flatten()
        .filter_map(Result::ok)
        .map(|p| canonical_or_self(&p))
        .filter(|p| p != &cwp_canon)
        .collect()
}

// ---------------------------------------------------------------------------
// Target-directory resolution
// ---------------------------------------------------------------------------

fn find_target_directories(
    projects: &HashSet<PathBuf>,
    options: &ConfigOptions,
) -> HashMap<PathBuf, HashSet<PathBuf>> {
    let mut result: HashMap<PathBuf, HashSet<PathBuf>> = HashMap::new();

    for project in projects {
        for pattern in &options.patterns.target_directories {
            let joined = project.join(pattern);
            if joined.is_dir() {
                let canonical = canonical_or_self(&joined);
                result
                    .entry(project.clone())
                    .or_default()
                    .insert(canonical);
            }
        }
    }

    result
}
