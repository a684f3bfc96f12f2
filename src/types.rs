// ============================================================================
// types.rs — the shapes the registry loads, resolves, and hands to targets
// ============================================================================
//
// `TargetDoc` is the raw, per-file deserialization: the most definitive
// source of what's valid in a target file. `TargetDef` is the resolved,
// instantiable form the scheduler actually drives, with its dependencies
// already constructed — acyclic by the time it exists, so `Arc` is enough
// to hold them without any arena or index indirection.
// ============================================================================

use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;

use crate::component::Constructor;

/// The deserializer for target files. Top-level keys other than `target`
/// are preserved verbatim in `extra` and later interpreted as component
/// declarations.
#[derive(Debug, Clone)]
pub struct TargetDoc {
    pub target: TargetMeta,
    pub extra: toml::Table,
    pub path: PathBuf,
    pub project: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TargetMeta {
    pub name: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl TargetDoc {
    /// Parses a target file's contents, pulling the `target` table out of
    /// the rest so every other top-level table is left as a component
    /// declaration in `extra`.
    pub fn parse(contents: &str, path: PathBuf, project: PathBuf) -> Result<TargetDoc, toml::de::Error> {
        let mut table: toml::Table = toml::from_str(contents)?;
        let target = match table.remove("target") {
            Some(value) => TargetMeta::deserialize(value)?,
            None => TargetMeta::default(),
        };
        Ok(TargetDoc {
            target,
            extra: table,
            path,
            project,
        })
    }

    /// `target.name` if present, else the file's basename without extension.
    pub fn resolved_name(&self) -> String {
        match &self.target.name {
            Some(name) => name.clone(),
            None => self
                .path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default(),
        }
    }
}

/// A component-type name, its constructor, and its raw TOML arguments.
#[derive(Clone)]
pub struct ComponentDef {
    pub name: String,
    pub constructor: Constructor,
    pub args: toml::Table,
}

/// A fully resolved target: a name, the file it came from, its owning
/// project, its already-resolved dependencies, and its ordered component
/// declarations.
pub struct TargetDef {
    pub name: String,
    pub path: PathBuf,
    pub project: PathBuf,
    pub dependencies: Vec<Arc<TargetDef>>,
    pub components: Vec<ComponentDef>,
}

impl PartialEq for TargetDef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.path == other.path
    }
}

impl Eq for TargetDef {}

impl Hash for TargetDef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.path.hash(state);
    }
}
