// ============================================================================
// registry.rs — loads target documents, assigns names, builds the DAG
// ============================================================================
//
// Dependency graphs are built in two passes. First a name-level DFS checks
// every declared dependency exists and orders names topologically,
// detecting cycles. Only then are `TargetDef`s actually constructed, walked
// in that same topological order so a target's dependencies are always
// already-built `Arc<TargetDef>`s by the time it needs them.
// ============================================================================

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::component;
use crate::config::Config;
use crate::error::RegistryError;
use crate::types::{ComponentDef, TargetDef, TargetDoc};

pub struct Registry {
    target_docs: HashMap<String, TargetDoc>,
}

impl Registry {
    /// Loads and validates every target document reachable from `config`'s
    /// target directories, assigning each a final name.
    pub fn attempt_init(config: &Config) -> Result<Registry, RegistryError> {
        let docs = load_target_docs(config)?;
        let target_docs = determine_names(docs)?;
        Ok(Registry { target_docs })
    }

    /// Convenience entry point for callers (the CLI) holding a `Config`
    /// result rather than an already-unwrapped `Config`: a prior
    /// `ConfigError` propagates as `RegistryError::NoConfig` instead of
    /// making every caller unwrap twice.
    pub fn attempt_init_from(
        config: Result<Config, crate::error::ConfigError>,
    ) -> Result<Registry, RegistryError> {
        let config = config.map_err(RegistryError::NoConfig)?;
        Registry::attempt_init(&config)
    }

    /// All known target names and the file each is defined in, for `target
    /// list`.
    pub fn target_names(&self) -> Vec<(&str, &std::path::Path)> {
        let mut names: Vec<(&str, &std::path::Path)> = self
            .target_docs
            .iter()
            .map(|(name, doc)| (name.as_str(), doc.path.as_path()))
            .collect();
        names.sort_by_key(|(name, _)| *name);
        names
    }

    /// Builds the dependency DAG rooted at `target_name`: a name-level DFS
    /// and topological sort first, then a second pass materializing
    /// `TargetDef`s in that order.
    pub fn dependency_graph(&self, target_name: &str) -> Result<Vec<Arc<TargetDef>>, RegistryError> {
        let order = self.topological_name_order(target_name)?;

        let mut built: HashMap<String, Arc<TargetDef>> = HashMap::new();
        for name in &order {
            let doc = self.target_docs.get(name).expect("validated during DFS");
            let dependencies = doc
                .target
                .dependencies
                .iter()
                .map(|dep_name| built.get(dep_name).expect("built in topological order").clone())
                .collect();

            let components = component_defs(doc, name)?;

            let target_def = Arc::new(TargetDef {
                name: name.clone(),
                path: doc.path.clone(),
                project: doc.project.clone(),
                dependencies,
                components,
            });
            built.insert(name.clone(), target_def);
        }

        Ok(order
            .into_iter()
            .map(|name| built.remove(&name).expect("just inserted"))
            .collect())
    }

    /// DFS from `target_name` over declared dependency names, producing a
    /// topological order. Every visited name must exist in the registry.
    fn topological_name_order(&self, target_name: &str) -> Result<Vec<String>, RegistryError> {
        let mut order = Vec::new();
        let mut permanent = HashSet::new();
        let mut in_progress = HashSet::new();
        let mut path = Vec::new();

        self.visit(target_name, &mut order, &mut permanent, &mut in_progress, &mut path)?;
        Ok(order)
    }

    fn visit(
        &self,
        name: &str,
        order: &mut Vec<String>,
        permanent: &mut HashSet<String>,
        in_progress: &mut HashSet<String>,
        path: &mut Vec<String>,
    ) -> Result<(), RegistryError> {
        if permanent.contains(name) {
            return Ok(());
        }
        if in_progress.contains(name) {
            let mut cycle = path.clone();
            cycle.push(name.to_string());
            let start = cycle.iter().position(|n| n == name).unwrap_or(0);
            return Err(RegistryError::DependencyCycle(cycle[start..].join(" -> ")));
        }

        let doc = self
            .target_docs
            .get(name)
            .ok_or_else(|| RegistryError::UnknownDependency(name.to_string()))?;

        in_progress.insert(name.to_string());
        path.push(name.to_string());

        for dependency in &doc.target.dependencies {
            self.visit(dependency, order, permanent, in_progress, path)?;
        }

        path.pop();
        in_progress.remove(name);
        permanent.insert(name.to_string());
        order.push(name.to_string());
        Ok(())
    }
}

fn component_defs(doc: &TargetDoc, target_name: &str) -> Result<Vec<ComponentDef>, RegistryError> {
    doc.extra
        .iter()
        .filter_map(|(key, value)| value.as_table().map(|table| (key, table)))
        .map(|(key, table)| {
            let constructor = component::lookup(key).ok_or_else(|| {
                RegistryError::UnknownComponentType(key.clone(), target_name.to_string())
            })?;
            Ok(ComponentDef {
                name: key.clone(),
                constructor,
                args: table.clone(),
            })
        })
        .collect()
}

fn determine_names(docs: Vec<TargetDoc>) -> Result<HashMap<String, TargetDoc>, RegistryError> {
    let mut by_name: HashMap<String, TargetDoc> = HashMap::new();
    let mut conflicts = Vec::new();

    for doc in docs {
        let name = doc.resolved_name();
        match by_name.get(&name) {
            Some(existing) => conflicts.push(format!(
                "target with name '{name}' defined in both {} and {}",
                doc.path.display(),
                existing.path.display()
            )),
            None => {
                by_name.insert(name, doc);
            }
        }
    }

    if !conflicts.is_empty() {
        return Err(RegistryError::NameCollision(conflicts));
    }
    Ok(by_name)
}

fn load_target_docs(config: &Config) -> Result<Vec<TargetDoc>, RegistryError> {
    let mut docs = Vec::new();
    let mut errors = Vec::new();

    for (project, dirs) in &config.target_directories {
        for dir in dirs {
            match search_target_dir(dir, project) {
                Ok(mut found) => docs.append(&mut found),
                Err(mut dir_errors) => errors.append(&mut dir_errors),
            }
        }
    }

    if !errors.is_empty() {
        return Err(RegistryError::InvalidTargetDocument(errors));
    }
    Ok(docs)
}

fn search_target_dir(
    dir: &std::path::Path,
    project: &std::path::Path,
) -> Result<Vec<TargetDoc>, Vec<String>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => return Err(vec![format!("{}: {err}", dir.display())]),
    };

    let mut docs = Vec::new();
    let mut errors = Vec::new();

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("toml") {
            continue;
        }

        match std::fs::read_to_string(&path) {
            Ok(contents) => match TargetDoc::parse(&contents, path.clone(), project.to_path_buf()) {
                Ok(doc) => docs.push(doc),
                Err(err) => errors.push(format!("{}: {err}", path.display())),
            },
            Err(err) => errors.push(format!("{}: {err}", path.display())),
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }
    Ok(docs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::register_builtin_components;
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn config_with(root: &TempDir, dirs: &[&str]) -> Config {
        register_builtin_components();
        let project = root.path().to_path_buf();
        let mut target_directories = HashMap::new();
        target_directories.insert(
            project.clone(),
            dirs.iter().map(|d| root.path().join(d)).collect::<HashSet<_>>(),
        );
        Config {
            pwd: project.clone(),
            options: crate::config::ConfigOptions::default(),
            current_working_project: project.clone(),
            sibling_projects: HashSet::new(),
            projects: HashSet::from([project]),
            target_directories,
        }
    }

    fn write(dir: &std::path::Path, name: &str, contents: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(name), contents).unwrap();
    }

    #[test]
    fn dependency_cycle_names_every_node() {
        let root = TempDir::new().unwrap();
        let targets = root.path().join("targets");
        write(&targets, "x.toml", "[target]\ndependencies = [\"y\"]\n");
        write(&targets, "y.toml", "[target]\ndependencies = [\"z\"]\n");
        write(&targets, "z.toml", "[target]\ndependencies = [\"x\"]\n");

        let config = config_with(&root, &["targets"]);
        let registry = Registry::attempt_init(&config).unwrap();
        let err = registry.dependency_graph("x").unwrap_err();
        match err {
            RegistryError::DependencyCycle(msg) => {
                assert!(msg.contains('x') && msg.contains('y') && msg.contains('z'));
                assert!(msg.contains(" -> "));
            }
            other => panic!("expected DependencyCycle, got {other:?}"),
        }
    }

    #[test]
    fn name_collision_reports_both_paths() {
        let root = TempDir::new().unwrap();
        let proj_a = root.path().join("a/targets");
        let proj_b = root.path().join("b/targets");
        write(&proj_a, "one.toml", "");
        write(&proj_b, "one.toml", "");

        let mut target_directories = HashMap::new();
        target_directories.insert(root.path().join("a"), HashSet::from([proj_a]));
        target_directories.insert(root.path().join("b"), HashSet::from([proj_b]));
        let config = Config {
            pwd: root.path().to_path_buf(),
            options: crate::config::ConfigOptions::default(),
            current_working_project: root.path().to_path_buf(),
            sibling_projects: HashSet::new(),
            projects: HashSet::from([root.path().join("a"), root.path().join("b")]),
            target_directories,
        };

        let err = Registry::attempt_init(&config).unwrap_err();
        match err {
            RegistryError::NameCollision(messages) => {
                assert_eq!(messages.len(), 1);
                assert!(messages[0].contains("one.toml"));
            }
            other => panic!("expected NameCollision, got {other:?}"),
        }
    }

    #[test]
    fn dependency_graph_orders_dependencies_before_dependents() {
        let root = TempDir::new().unwrap();
        let targets = root.path().join("targets");
        write(&targets, "leaf.toml", "");
        write(&targets, "top.toml", "[target]\ndependencies = [\"leaf\"]\n");

        let config = config_with(&root, &["targets"]);
        let registry = Registry::attempt_init(&config).unwrap();
        let graph = registry.dependency_graph("top").unwrap();

        let names: Vec<&str> = graph.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["leaf", "top"]);
    }

    #[test]
    fn unknown_dependency_is_reported() {
        let root = TempDir::new().unwrap();
        let targets = root.path().join("targets");
        write(&targets, "top.toml", "[target]\ndependencies = [\"missing\"]\n");

        let config = config_with(&root, &["targets"]);
        let registry = Registry::attempt_init(&config).unwrap();
        let err = registry.dependency_graph("top").unwrap_err();
        assert_eq!(err, RegistryError::UnknownDependency("missing".to_string()));
    }

    #[test]
    fn unknown_component_type_is_reported() {
        let root = TempDir::new().unwrap();
        let targets = root.path().join("targets");
        write(&targets, "top.toml", "[nonexistent_type]\nfoo = 1\n");

        let config = config_with(&root, &["targets"]);
        let registry = Registry::attempt_init(&config).unwrap();
        let err = registry.dependency_graph("top").unwrap_err();
        assert_eq!(
            err,
            RegistryError::UnknownComponentType("nonexistent_type".to_string(), "top".to_string())
        );
    }

    #[test]
    fn explicit_name_overrides_file_basename() {
        let root = TempDir::new().unwrap();
        let targets = root.path().join("targets");
        write(&targets, "file.toml", "[target]\nname = \"custom\"\n");

        let config = config_with(&root, &["targets"]);
        let registry = Registry::attempt_init(&config).unwrap();
        let names: Vec<&str> = registry.target_names().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["custom"]);
    }
}
