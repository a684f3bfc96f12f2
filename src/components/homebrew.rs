// ============================================================================
// components::homebrew — ensure Homebrew packages are installed
// ============================================================================
//
// Startable only: there is nothing to run or stop once the packages are in
// place. Checks are sequential (`brew list <pkg>` per package) and any
// missing packages are installed with a single combined `brew install` call.
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::component::{self, Component, Startable};
use crate::context::Context;

pub fn register() {
    component::register(&component::camel_to_snake("Homebrew"), construct);
}

fn construct(_ctx: &Context, args: toml::Table) -> anyhow::Result<Arc<dyn Component>> {
    let doc = ArgsDoc::deserialize(toml::Value::Table(args))?;
    Ok(Arc::new(Homebrew {
        packages: doc.packages,
    }))
}

#[derive(Debug, Deserialize)]
struct ArgsDoc {
    packages: Vec<String>,
}

struct Homebrew {
    packages: Vec<String>,
}

impl Component for Homebrew {
    fn as_startable(&self) -> Option<&dyn Startable> {
        Some(self)
    }
}

#[async_trait]
impl Startable for Homebrew {
    async fn start(&self, ctx: &Context) -> anyhow::Result<()> {
        let mut already_installed = Vec::new();
        let mut to_install = Vec::new();

        for package in &self.packages {
            if check_installed(package).await? {
                already_installed.push(package.clone());
            } else {
                to_install.push(package.clone());
            }
        }

        if !to_install.is_empty() {
            tracing::info!(
                target = %ctx.target_name,
                packages = %to_install.join(", "),
                "installing homebrew packages",
            );
            install(&to_install).await?;
        } else if !already_installed.is_empty() {
            tracing::debug!(
                target = %ctx.target_name,
                "homebrew packages already installed",
            );
        }
        Ok(())
    }
}

async fn check_installed(package: &str) -> anyhow::Result<bool> {
    let status = tokio::process::Command::new("brew")
        .arg("list")
        .arg(package)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .await?;
    Ok(status.success())
}

async fn install(packages: &[String]) -> anyhow::Result<()> {
    let status = tokio::process::Command::new("brew")
        .arg("install")
        .args(packages)
        .status()
        .await?;
    if !status.success() {
        anyhow::bail!("failed to install homebrew packages");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;
    use tokio::sync::mpsc;

    fn context() -> Context {
        let (tx, _rx) = mpsc::unbounded_channel();
        Context {
            target_name: "t".to_string(),
            cwd: std::env::temp_dir(),
            cwp: std::env::temp_dir(),
            event_queue: StdArc::new(tx),
        }
    }

    #[test]
    fn deserializes_package_list() {
        let mut table = toml::Table::new();
        table.insert(
            "packages".into(),
            toml::Value::Array(vec![toml::Value::String("jq".into())]),
        );
        let comp = construct(&context(), table).unwrap();
        assert!(comp.as_startable().is_some());
        assert!(comp.as_runable().is_none());
        assert!(comp.as_stopable().is_none());
    }

    #[test]
    fn rejects_missing_packages_field() {
        let table = toml::Table::new();
        assert!(construct(&context(), table).is_err());
    }
}
