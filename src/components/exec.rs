// ============================================================================
// components::exec — spawn an arbitrary subprocess as a component
// ============================================================================
//
// Teardown policy: a 100ms grace period for the process to exit on its own,
// then SIGTERM with a 5s wait, then SIGKILL. Mirrors a supervisor's usual
// "ask nicely, then insist" shutdown ladder.
// ============================================================================

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Child;
use tokio::sync::Mutex;

use crate::component::{self, Component, Runable, Startable, Stopable};
use crate::context::Context;

const STOP_GRACE: Duration = Duration::from_millis(100);
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

pub fn register() {
    component::register(&component::camel_to_snake("Exec"), construct);
}

fn construct(ctx: &Context, args: toml::Table) -> anyhow::Result<Arc<dyn Component>> {
    let doc = ArgsDoc::deserialize(toml::Value::Table(args))?;
    if doc.argv.is_empty() {
        anyhow::bail!("exec component requires a non-empty argv");
    }
    let cwd = match &doc.cwd {
        Some(rel) => ctx.cwd.join(rel),
        None => ctx.cwd.clone(),
    };

    let output_target = match &doc.output_file {
        Some(rel) => {
            let path = cwd.join(rel);
            if let Some(parent) = path.parent() {
                if !parent.exists() {
                    tracing::debug!(
                        target = %ctx.target_name,
                        "creating directory to contain exec output_file",
                    );
                    std::fs::create_dir_all(parent)?;
                }
            }
            OutputTarget::File(path)
        }
        None => OutputTarget::Inherit,
    };

    Ok(Arc::new(Exec {
        argv: doc.argv,
        cwd,
        env: doc.env,
        output_target,
        child: Mutex::new(None),
    }))
}

#[derive(Debug, Deserialize)]
struct ArgsDoc {
    argv: Vec<String>,
    cwd: Option<PathBuf>,
    env: Option<HashMap<String, String>>,
    output_file: Option<PathBuf>,
}

#[derive(Debug)]
enum OutputTarget {
    File(PathBuf),
    Inherit,
}

impl OutputTarget {
    fn stdio_pair(&self) -> anyhow::Result<(Stdio, Stdio)> {
        match self {
            OutputTarget::File(path) => {
                let out = std::fs::OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(path)?;
                let err = out.try_clone()?;
                Ok((Stdio::from(out), Stdio::from(err)))
            }
            OutputTarget::Inherit => Ok((Stdio::inherit(), Stdio::inherit())),
        }
    }
}

struct Exec {
    argv: Vec<String>,
    cwd: PathBuf,
    env: Option<HashMap<String, String>>,
    output_target: OutputTarget,
    child: Mutex<Option<Child>>,
}

impl Component for Exec {
    fn as_startable(&self) -> Option<&dyn Startable> {
        Some(self)
    }
    fn as_runable(&self) -> Option<&dyn Runable> {
        Some(self)
    }
    fn as_stopable(&self) -> Option<&dyn Stopable> {
        Some(self)
    }
}

#[async_trait]
impl Startable for Exec {
    async fn start(&self, ctx: &Context) -> anyhow::Result<()> {
        tracing::debug!(
            target = %ctx.target_name,
            program = %self.argv[0],
            "spawning process",
        );

        let mut cmd = tokio::process::Command::new(&self.argv[0]);
        cmd.args(&self.argv[1..]).current_dir(&self.cwd);

        if let Some(env) = &self.env {
            let mut env = env.clone();
            env.entry("PATH".to_string())
                .or_insert_with(|| std::env::var("PATH").unwrap_or_default());
            cmd.env_clear().envs(env);
        }

        let (stdout, stderr) = self.output_target.stdio_pair()?;
        cmd.stdout(stdout).stderr(stderr);

        let child = cmd.spawn()?;
        *self.child.lock().await = Some(child);
        Ok(())
    }
}

#[async_trait]
impl Runable for Exec {
    async fn run(&self, ctx: &Context) -> anyhow::Result<()> {
        let status = {
            let mut guard = self.child.lock().await;
            let child = guard.as_mut().expect("exec started before run");
            child.wait().await?
        };
        log_exit(&self.argv[0], &ctx.target_name, status.code());
        Ok(())
    }
}

#[async_trait]
impl Stopable for Exec {
    async fn stop(&self, ctx: &Context) -> anyhow::Result<()> {
        let mut guard = self.child.lock().await;
        let child = guard.as_mut().expect("exec started before stop");

        if let Ok(Ok(status)) = tokio::time::timeout(STOP_GRACE, child.wait()).await {
            log_exit(&self.argv[0], &ctx.target_name, status.code());
            return Ok(());
        }

        tracing::warn!(
            target = %ctx.target_name,
            program = %self.argv[0],
            grace_secs = STOP_TIMEOUT.as_secs(),
            "sending SIGTERM and waiting",
        );
        send_sigterm(child)?;

        match tokio::time::timeout(STOP_TIMEOUT, child.wait()).await {
            Ok(Ok(status)) => log_exit(&self.argv[0], &ctx.target_name, status.code()),
            Ok(Err(err)) => return Err(err.into()),
            Err(_) => {
                tracing::warn!(
                    target = %ctx.target_name,
                    program = %self.argv[0],
                    "timed out waiting for SIGTERM - sending SIGKILL",
                );
                child.start_kill()?;
                child.wait().await?;
            }
        }
        Ok(())
    }
}

fn log_exit(program: &str, target_name: &str, code: Option<i32>) {
    match code {
        Some(0) => tracing::debug!(target = %target_name, program, "process exited successfully"),
        other => tracing::warn!(target = %target_name, program, code = ?other, "process exited with non-zero status"),
    }
}

#[cfg(unix)]
fn send_sigterm(child: &Child) -> anyhow::Result<()> {
    let Some(pid) = child.id() else {
        // already reaped; there is a race between checking liveness and
        // signalling that the grace-period wait already resolves for us.
        return Ok(());
    };
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            return Err(err.into());
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn send_sigterm(child: &mut Child) -> anyhow::Result<()> {
    child.start_kill().map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;
    use tokio::sync::mpsc;

    fn context(target_name: &str, cwd: PathBuf) -> Context {
        let (tx, _rx) = mpsc::unbounded_channel();
        Context {
            target_name: target_name.to_string(),
            cwd: cwd.clone(),
            cwp: cwd,
            event_queue: StdArc::new(tx),
        }
    }

    #[tokio::test]
    async fn runs_a_process_to_completion() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = toml::Table::new();
        table.insert(
            "argv".into(),
            toml::Value::Array(vec![
                toml::Value::String("true".into()),
            ]),
        );
        let ctx = context("t", dir.path().to_path_buf());
        let comp = construct(&ctx, table).unwrap();

        comp.as_startable().unwrap().start(&ctx).await.unwrap();
        comp.as_runable().unwrap().run(&ctx).await.unwrap();
    }

    #[tokio::test]
    async fn writes_output_to_requested_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = toml::Table::new();
        table.insert(
            "argv".into(),
            toml::Value::Array(vec![
                toml::Value::String("echo".into()),
                toml::Value::String("hello".into()),
            ]),
        );
        table.insert("output_file".into(), toml::Value::String("out/log.txt".into()));
        let ctx = context("t", dir.path().to_path_buf());
        let comp = construct(&ctx, table).unwrap();

        comp.as_startable().unwrap().start(&ctx).await.unwrap();
        comp.as_runable().unwrap().run(&ctx).await.unwrap();

        let contents = std::fs::read_to_string(dir.path().join("out/log.txt")).unwrap();
        assert_eq!(contents.trim(), "hello");
    }

    #[test]
    fn rejects_empty_argv() {
        let dir = tempfile::tempdir().unwrap();
        let table = toml::Table::new();
        let ctx = context("t", dir.path().to_path_buf());
        assert!(construct(&ctx, table).is_err());
    }
}
