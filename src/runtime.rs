// ============================================================================
// runtime.rs — the lifecycle scheduler
// ============================================================================
//
// Drives a resolved target DAG through start -> run -> stop while honoring
// dependency ordering during start, running independents in parallel, and
// responding to a stop signal with an orderly teardown. The top-level `run`
// races a signal watcher, an event pump (currently a sink), and the
// lifecycle driver, exactly as `asyncio.wait(..., return_when=FIRST_COMPLETED)`
// would: whichever finishes first cancels the others, except that the
// driver is cancelled *cooperatively* via a token rather than dropped, so it
// can still unwind through its stop phase.
// ============================================================================

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::context::Context;
use crate::error::RuntimeError;
use crate::registry::Registry;
use crate::target::Target;
use crate::types::TargetDef;

/// Runs `target_name`'s transitive dependency closure through its full
/// lifecycle. Returns `Ok(())` both on clean completion and on a caught
/// stop signal (teardown already happened); only an unrecovered start/run
/// failure propagates as `Err`.
pub async fn run(registry: &Registry, config: &Config, target_name: &str) -> Result<(), RuntimeError> {
    let graph = registry.dependency_graph(target_name)?;
    let (event_tx, event_rx): (
        crate::context::EventSender,
        tokio::sync::mpsc::UnboundedReceiver<crate::context::EventNewOutputStream>,
    ) = tokio::sync::mpsc::unbounded_channel();
    let event_queue = Arc::new(event_tx);
    // Held for the duration of the run so sends never fail; the pump below
    // never drains it, matching the "currently a sink" design note.
    let _event_rx = event_rx;

    let cancellation = CancellationToken::new();

    let driver_cancellation = cancellation.clone();
    let cwp = config.current_working_project.clone();
    let mut driver = Box::pin(lifecycle_driver(graph, cwp, event_queue, driver_cancellation));

    let mut signals = StopSignals::install()?;

    tokio::select! {
        _ = signals.wait() => {
            tracing::info!("stop signal received, tearing down");
            cancellation.cancel();
            (&mut driver).await
        }
        _ = event_pump() => {
            unreachable!("event pump never completes")
        }
        result = &mut driver => {
            cancellation.cancel();
            result
        }
    }
}

/// Currently an extensibility stub: the event queue has no consumer yet,
/// so this future never resolves. Kept as its own function so the
/// `tokio::select!` above reads the same as the three-activities model
/// the scheduler is specified around.
async fn event_pump() {
    std::future::pending::<()>().await
}

#[cfg(unix)]
struct StopSignals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl StopSignals {
    fn install() -> Result<StopSignals, RuntimeError> {
        use tokio::signal::unix::{signal, SignalKind};
        let interrupt = signal(SignalKind::interrupt())
            .map_err(|e| RuntimeError::ComponentStart { target: "<signal>".into(), source: e.into() })?;
        let terminate = signal(SignalKind::terminate())
            .map_err(|e| RuntimeError::ComponentStart { target: "<signal>".into(), source: e.into() })?;
        Ok(StopSignals { interrupt, terminate })
    }

    async fn wait(&mut self) {
        tokio::select! {
            _ = self.interrupt.recv() => {}
            _ = self.terminate.recv() => {}
        }
    }
}

#[cfg(not(unix))]
struct StopSignals;

#[cfg(not(unix))]
impl StopSignals {
    fn install() -> Result<StopSignals, RuntimeError> {
        Ok(StopSignals)
    }

    async fn wait(&mut self) {
        // No SIGTERM equivalent off unix; Ctrl+C is the only stop signal
        // this platform can observe.
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// A target either hasn't been constructed yet, is mid-start, or has
/// finished starting (successfully or because it had nothing to start).
struct Node {
    target_def: Arc<TargetDef>,
    dependents: Vec<String>,
    pending_deps: usize,
}

async fn lifecycle_driver(
    graph: Vec<Arc<TargetDef>>,
    cwp: std::path::PathBuf,
    event_queue: Arc<crate::context::EventSender>,
    cancellation: CancellationToken,
) -> Result<(), RuntimeError> {
    let mut nodes: HashMap<String, Node> = HashMap::new();
    for target_def in &graph {
        nodes.insert(
            target_def.name.clone(),
            Node {
                target_def: target_def.clone(),
                dependents: Vec::new(),
                pending_deps: target_def.dependencies.len(),
            },
        );
    }
    for target_def in &graph {
        for dep in &target_def.dependencies {
            nodes.get_mut(&dep.name).expect("dependency in graph").dependents.push(target_def.name.clone());
        }
    }

    // Seed the ready queue in topological order so dispatch order is
    // deterministic given a frozen filesystem.
    let mut ready: VecDeque<String> = graph
        .iter()
        .filter(|t| nodes[&t.name].pending_deps == 0)
        .map(|t| t.name.clone())
        .collect();

    let mut targets: HashMap<String, Arc<Target>> = HashMap::new();
    let mut contexts: HashMap<String, Context> = HashMap::new();
    let mut start_order: Vec<String> = Vec::new();
    let mut pending_starts = FuturesUnordered::new();
    let mut cancelled = false;

    'phase1: loop {
        while let Some(name) = ready.pop_front() {
            let node = &nodes[&name];
            let ctx = Context {
                target_name: name.clone(),
                cwd: node
                    .target_def
                    .path
                    .parent()
                    .map(|p| p.to_path_buf())
                    .unwrap_or_default(),
                cwp: cwp.clone(),
                event_queue: event_queue.clone(),
            };
            let target = Arc::new(
                Target::from_target_def(&node.target_def, &ctx)
                    .map_err(|source| RuntimeError::ComponentStart { target: name.clone(), source })?,
            );
            contexts.insert(name.clone(), ctx);

            if target.startable() {
                let name_for_future = name.clone();
                let target_for_future = target.clone();
                let ctx_for_future = contexts[&name].clone();
                targets.insert(name.clone(), target);
                pending_starts.push(Box::pin(async move {
                    let result = target_for_future.start(&ctx_for_future).await;
                    (name_for_future, result)
                }));
            } else {
                targets.insert(name.clone(), target);
                start_order.push(name.clone());
                mark_started(&name, &mut nodes, &mut ready);
            }
        }

        if pending_starts.is_empty() {
            break 'phase1;
        }

        tokio::select! {
            _ = cancellation.cancelled() => {
                cancelled = true;
                break 'phase1;
            }
            Some((name, result)) = pending_starts.next() => {
                result.map_err(|source| RuntimeError::ComponentStart { target: name.clone(), source })?;
                start_order.push(name.clone());
                mark_started(&name, &mut nodes, &mut ready);
            }
        }
    }

    let mut run_error = None;

    if !cancelled {
        let mut run_futures = FuturesUnordered::new();
        for name in &start_order {
            let target = &targets[name];
            if target.runable() {
                let name = name.clone();
                let target = target.clone();
                let ctx = contexts[&name].clone();
                run_futures.push(Box::pin(async move {
                    let result = target.run(&ctx).await;
                    (name, result)
                }));
            }
        }

        'phase2: loop {
            if run_futures.is_empty() {
                break 'phase2;
            }
            tokio::select! {
                _ = cancellation.cancelled() => break 'phase2,
                Some((name, result)) = run_futures.next() => {
                    if let Err(source) = result {
                        run_error = Some(RuntimeError::ComponentRun { target: name, source });
                        break 'phase2;
                    }
                }
            }
        }
    }

    // Phase 3 is not interrupted by further signals: teardown runs to
    // completion once begun, regardless of how we got here, including a
    // run failure that aborted Phase 2 above.
    for name in start_order.iter().rev() {
        let target = &targets[name];
        if target.stopable() {
            let ctx = &contexts[name];
            if let Err(err) = target.stop(ctx).await {
                tracing::warn!(target = %name, error = %err, "stop failed, continuing teardown");
            }
        }
    }

    match run_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn mark_started(name: &str, nodes: &mut HashMap<String, Node>, ready: &mut VecDeque<String>) {
    let dependents = nodes[name].dependents.clone();
    for dependent in dependents {
        let node = nodes.get_mut(&dependent).expect("dependent in graph");
        node.pending_deps -= 1;
        if node.pending_deps == 0 {
            ready.push_back(dependent);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{self, Component, Runable, Startable, Stopable};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn write(dir: &std::path::Path, name: &str, contents: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(name), contents).unwrap();
    }

    fn config_with(root: &TempDir, dirs: &[&str]) -> Config {
        let project = root.path().to_path_buf();
        let mut target_directories = HashMap::new();
        target_directories.insert(
            project.clone(),
            dirs.iter().map(|d| root.path().join(d)).collect::<std::collections::HashSet<_>>(),
        );
        Config {
            pwd: project.clone(),
            options: crate::config::ConfigOptions::default(),
            current_working_project: project.clone(),
            sibling_projects: std::collections::HashSet::new(),
            projects: std::collections::HashSet::from([project]),
            target_directories,
        }
    }

    struct OrderRecordingStart {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }
    impl Component for OrderRecordingStart {
        fn as_startable(&self) -> Option<&dyn Startable> {
            Some(self)
        }
    }
    #[async_trait]
    impl Startable for OrderRecordingStart {
        async fn start(&self, _ctx: &Context) -> anyhow::Result<()> {
            self.log.lock().unwrap().push(self.name);
            Ok(())
        }
    }

    static ORDER_LOG: std::sync::OnceLock<Arc<Mutex<Vec<&'static str>>>> = std::sync::OnceLock::new();

    fn order_log() -> Arc<Mutex<Vec<&'static str>>> {
        ORDER_LOG.get_or_init(|| Arc::new(Mutex::new(Vec::new()))).clone()
    }

    fn register_order_component(name: &'static str) {
        fn ctor(_ctx: &Context, args: toml::Table) -> anyhow::Result<Arc<dyn Component>> {
            let name = args.get("name").and_then(|v| v.as_str()).unwrap();
            let name: &'static str = Box::leak(name.to_string().into_boxed_str());
            Ok(Arc::new(OrderRecordingStart { name, log: order_log() }))
        }
        component::register("order_recording_start", ctor);
    }

    #[tokio::test]
    async fn dependency_starts_before_dependent() {
        register_order_component("unused");
        order_log().lock().unwrap().clear();

        let root = TempDir::new().unwrap();
        let targets = root.path().join("targets");
        write(
            &targets,
            "leaf.toml",
            "[order_recording_start]\nname = \"leaf\"\n",
        );
        write(
            &targets,
            "top.toml",
            "[target]\ndependencies = [\"leaf\"]\n[order_recording_start]\nname = \"top\"\n",
        );

        let config = config_with(&root, &["targets"]);
        let registry = Registry::attempt_init(&config).unwrap();
        run(&registry, &config, "top").await.unwrap();

        let log = order_log().lock().unwrap();
        let leaf_pos = log.iter().position(|n| *n == "leaf").unwrap();
        let top_pos = log.iter().rposition(|n| *n == "top").unwrap();
        assert!(leaf_pos < top_pos);
    }

    struct CountingStart(Arc<AtomicUsize>);
    impl Component for CountingStart {
        fn as_startable(&self) -> Option<&dyn Startable> {
            Some(self)
        }
        fn as_runable(&self) -> Option<&dyn Runable> {
            Some(self)
        }
    }
    #[async_trait]
    impl Startable for CountingStart {
        async fn start(&self, _ctx: &Context) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
    #[async_trait]
    impl Runable for CountingStart {
        async fn run(&self, _ctx: &Context) -> anyhow::Result<()> {
            Ok(())
        }
    }

    static START_COUNT: std::sync::OnceLock<Arc<AtomicUsize>> = std::sync::OnceLock::new();

    fn start_count() -> Arc<AtomicUsize> {
        START_COUNT.get_or_init(|| Arc::new(AtomicUsize::new(0))).clone()
    }

    fn register_counting_component() {
        fn ctor(_ctx: &Context, _args: toml::Table) -> anyhow::Result<Arc<dyn Component>> {
            Ok(Arc::new(CountingStart(start_count())))
        }
        component::register("counting_start", ctor);
    }

    #[tokio::test]
    async fn independent_targets_both_run() {
        register_counting_component();
        start_count().store(0, Ordering::SeqCst);

        let root = TempDir::new().unwrap();
        let targets = root.path().join("targets");
        write(&targets, "a.toml", "[counting_start]\n");
        write(&targets, "b.toml", "[counting_start]\n");
        write(
            &targets,
            "top.toml",
            "[target]\ndependencies = [\"a\", \"b\"]\n",
        );

        let config = config_with(&root, &["targets"]);
        let registry = Registry::attempt_init(&config).unwrap();
        run(&registry, &config, "top").await.unwrap();

        assert_eq!(start_count().load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn leaf_without_start_does_not_block_dependent() {
        register_order_component("unused");
        order_log().lock().unwrap().clear();

        let root = TempDir::new().unwrap();
        let targets = root.path().join("targets");
        write(&targets, "leaf.toml", "");
        write(
            &targets,
            "top.toml",
            "[target]\ndependencies = [\"leaf\"]\n[order_recording_start]\nname = \"top\"\n",
        );

        let config = config_with(&root, &["targets"]);
        let registry = Registry::attempt_init(&config).unwrap();
        run(&registry, &config, "top").await.unwrap();

        assert_eq!(*order_log().lock().unwrap(), vec!["top"]);
    }

    #[tokio::test]
    async fn stop_order_reverses_start_completion_order() {
        let root = TempDir::new().unwrap();
        let targets = root.path().join("targets");
        write(
            &targets,
            "leaf.toml",
            "[exec]\nargv = [\"true\"]\n",
        );
        write(
            &targets,
            "top.toml",
            "[target]\ndependencies = [\"leaf\"]\n[exec]\nargv = [\"true\"]\n",
        );

        component::register_builtin_components();
        let config = config_with(&root, &["targets"]);
        let registry = Registry::attempt_init(&config).unwrap();
        // Mostly a smoke test: exec components complete quickly and this
        // must not hang or error.
        run(&registry, &config, "top").await.unwrap();
    }

    struct FailingRun;
    impl Component for FailingRun {
        fn as_runable(&self) -> Option<&dyn Runable> {
            Some(self)
        }
    }
    #[async_trait]
    impl Runable for FailingRun {
        async fn run(&self, _ctx: &Context) -> anyhow::Result<()> {
            anyhow::bail!("run exploded")
        }
    }

    struct RecordingStop {
        log: Arc<Mutex<Vec<&'static str>>>,
        name: &'static str,
    }
    impl Component for RecordingStop {
        fn as_startable(&self) -> Option<&dyn Startable> {
            Some(self)
        }
        fn as_stopable(&self) -> Option<&dyn Stopable> {
            Some(self)
        }
    }
    #[async_trait]
    impl Startable for RecordingStop {
        async fn start(&self, _ctx: &Context) -> anyhow::Result<()> {
            Ok(())
        }
    }
    #[async_trait]
    impl Stopable for RecordingStop {
        async fn stop(&self, _ctx: &Context) -> anyhow::Result<()> {
            self.log.lock().unwrap().push(self.name);
            Ok(())
        }
    }

    static STOP_LOG: std::sync::OnceLock<Arc<Mutex<Vec<&'static str>>>> = std::sync::OnceLock::new();

    fn stop_log() -> Arc<Mutex<Vec<&'static str>>> {
        STOP_LOG.get_or_init(|| Arc::new(Mutex::new(Vec::new()))).clone()
    }

    fn register_failing_run_components() {
        fn failing_ctor(_ctx: &Context, _args: toml::Table) -> anyhow::Result<Arc<dyn Component>> {
            Ok(Arc::new(FailingRun))
        }
        fn recording_ctor(_ctx: &Context, args: toml::Table) -> anyhow::Result<Arc<dyn Component>> {
            let name = args.get("name").and_then(|v| v.as_str()).unwrap();
            let name: &'static str = Box::leak(name.to_string().into_boxed_str());
            Ok(Arc::new(RecordingStop { log: stop_log(), name }))
        }
        component::register("failing_run", failing_ctor);
        component::register("recording_stop", recording_ctor);
    }

    #[tokio::test]
    async fn run_failure_still_tears_down_started_components() {
        register_failing_run_components();
        stop_log().lock().unwrap().clear();

        let root = TempDir::new().unwrap();
        let targets = root.path().join("targets");
        write(
            &targets,
            "leaf.toml",
            "[recording_stop]\nname = \"leaf\"\n",
        );
        write(
            &targets,
            "top.toml",
            "[target]\ndependencies = [\"leaf\"]\n[failing_run]\n",
        );

        let config = config_with(&root, &["targets"]);
        let registry = Registry::attempt_init(&config).unwrap();
        let err = run(&registry, &config, "top").await.unwrap_err();

        assert!(matches!(err, RuntimeError::ComponentRun { .. }));
        assert_eq!(*stop_log().lock().unwrap(), vec!["leaf"]);
    }
}
