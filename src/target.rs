// ============================================================================
// target.rs — an instantiated target, partitioned by lifecycle capability
// ============================================================================

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::component::Component;
use crate::context::Context;
use crate::types::TargetDef;

/// The constructed component instances of a single target, partitioned into
/// four capability lists that preserve declared order. A component may
/// appear in more than one list.
pub struct Target {
    pub name: String,
    pub components: Vec<Arc<dyn Component>>,
    startable: Vec<Arc<dyn Component>>,
    runable: Vec<Arc<dyn Component>>,
    stopable: Vec<Arc<dyn Component>>,
    resetable: Vec<Arc<dyn Component>>,
}

impl Target {
    /// Instantiates every `ComponentDef` of `target_def` against the shared
    /// `Context`, in declared order.
    pub fn from_target_def(target_def: &TargetDef, ctx: &Context) -> anyhow::Result<Target> {
        let mut components = Vec::with_capacity(target_def.components.len());
        for component_def in &target_def.components {
            let component = (component_def.constructor)(ctx, component_def.args.clone())?;
            components.push(component);
        }
        Ok(Target::new(target_def.name.clone(), components))
    }

    fn new(name: String, components: Vec<Arc<dyn Component>>) -> Target {
        let mut startable = Vec::new();
        let mut runable = Vec::new();
        let mut stopable = Vec::new();
        let mut resetable = Vec::new();

        for component in &components {
            if component.as_startable().is_some() {
                startable.push(component.clone());
            }
            if component.as_runable().is_some() {
                runable.push(component.clone());
            }
            if component.as_stopable().is_some() {
                stopable.push(component.clone());
            }
            if component.as_resetable().is_some() {
                resetable.push(component.clone());
            }
        }

        Target {
            name,
            components,
            startable,
            runable,
            stopable,
            resetable,
        }
    }

    pub fn startable(&self) -> bool {
        !self.startable.is_empty()
    }

    pub fn runable(&self) -> bool {
        !self.runable.is_empty()
    }

    pub fn stopable(&self) -> bool {
        !self.stopable.is_empty()
    }

    pub fn resetable(&self) -> bool {
        !self.resetable.is_empty()
    }

    /// Invokes every startable component sequentially, in declared order.
    /// Any failure aborts the start and is propagated.
    pub async fn start(&self, ctx: &Context) -> anyhow::Result<()> {
        for component in &self.startable {
            component
                .as_startable()
                .expect("partitioned as startable")
                .start(ctx)
                .await?;
        }
        Ok(())
    }

    /// Invokes every runable component concurrently, collecting every
    /// result; the first failure (if any) is propagated once all siblings
    /// have completed or been cancelled.
    pub async fn run(&self, ctx: &Context) -> anyhow::Result<()> {
        let futures = self
            .runable
            .iter()
            .map(|component| component.as_runable().expect("partitioned as runable").run(ctx));
        let results = futures::future::join_all(futures).await;
        results.into_iter().collect::<anyhow::Result<Vec<()>>>()?;
        Ok(())
    }

    /// Invokes every stopable component sequentially, in reverse declared
    /// order. Failures are logged but do not abort subsequent stops.
    pub async fn stop(&self, ctx: &Context) -> anyhow::Result<()> {
        for component in self.stopable.iter().rev() {
            let stopable = component.as_stopable().expect("partitioned as stopable");
            if let Err(err) = stopable.stop(ctx).await {
                tracing::warn!(target = %self.name, error = %err, "stop failed, continuing teardown");
            }
        }
        Ok(())
    }

    /// Invokes every resetable component concurrently.
    pub async fn reset(&self, ctx: &Context) -> anyhow::Result<()> {
        let futures = self
            .resetable
            .iter()
            .map(|component| component.as_resetable().expect("partitioned as resetable").reset(ctx));
        let results = futures::future::join_all(futures).await;
        results.into_iter().collect::<anyhow::Result<Vec<()>>>()?;
        Ok(())
    }
}

impl PartialEq for Target {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Target {}

impl Hash for Target {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}
