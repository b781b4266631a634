//! Serialization options and the structural-integrity guard.
//!
//! Every serializer runs a full resolution pass internally, with a fresh
//! memoization table per call. An optional per-step mutator may adjust
//! step-local fields just before a step is encoded; the guard around it
//! rejects any change to the dependency or effect sets, which would
//! invalidate the linearization already computed.

pub(crate) mod dot;
pub(crate) mod json;
pub(crate) mod structural;
pub(crate) mod yaml;

use std::future::Future;

use futures::future::LocalBoxFuture;
use futures::FutureExt;

use crate::error::{GantryError, Result};
use crate::steps::Step;

/// An async per-step callback applied at the serialization boundary.
pub type StepMutator = Box<dyn Fn(Step) -> LocalBoxFuture<'static, anyhow::Result<()>>>;

/// Options accepted by the JSON and YAML serializers.
#[derive(Default)]
pub struct SerializationOptions {
    /// Emit stable keys and `depends_on` edges per step instead of barriers.
    pub explicit_dependencies: bool,
    /// Force every overridable conditional into the graph regardless of its
    /// accept predicate. Only meaningful together with explicit dependencies.
    pub accept_all_conditions: bool,
    /// Invoked once per step, in final linearized order, to adjust step-local
    /// fields in place.
    pub mutator: Option<StepMutator>,
}

impl SerializationOptions {
    /// Options for explicit-dependency output.
    pub fn explicit() -> Self {
        Self {
            explicit_dependencies: true,
            ..Self::default()
        }
    }

    pub fn accept_all_conditions(mut self, accept_all: bool) -> Self {
        self.accept_all_conditions = accept_all;
        self
    }

    pub fn with_mutator<F, Fut>(mut self, mutator: F) -> Self
    where
        F: Fn(Step) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        self.mutator = Some(Box::new(move |step| mutator(step).boxed_local()));
        self
    }
}

/// Runs the mutator on one step with integrity snapshots around it.
pub(crate) async fn mutate_guarded(step: &Step, mutator: &StepMutator) -> Result<()> {
    let snapshot = step.edge_snapshot();
    mutator(step.clone()).await.map_err(GantryError::Mutator)?;
    if !step.edges_match(&snapshot) {
        return Err(GantryError::MutatedDependencies {
            step: step.to_string(),
        });
    }
    Ok(())
}
