//! Graph evaluation and the identity-preserving mutation walker.
//!
//! [`evaluate_pipeline`] eliminates every conditional reachable through the
//! dependency closure, leaving a plain graph of concrete steps. [`walk`] then
//! rebuilds that graph depth-first, handing every node to a caller-supplied
//! [`Mutator`]; a per-pass cache keyed by step identity guarantees a node
//! shared by several parents is mutated once and all parents observe the same
//! rebuilt instance.

use async_trait::async_trait;
use futures::future::LocalBoxFuture;
use futures::FutureExt;

use crate::conditional::ResolveCache;
use crate::error::{GantryError, Result};
use crate::pipeline::Pipeline;
use crate::steps::{Command, Dependency, PotentialStep, Step};

/// Caller-supplied transformations applied by [`walk`].
///
/// Every method defaults to the identity, so implementors override only the
/// level they care about. Callbacks consume and return their node; an `Err`
/// aborts the pass.
#[async_trait(?Send)]
pub trait Mutator {
    async fn mutate_pipeline(&mut self, pipeline: Pipeline) -> anyhow::Result<Pipeline> {
        Ok(pipeline)
    }

    async fn mutate_step(&mut self, step: Step) -> anyhow::Result<Step> {
        Ok(step)
    }

    async fn mutate_command(&mut self, command: Command) -> anyhow::Result<Command> {
        Ok(command)
    }
}

/// Resolves every conditional reachable from the pipeline, recursively.
///
/// Accepted conditionals are replaced by their produced step, which is itself
/// evaluated, so conditionals reachable only through another conditional's
/// generated output are resolved too. Rejected conditionals are dropped from
/// the pipeline and from hard dependency sets; in effect sets they stay put,
/// so the gate keeps reading "ancestor absent" instead of vanishing.
///
/// Must run before [`walk`].
pub async fn evaluate_pipeline(mut pipeline: Pipeline) -> Result<Pipeline> {
    let mut cache = ResolveCache::new(false);
    let mut visited: Vec<Step> = Vec::new();
    let entries = std::mem::take(&mut pipeline.steps);
    let mut steps = Vec::with_capacity(entries.len());
    for potential in &entries {
        if let Some(step) = evaluate_potential(potential, &mut cache, &mut visited).await? {
            steps.push(PotentialStep::Step(step));
        }
    }
    pipeline.steps = steps;
    tracing::debug!(steps = pipeline.steps.len(), "evaluated pipeline");
    Ok(pipeline)
}

fn evaluate_potential<'a>(
    potential: &'a PotentialStep,
    cache: &'a mut ResolveCache,
    visited: &'a mut Vec<Step>,
) -> LocalBoxFuture<'a, Result<Option<Step>>> {
    async move {
        let step = match potential {
            PotentialStep::Step(step) => step.clone(),
            PotentialStep::Conditional(conditional) => {
                if !cache.decide(conditional).await? {
                    return Ok(None);
                }
                cache.produce(conditional).await?
            }
        };
        // Re-entering a step already being rewritten must not recurse again;
        // its sets are rewritten exactly once.
        if visited.iter().any(|v| v.same(&step)) {
            return Ok(Some(step));
        }
        visited.push(step.clone());

        let mut dependencies = Vec::new();
        for dependency in step.dependencies() {
            match dependency {
                Dependency::SelfBarrier => dependencies.push(Dependency::SelfBarrier),
                Dependency::On(target) => {
                    if let Some(resolved) = evaluate_potential(&target, cache, visited).await? {
                        dependencies.push(Dependency::On(PotentialStep::Step(resolved)));
                    }
                }
            }
        }
        step.set_dependencies(dependencies);

        let mut effects = Vec::new();
        for target in step.effect_dependencies() {
            match evaluate_potential(&target, cache, visited).await? {
                Some(resolved) => effects.push(PotentialStep::Step(resolved)),
                // A rejected gate stays in the set; deleting the edge would
                // turn an effect-only step unconditional.
                None => effects.push(target),
            }
        }
        step.set_effect_dependencies(effects);

        Ok(Some(step))
    }
    .boxed_local()
}

/// Rebuilds the pipeline's graph depth-first, applying `mutator` to every
/// node exactly once.
///
/// The input is consumed and a disjoint output graph is built from duplicated
/// nodes, so mutation never aliases handles the caller still holds. A step's
/// dependency subtree and leaf commands are rebuilt before the step itself is
/// passed to [`Mutator::mutate_step`], so a parent mutator observes mutated
/// children. A conditional among the entries or the hard dependencies is an
/// error: run [`evaluate_pipeline`] first. Rejected gates left in effect
/// sets pass through unchanged.
pub async fn walk<M: Mutator>(mut pipeline: Pipeline, mutator: &mut M) -> Result<Pipeline> {
    let mut walker = Walker {
        mutator,
        nodes: Vec::new(),
        commands: Vec::new(),
    };
    let entries = std::mem::take(&mut pipeline.steps);
    let mut steps = Vec::with_capacity(entries.len());
    for potential in &entries {
        steps.push(PotentialStep::Step(walker.step(potential).await?));
    }
    pipeline.steps = steps;
    tracing::debug!(nodes = walker.nodes.len(), "walked pipeline");
    walker
        .mutator
        .mutate_pipeline(pipeline)
        .await
        .map_err(GantryError::Mutator)
}

struct Walker<'m, M> {
    mutator: &'m mut M,
    /// Rebuilt steps by identity key; shared nodes resolve to one instance.
    nodes: Vec<(String, Step)>,
    /// Mutated commands by pre-mutation value; equal commands share a result.
    commands: Vec<(Command, Command)>,
}

impl<M: Mutator> Walker<'_, M> {
    fn step<'a>(&'a mut self, potential: &'a PotentialStep) -> LocalBoxFuture<'a, Result<Step>> {
        async move {
            let step = match potential {
                PotentialStep::Step(step) => step,
                PotentialStep::Conditional(_) => return Err(GantryError::UnresolvedConditional),
            };
            let key = step.key();
            if let Some((_, rebuilt)) = self.nodes.iter().find(|(k, _)| *k == key) {
                return Ok(rebuilt.clone());
            }

            // Register the duplicate before descending so shared nodes and
            // odd topologies terminate; the entry is refreshed after the
            // mutator has run.
            let rebuilt = step.duplicate();
            self.nodes.push((key.clone(), rebuilt.clone()));

            let mut dependencies = Vec::new();
            for dependency in step.dependencies() {
                match dependency {
                    Dependency::SelfBarrier => dependencies.push(Dependency::SelfBarrier),
                    Dependency::On(target) => {
                        let child = self.step(&target).await?;
                        dependencies.push(Dependency::On(PotentialStep::Step(child)));
                    }
                }
            }
            rebuilt.set_dependencies(dependencies);

            let mut effects = Vec::new();
            for target in step.effect_dependencies() {
                let rebuilt_target = match &target {
                    // A conditional here is a rejected gate left by
                    // evaluation; it names an absent ancestor and is carried
                    // through untouched.
                    PotentialStep::Conditional(_) => target.clone(),
                    PotentialStep::Step(_) => PotentialStep::Step(self.step(&target).await?),
                };
                effects.push(rebuilt_target);
            }
            rebuilt.set_effect_dependencies(effects);

            if rebuilt.is_command() {
                let mut commands = Vec::new();
                for command in rebuilt.commands() {
                    commands.push(self.command(command).await?);
                }
                rebuilt.set_commands(commands);
            }

            let rebuilt = self
                .mutator
                .mutate_step(rebuilt)
                .await
                .map_err(GantryError::Mutator)?;
            if let Some(entry) = self.nodes.iter_mut().find(|(k, _)| *k == key) {
                entry.1 = rebuilt.clone();
            }
            Ok(rebuilt)
        }
        .boxed_local()
    }

    async fn command(&mut self, command: Command) -> Result<Command> {
        if let Some((_, mutated)) = self.commands.iter().find(|(before, _)| *before == command) {
            return Ok(mutated.clone());
        }
        let mutated = self
            .mutator
            .mutate_command(command.clone())
            .await
            .map_err(GantryError::Mutator)?;
        self.commands.push((command, mutated.clone()));
        Ok(mutated)
    }
}
