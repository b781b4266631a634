//! Graph linearization: conditional resolution, effect pruning, and a stable
//! topological sort.
//!
//! The pass works in three phases. First the pipeline's entries are resolved
//! and the reachable node set is computed as a worklist fixpoint: hard edges
//! force their targets in, while effect-gated steps wait until one of their
//! effect ancestors is present. Then ordering edges are built, self-references
//! and effect edges included. Finally a Kahn sort emits the surviving nodes,
//! breaking ties by first-discovery order.

use std::collections::VecDeque;

use crate::conditional::ResolveCache;
use crate::error::{GantryError, Result};
use crate::pipeline::Pipeline;
use crate::steps::{Dependency, PotentialStep, Step};

/// Linearizes a pipeline with a fresh resolution pass.
///
/// The output contains the transitive closure of the pipeline's steps over
/// hard dependency edges, minus effect-gated steps whose ancestors never made
/// it in, ordered so every hard dependency precedes its dependent.
pub async fn linearize(pipeline: &Pipeline) -> Result<Vec<Step>> {
    let mut cache = ResolveCache::new(false);
    sorted_steps(pipeline, &mut cache).await
}

pub(crate) async fn sorted_steps(
    pipeline: &Pipeline,
    cache: &mut ResolveCache,
) -> Result<Vec<Step>> {
    let nodes = include_reachable(pipeline, cache).await?;
    let order = topological_order(&nodes, cache)?;
    tracing::debug!(steps = order.len(), "linearized pipeline");
    Ok(order)
}

/// Computes the included node set in first-discovery order.
///
/// Queue entries are `(step, forced)`: a forced step arrived through a hard
/// edge (or passed its effect gate already) and joins unconditionally, which
/// is what resurrects a previously pruned effect-gated step the moment a hard
/// path reaches it.
async fn include_reachable(pipeline: &Pipeline, cache: &mut ResolveCache) -> Result<Vec<Step>> {
    let mut queue: VecDeque<(Step, bool)> = VecDeque::new();
    for potential in &pipeline.steps {
        match potential {
            PotentialStep::Step(step) => queue.push_back((step.clone(), false)),
            PotentialStep::Conditional(conditional) => {
                if cache.decide(conditional).await? {
                    queue.push_back((cache.produce(conditional).await?, false));
                }
            }
        }
    }

    let mut nodes: Vec<Step> = Vec::new();
    let mut parked: Vec<Step> = Vec::new();
    loop {
        while let Some((step, forced)) = queue.pop_front() {
            if nodes.iter().any(|n| n.same(&step)) {
                continue;
            }
            if !forced && effect_gated(&step, &nodes, cache) {
                if !parked.iter().any(|p| p.same(&step)) {
                    parked.push(step);
                }
                continue;
            }
            parked.retain(|p| !p.same(&step));
            nodes.push(step.clone());
            // Hard edges only fan out from included steps; a conditional
            // referenced solely from an excluded subtree is never produced.
            for dependency in step.dependencies() {
                if let Dependency::On(target) = dependency {
                    let target = cache.step_of(&target).await?;
                    queue.push_back((target, true));
                }
            }
        }

        // An inclusion may have unlocked parked steps; re-examine them in
        // discovery order until nothing changes.
        let woken: Vec<Step> = parked
            .iter()
            .filter(|p| !effect_gated(p, &nodes, cache))
            .cloned()
            .collect();
        if woken.is_empty() {
            break;
        }
        parked.retain(|p| !woken.iter().any(|w| w.same(p)));
        for step in woken {
            queue.push_back((step, true));
        }
    }
    Ok(nodes)
}

/// True when the step carries effect dependencies and none of its effect
/// ancestors is present. The check never produces a conditional: an absent
/// ancestor must stay absent.
fn effect_gated(step: &Step, nodes: &[Step], cache: &ResolveCache) -> bool {
    let effects = step.effect_dependencies();
    if effects.is_empty() {
        return false;
    }
    !effects.iter().any(|potential| {
        cache
            .peek_step(potential)
            .is_some_and(|target| nodes.iter().any(|n| n.same(&target)))
    })
}

fn topological_order(nodes: &[Step], cache: &ResolveCache) -> Result<Vec<Step>> {
    let count = nodes.len();
    let position =
        |step: &Step| -> Option<usize> { nodes.iter().position(|n| n.same(step)) };

    // Hard edges first; they are the only edges allowed to make a cycle fatal.
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); count];
    let mut hard: Vec<Vec<usize>> = vec![Vec::new(); count];
    for (to, step) in nodes.iter().enumerate() {
        for dependency in step.dependencies() {
            if let Dependency::On(target) = dependency {
                let Some(resolved) = cache.peek_step(&target) else {
                    continue;
                };
                if let Some(from) = position(&resolved) {
                    if !successors[from].contains(&to) {
                        successors[from].push(to);
                        hard[from].push(to);
                    }
                }
            }
        }
    }

    // Ordering hints: the self-barrier constraint orders a step after its
    // discovery predecessor, and an effect edge orders the ancestor first
    // when both endpoints made it in. Neither may close a cycle; a hint that
    // would is dropped.
    let add_soft = |successors: &mut Vec<Vec<usize>>, from: usize, to: usize| {
        if from != to && !successors[from].contains(&to) && !reaches(successors, to, from) {
            successors[from].push(to);
        }
    };
    for (to, step) in nodes.iter().enumerate() {
        if to > 0
            && step
                .dependencies()
                .iter()
                .any(|d| matches!(d, Dependency::SelfBarrier))
        {
            add_soft(&mut successors, to - 1, to);
        }
        for potential in step.effect_dependencies() {
            if let Some(ancestor) = cache.peek_step(&potential) {
                if let Some(from) = position(&ancestor) {
                    add_soft(&mut successors, from, to);
                }
            }
        }
    }

    let mut in_degree = vec![0usize; count];
    for targets in &successors {
        for &to in targets {
            in_degree[to] += 1;
        }
    }

    let mut order = Vec::with_capacity(count);
    let mut emitted = vec![false; count];
    while order.len() < count {
        // Stable tie-break: always pick the lowest discovery index.
        let Some(next) = (0..count).find(|&i| !emitted[i] && in_degree[i] == 0) else {
            let cycle = find_hard_cycle(nodes, &hard, &emitted)
                .unwrap_or_else(|| "<unknown>".to_string());
            return Err(GantryError::CircularDependency { cycle });
        };
        emitted[next] = true;
        order.push(nodes[next].clone());
        for &to in &successors[next] {
            in_degree[to] -= 1;
        }
    }
    Ok(order)
}

/// Whether `to` is reachable from `from` over the current edge set.
fn reaches(successors: &[Vec<usize>], from: usize, to: usize) -> bool {
    if from == to {
        return true;
    }
    let mut seen = vec![false; successors.len()];
    let mut stack = vec![from];
    while let Some(node) = stack.pop() {
        if node == to {
            return true;
        }
        if seen[node] {
            continue;
        }
        seen[node] = true;
        stack.extend(successors[node].iter().copied());
    }
    false
}

/// Finds a cycle among hard edges and renders it as `a -> b -> a`.
fn find_hard_cycle(nodes: &[Step], hard: &[Vec<usize>], stuck: &[bool]) -> Option<String> {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Unvisited,
        Visiting,
        Visited,
    }

    fn dfs(
        node: usize,
        hard: &[Vec<usize>],
        state: &mut [State],
        path: &mut Vec<usize>,
    ) -> Option<Vec<usize>> {
        state[node] = State::Visiting;
        path.push(node);
        for &next in &hard[node] {
            match state[next] {
                State::Visiting => {
                    let start = path.iter().position(|&n| n == next)?;
                    let mut cycle = path[start..].to_vec();
                    cycle.push(next);
                    return Some(cycle);
                }
                State::Unvisited => {
                    if let Some(cycle) = dfs(next, hard, state, path) {
                        return Some(cycle);
                    }
                }
                State::Visited => {}
            }
        }
        path.pop();
        state[node] = State::Visited;
        None
    }

    let mut state = vec![State::Unvisited; nodes.len()];
    for start in 0..nodes.len() {
        if stuck[start] || state[start] != State::Unvisited {
            continue;
        }
        let mut path = Vec::new();
        if let Some(cycle) = dfs(start, hard, &mut state, &mut path) {
            let rendered = cycle
                .iter()
                .map(|&i| nodes[i].to_string())
                .collect::<Vec<_>>()
                .join(" -> ");
            return Some(rendered);
        }
    }
    None
}
