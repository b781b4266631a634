//! JSON serialization in the engine's wire shape.

use serde_json::{json, Map, Value};

use crate::conditional::ResolveCache;
use crate::error::Result;
use crate::pipeline::Pipeline;
use crate::plan::{Barrier, PlanItem};
use crate::steps::{Dependency, PotentialStep, Step};
use crate::{plan, sort};

use super::{mutate_guarded, SerializationOptions};

pub(crate) async fn serialize(
    pipeline: &Pipeline,
    options: SerializationOptions,
) -> Result<Value> {
    let mut cache = ResolveCache::new(options.accept_all_conditions);
    let sorted = sort::sorted_steps(pipeline, &mut cache).await?;

    let mut steps = Vec::new();
    if options.explicit_dependencies {
        for step in &sorted {
            if let Some(mutator) = &options.mutator {
                mutate_guarded(step, mutator).await?;
            }
            steps.push(step_json(step, Some(&mut cache)).await?);
        }
    } else {
        for item in plan::with_barriers(&sorted, &cache) {
            match item {
                PlanItem::Step(step) => {
                    if let Some(mutator) = &options.mutator {
                        mutate_guarded(&step, mutator).await?;
                    }
                    steps.push(step_json(&step, None).await?);
                }
                PlanItem::Barrier(barrier) => steps.push(barrier_json(&barrier)),
            }
        }
    }

    let mut root = Map::new();
    if !pipeline.env().is_empty() {
        root.insert("env".into(), string_map_json(pipeline.env()));
    }
    root.insert("steps".into(), Value::Array(steps));
    Ok(Value::Object(root))
}

fn string_map_json<'a, I>(entries: I) -> Value
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    Value::Object(
        entries
            .into_iter()
            .map(|(key, value)| (key.clone(), Value::String(value.clone())))
            .collect(),
    )
}

fn barrier_json(barrier: &Barrier) -> Value {
    let mut map = Map::new();
    map.insert("wait".into(), Value::Null);
    if barrier.continue_on_failure {
        map.insert("continue_on_failure".into(), Value::Bool(true));
    }
    Value::Object(map)
}

async fn step_json(step: &Step, explicit: Option<&mut ResolveCache>) -> Result<Value> {
    let mut map = kind_json(step);
    if let Some(cache) = explicit {
        map.insert("key".into(), Value::String(step.key()));
        let depends_on = depends_on_json(step, cache).await?;
        if !depends_on.is_empty() {
            map.insert("depends_on".into(), Value::Array(depends_on));
        }
        if step.state().allow_dependency_failure {
            map.insert("allow_dependency_failure".into(), Value::Bool(true));
        }
    }
    Ok(Value::Object(map))
}

/// The union of hard and effect edges, one entry per concrete target, sorted
/// by target key. A conditional target not yet produced in this pass is
/// consulted here: accepted ones are produced, rejected ones skipped. The
/// self-reference constraint has no explicit-edge form and is dropped.
async fn depends_on_json(step: &Step, cache: &mut ResolveCache) -> Result<Vec<Value>> {
    let mut targets: Vec<Step> = Vec::new();
    let hard = step
        .dependencies()
        .into_iter()
        .filter_map(|dependency| match dependency {
            Dependency::On(target) => Some(target),
            Dependency::SelfBarrier => None,
        });
    for potential in hard.chain(step.effect_dependencies()) {
        let resolved = match &potential {
            PotentialStep::Step(target) => Some(target.clone()),
            PotentialStep::Conditional(conditional) => {
                if cache.produced(conditional).is_some() || cache.decide(conditional).await? {
                    Some(cache.produce(conditional).await?)
                } else {
                    None
                }
            }
        };
        if let Some(target) = resolved {
            if !targets.iter().any(|t| t.same(&target)) {
                targets.push(target);
            }
        }
    }

    let allow_failure = step.always() && !step.state().allow_dependency_failure;
    let mut entries: Vec<(String, Value)> = targets
        .into_iter()
        .map(|target| {
            let key = target.key();
            let mut entry = Map::new();
            entry.insert("step".into(), Value::String(key.clone()));
            if allow_failure {
                entry.insert("allow_failure".into(), Value::Bool(true));
            }
            (key, Value::Object(entry))
        })
        .collect();
    entries.sort_by(|(a, _), (b, _)| a.cmp(b));
    Ok(entries.into_iter().map(|(_, entry)| entry).collect())
}

fn kind_json(step: &Step) -> Map<String, Value> {
    use crate::steps::StepKind;

    let state = step.state();
    let mut map = Map::new();
    match &state.kind {
        StepKind::Command(attrs) => {
            if let Some(label) = &attrs.label {
                map.insert("label".into(), Value::String(label.clone()));
            }
            let commands: Vec<&str> = attrs.commands.iter().map(|c| c.command()).collect();
            let command = match commands.as_slice() {
                [single] => Value::String((*single).to_string()),
                many => json!(many),
            };
            map.insert("command".into(), command);
            if !attrs.env.is_empty() {
                map.insert("env".into(), string_map_json(&attrs.env));
            }
            if !attrs.agents.is_empty() {
                map.insert("agents".into(), string_map_json(&attrs.agents));
            }
            if !attrs.artifact_paths.is_empty() {
                map.insert("artifact_paths".into(), json!(attrs.artifact_paths));
            }
            insert_branches(&mut map, &attrs.branches);
            if let Some(parallelism) = attrs.parallelism.filter(|&n| n > 1) {
                map.insert("parallelism".into(), json!(parallelism));
            }
            if let Some((concurrency, group)) = &attrs.concurrency {
                map.insert("concurrency".into(), json!(concurrency));
                map.insert("concurrency_group".into(), Value::String(group.clone()));
            }
            if let Some(minutes) = attrs.effective_timeout_minutes() {
                map.insert("timeout_in_minutes".into(), json!(minutes));
            }
            if !attrs.plugins.is_empty() {
                let plugins: Vec<Value> = attrs
                    .plugins
                    .iter()
                    .map(|plugin| {
                        let mut entry = Map::new();
                        entry.insert(plugin.name.clone(), plugin.config.clone());
                        Value::Object(entry)
                    })
                    .collect();
                map.insert("plugins".into(), Value::Array(plugins));
            }
            if !attrs.soft_fail.is_empty() {
                map.insert("soft_fail".into(), soft_fail_json(&attrs.soft_fail));
            }
            if attrs.skip {
                map.insert("skip".into(), Value::Bool(true));
            }
            if attrs.retry.has_value() {
                map.insert("retry".into(), retry_json(&attrs.retry));
            }
        }
        StepKind::Block(attrs) => {
            map.insert("block".into(), Value::String(attrs.title.clone()));
            if let Some(prompt) = &attrs.prompt {
                map.insert("prompt".into(), Value::String(prompt.clone()));
            }
            insert_branches(&mut map, &attrs.branches);
        }
        StepKind::Trigger(attrs) => {
            map.insert("trigger".into(), Value::String(attrs.trigger.clone()));
            if let Some(label) = &attrs.label {
                map.insert("label".into(), Value::String(label.clone()));
            }
            if attrs.async_ {
                map.insert("async".into(), Value::Bool(true));
            }
            if attrs.build.has_data() {
                let mut build = Map::new();
                if let Some(message) = &attrs.build.message {
                    build.insert("message".into(), Value::String(message.clone()));
                }
                if let Some(commit) = &attrs.build.commit {
                    build.insert("commit".into(), Value::String(commit.clone()));
                }
                if let Some(branch) = &attrs.build.branch {
                    build.insert("branch".into(), Value::String(branch.clone()));
                }
                if !attrs.build.env.is_empty() {
                    build.insert("env".into(), string_map_json(&attrs.build.env));
                }
                map.insert("build".into(), Value::Object(build));
            }
            insert_branches(&mut map, &attrs.branches);
        }
    }
    map
}

fn insert_branches(map: &mut Map<String, Value>, branches: &std::collections::BTreeSet<String>) {
    if !branches.is_empty() {
        let joined = branches.iter().cloned().collect::<Vec<_>>().join(" ");
        map.insert("branches".into(), Value::String(joined));
    }
}

fn soft_fail_json(soft_fail: &std::collections::BTreeSet<crate::steps::ExitStatus>) -> Value {
    use crate::steps::ExitStatus;

    if soft_fail.contains(&ExitStatus::All) {
        return Value::Bool(true);
    }
    let entries: Vec<Value> = soft_fail
        .iter()
        .map(|status| match status {
            ExitStatus::Code(code) => json!({ "exit_status": code }),
            ExitStatus::All => unreachable!("handled above"),
        })
        .collect();
    Value::Array(entries)
}

fn retry_json(retry: &crate::steps::command::Retry) -> Value {
    let mut map = Map::new();
    if let Some(limit) = retry.automatic_limit {
        map.insert("automatic".into(), json!({ "limit": limit }));
    }
    if let Some(manual) = &retry.manual {
        if !manual.allowed || manual.permit_on_passed {
            let mut entry = Map::new();
            if !manual.allowed {
                entry.insert("allowed".into(), Value::Bool(false));
            }
            if manual.permit_on_passed {
                entry.insert("permit_on_passed".into(), Value::Bool(true));
            }
            if let Some(reason) = &manual.reason {
                entry.insert("reason".into(), Value::String(reason.clone()));
            }
            map.insert("manual".into(), Value::Object(entry));
        }
    }
    Value::Object(map)
}
