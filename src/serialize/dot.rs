//! Graphviz serialization: barrier groups as clusters, edges by display name.

use crate::conditional::ResolveCache;
use crate::error::Result;
use crate::pipeline::Pipeline;
use crate::plan::PlanItem;
use crate::steps::{Dependency, StepKind};
use crate::{plan, sort};

pub(crate) async fn serialize(pipeline: &Pipeline) -> Result<String> {
    let mut cache = ResolveCache::new(false);
    let sorted = sort::sorted_steps(pipeline, &mut cache).await?;
    let items = plan::with_barriers(&sorted, &cache);

    let mut clusters: Vec<Vec<String>> = vec![Vec::new()];
    let mut edges: Vec<String> = Vec::new();
    let mut extras: Vec<String> = Vec::new();

    for item in &items {
        match item {
            PlanItem::Barrier(_) => clusters.push(Vec::new()),
            PlanItem::Step(step) => {
                let name = quoted(&step.to_string());
                if let Some(cluster) = clusters.last_mut() {
                    cluster.push(format!("{name} [ color = \"grey\" ];"));
                }
                for dependency in step.dependencies() {
                    if let Dependency::On(target) = dependency {
                        if let Some(resolved) = cache.peek_step(&target) {
                            edges.push(format!("{} -> {name};", quoted(&resolved.to_string())));
                        }
                    }
                }
                for target in step.effect_dependencies() {
                    if let Some(resolved) = cache.peek_step(&target) {
                        edges.push(format!("{} -> {name};", quoted(&resolved.to_string())));
                    }
                }
                if let StepKind::Trigger(attrs) = &step.state().kind {
                    let triggered = quoted(&attrs.trigger);
                    extras.push(format!("{triggered} [ shape = \"Msquare\" ];"));
                    extras.push(format!("{name} -> {triggered} [ label = \"triggers\" ];"));
                }
            }
        }
    }

    let mut lines = Vec::new();
    lines.push(format!("digraph {} {{", quoted(pipeline.name())));
    lines.push("  compound = true;".to_string());
    for (index, nodes) in clusters.iter().enumerate() {
        if nodes.is_empty() {
            continue;
        }
        lines.push(format!("  subgraph \"cluster_{index}\" {{"));
        lines.push("    color = \"black\";".to_string());
        for node in nodes {
            lines.push(format!("    {node}"));
        }
        lines.push("  }".to_string());
    }
    for edge in edges {
        lines.push(format!("  {edge}"));
    }
    for extra in extras {
        lines.push(format!("  {extra}"));
    }
    lines.push("}".to_string());
    Ok(lines.join("\n"))
}

fn quoted(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\\\""))
}
