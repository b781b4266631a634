//! The pipeline: an ordered collection of potential steps plus environment.

use std::fmt;

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::{GantryError, Result};
use crate::plan::PlanItem;
use crate::serialize::{self, SerializationOptions};
use crate::steps::PotentialStep;

/// A named collection of steps to linearize and serialize.
///
/// Insertion order is significant: it breaks ties in the topological sort and
/// anchors barrier placement. The same step or conditional instance may only
/// be added once.
pub struct Pipeline {
    name: String,
    pub(crate) steps: Vec<PotentialStep>,
    env: IndexMap<String, String>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            env: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// A lowercase-hyphenated identifier derived from the name, used by
    /// trigger steps to reference this pipeline.
    pub fn slug(&self) -> String {
        let mut slug = String::with_capacity(self.name.len());
        for c in self.name.chars() {
            if c.is_ascii_alphanumeric() {
                slug.push(c.to_ascii_lowercase());
            } else if !slug.ends_with('-') && !slug.is_empty() {
                slug.push('-');
            }
        }
        slug.trim_end_matches('-').to_string()
    }

    /// Appends a step or conditional.
    ///
    /// Adding the same instance twice is an error; the graph has exactly one
    /// node per identity.
    pub fn add(mut self, step: impl Into<PotentialStep>) -> Result<Self> {
        let step = step.into();
        if self.steps.iter().any(|existing| existing.same(&step)) {
            return Err(GantryError::DuplicateStep {
                step: step.display_name(),
            });
        }
        self.steps.push(step);
        Ok(self)
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub(crate) fn env(&self) -> &IndexMap<String, String> {
        &self.env
    }

    /// The linearized plan: steps interleaved with the barriers that keep
    /// their ordering, each top-level call running a fresh resolution pass.
    pub async fn to_list(&self) -> Result<Vec<PlanItem>> {
        let mut cache = crate::conditional::ResolveCache::new(false);
        let sorted = crate::sort::sorted_steps(self, &mut cache).await?;
        Ok(crate::plan::with_barriers(&sorted, &cache))
    }

    /// Serializes the pipeline to a JSON value in the engine's wire shape.
    pub async fn to_json(&self, options: SerializationOptions) -> Result<Value> {
        serialize::json::serialize(self, options).await
    }

    /// Serializes the pipeline to YAML.
    pub async fn to_yaml(&self, options: SerializationOptions) -> Result<String> {
        serialize::yaml::serialize(self, options).await
    }

    /// A plain-text listing of the plan, one `*`-prefixed line per item.
    pub async fn to_structural(&self) -> Result<String> {
        serialize::structural::serialize(self).await
    }

    /// A Graphviz digraph of the plan, with one cluster per barrier group.
    pub async fn to_dot(&self) -> Result<String> {
        serialize::dot::serialize(self).await
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("steps", &self.steps.len())
            .field("env", &self.env.len())
            .finish()
    }
}
