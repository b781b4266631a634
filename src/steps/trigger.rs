//! Trigger steps: kick off a build of another pipeline.

use std::collections::BTreeSet;

use indexmap::IndexMap;

use super::{Step, StepKind};
use crate::pipeline::Pipeline;

#[derive(Clone, Default)]
pub(crate) struct BuildAttrs {
    pub(crate) message: Option<String>,
    pub(crate) commit: Option<String>,
    pub(crate) branch: Option<String>,
    pub(crate) env: IndexMap<String, String>,
}

impl BuildAttrs {
    pub(crate) fn has_data(&self) -> bool {
        self.message.is_some()
            || self.commit.is_some()
            || self.branch.is_some()
            || !self.env.is_empty()
    }
}

#[derive(Clone)]
pub(crate) struct TriggerAttrs {
    pub(crate) trigger: String,
    pub(crate) label: Option<String>,
    pub(crate) async_: bool,
    pub(crate) build: BuildAttrs,
    pub(crate) branches: BTreeSet<String>,
}

impl TriggerAttrs {
    pub(crate) fn display_name(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => format!("[trigger {}]", self.trigger),
        }
    }
}

impl Step {
    /// A trigger step targeting a pipeline by slug.
    ///
    /// # Panics
    ///
    /// Panics on an empty slug.
    pub fn trigger(slug: impl Into<String>) -> Step {
        let trigger = slug.into();
        assert!(!trigger.is_empty(), "trigger slug must not be empty");
        Step::from_kind(StepKind::Trigger(TriggerAttrs {
            trigger,
            label: None,
            async_: false,
            build: BuildAttrs::default(),
            branches: BTreeSet::new(),
        }))
    }

    /// A trigger step targeting another [`Pipeline`] by its slugified name.
    pub fn trigger_pipeline(pipeline: &Pipeline) -> Step {
        Step::trigger(pipeline.slug())
    }

    fn trigger_attrs<R>(&self, apply: impl FnOnce(&mut TriggerAttrs) -> R) -> R {
        match &mut self.state_mut().kind {
            StepKind::Trigger(attrs) => apply(attrs),
            _ => panic!("builder is only valid on trigger steps"),
        }
    }

    /// Does not wait for the triggered build to finish.
    pub fn async_(self, async_: bool) -> Self {
        self.trigger_attrs(|attrs| attrs.async_ = async_);
        self
    }

    pub fn with_build_message(self, message: impl Into<String>) -> Self {
        let message = message.into();
        self.trigger_attrs(|attrs| attrs.build.message = Some(message));
        self
    }

    pub fn with_build_commit(self, commit: impl Into<String>) -> Self {
        let commit = commit.into();
        self.trigger_attrs(|attrs| attrs.build.commit = Some(commit));
        self
    }

    pub fn with_build_branch(self, branch: impl Into<String>) -> Self {
        let branch = branch.into();
        self.trigger_attrs(|attrs| attrs.build.branch = Some(branch));
        self
    }

    pub fn with_build_env(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let (key, value) = (key.into(), value.into());
        assert!(!key.is_empty(), "build env key must not be empty");
        self.trigger_attrs(|attrs| attrs.build.env.insert(key, value));
        self
    }
}
