//! Block steps: manual unblock points in the pipeline.

use std::collections::BTreeSet;

use super::{Step, StepKind};

#[derive(Clone)]
pub(crate) struct BlockAttrs {
    pub(crate) title: String,
    pub(crate) prompt: Option<String>,
    pub(crate) branches: BTreeSet<String>,
}

impl BlockAttrs {
    pub(crate) fn display_name(&self) -> String {
        format!("[block for '{}']", self.title)
    }
}

impl Step {
    /// A block step: the pipeline pauses until someone unblocks it.
    ///
    /// # Panics
    ///
    /// Panics on an empty title.
    pub fn block(title: impl Into<String>) -> Step {
        let title = title.into();
        assert!(!title.is_empty(), "block title must not be empty");
        Step::from_kind(StepKind::Block(BlockAttrs {
            title,
            prompt: None,
            branches: BTreeSet::new(),
        }))
    }

    /// Sets the prompt shown in the unblock dialog. Valid on block steps.
    pub fn with_prompt(self, prompt: impl Into<String>) -> Self {
        {
            let mut state = self.state_mut();
            match &mut state.kind {
                StepKind::Block(attrs) => attrs.prompt = Some(prompt.into()),
                _ => panic!("with_prompt is only valid on block steps"),
            }
        }
        self
    }
}
