//! Step entities: shared handles, identity keys, and dependency wiring.
//!
//! A [`Step`] is a cheap-to-clone handle onto shared state; clones share
//! identity, so a step wired into several places in the graph is one node,
//! not many. Graph edges are recorded on the step itself through
//! [`Step::depends_on`] and [`Step::is_effect_of`].

mod block;
pub(crate) mod command;
mod trigger;

pub use command::{Command, ExitStatus};

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use uuid::Uuid;

use crate::conditional::Conditional;
use crate::error::{GantryError, Result};

use block::BlockAttrs;
use command::CommandAttrs;
use trigger::TriggerAttrs;

/// A step or a conditional that may become one.
///
/// Dependency edges and pipeline entries both point at potential steps; the
/// resolution pass decides which conditionals materialize.
#[derive(Clone, Debug)]
pub enum PotentialStep {
    Step(Step),
    Conditional(Conditional),
}

impl PotentialStep {
    /// Identity comparison across both variants.
    pub fn same(&self, other: &PotentialStep) -> bool {
        match (self, other) {
            (PotentialStep::Step(a), PotentialStep::Step(b)) => a.same(b),
            (PotentialStep::Conditional(a), PotentialStep::Conditional(b)) => a.same(b),
            _ => false,
        }
    }

    pub(crate) fn display_name(&self) -> String {
        match self {
            PotentialStep::Step(step) => step.to_string(),
            PotentialStep::Conditional(_) => "<conditional>".to_string(),
        }
    }
}

impl From<Step> for PotentialStep {
    fn from(step: Step) -> Self {
        PotentialStep::Step(step)
    }
}

impl From<&Step> for PotentialStep {
    fn from(step: &Step) -> Self {
        PotentialStep::Step(step.clone())
    }
}

impl From<Conditional> for PotentialStep {
    fn from(conditional: Conditional) -> Self {
        PotentialStep::Conditional(conditional)
    }
}

impl From<&Conditional> for PotentialStep {
    fn from(conditional: &Conditional) -> Self {
        PotentialStep::Conditional(conditional.clone())
    }
}

/// A hard dependency edge.
///
/// A self-reference is stored as its own variant rather than an edge back to
/// the owning step: it orders the step after everything emitted so far (a
/// barrier signal), and must never feed a self-loop into the sort.
#[derive(Clone, Debug)]
pub enum Dependency {
    /// Orders the target before the owning step and forces it into the graph.
    On(PotentialStep),
    /// The step named itself; a barrier must separate it from what came before.
    SelfBarrier,
}

impl Dependency {
    pub(crate) fn same_edge(&self, other: &Dependency) -> bool {
        match (self, other) {
            (Dependency::On(a), Dependency::On(b)) => a.same(b),
            (Dependency::SelfBarrier, Dependency::SelfBarrier) => true,
            _ => false,
        }
    }
}

#[derive(Clone)]
pub(crate) enum StepKind {
    Command(CommandAttrs),
    Block(BlockAttrs),
    Trigger(TriggerAttrs),
}

#[derive(Clone)]
pub(crate) struct StepState {
    key: Option<String>,
    pub(crate) dependencies: Vec<Dependency>,
    pub(crate) effect_dependencies: Vec<PotentialStep>,
    pub(crate) always: bool,
    pub(crate) allow_dependency_failure: bool,
    pub(crate) kind: StepKind,
}

/// A snapshot of a step's edge sets, taken around a serialization mutator.
pub(crate) struct EdgeSnapshot {
    dependencies: Vec<Dependency>,
    effect_dependencies: Vec<PotentialStep>,
}

/// A schedulable unit of work.
///
/// Steps are shared handles: cloning is cheap and clones refer to the same
/// node. Builders consume and return the handle so graphs read fluently:
///
/// ```
/// use gantry::Step;
///
/// let build = Step::command("make build");
/// let test = Step::command("make test").depends_on(&build);
/// assert_eq!(test.to_string(), "<make test>");
/// ```
#[derive(Clone)]
pub struct Step {
    state: Rc<RefCell<StepState>>,
}

impl Step {
    pub(crate) fn from_kind(kind: StepKind) -> Self {
        Self {
            state: Rc::new(RefCell::new(StepState {
                key: None,
                dependencies: Vec::new(),
                effect_dependencies: Vec::new(),
                always: false,
                allow_dependency_failure: false,
                kind,
            })),
        }
    }

    pub(crate) fn state(&self) -> Ref<'_, StepState> {
        self.state.borrow()
    }

    pub(crate) fn state_mut(&self) -> RefMut<'_, StepState> {
        self.state.borrow_mut()
    }

    /// Identity comparison: two handles are the same step only if they share
    /// state.
    pub fn same(&self, other: &Step) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    /// The step's identity key, assigned lazily on first access.
    pub fn key(&self) -> String {
        self.state
            .borrow_mut()
            .key
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .clone()
    }

    /// Pins the identity key explicitly.
    ///
    /// # Panics
    ///
    /// Panics when the key is empty, longer than 100 characters, or contains
    /// whitespace; keys end up in `depends_on` references and must be usable
    /// there verbatim.
    pub fn with_key(self, key: impl Into<String>) -> Self {
        let key = key.into();
        assert!(!key.is_empty(), "step key must not be empty");
        assert!(key.len() <= 100, "step key must be at most 100 characters");
        assert!(
            !key.chars().any(char::is_whitespace),
            "step key must not contain whitespace"
        );
        self.state.borrow_mut().key = Some(key);
        self
    }

    /// Marks `target` as a hard dependency: it is forced into the graph and
    /// ordered before this step. Naming the step itself is legal and records
    /// a barrier signal instead of a self-edge.
    ///
    /// If `target` was previously registered through [`Step::is_effect_of`],
    /// it is moved out of the effect set: the last call wins.
    pub fn depends_on(self, target: impl Into<PotentialStep>) -> Self {
        let target = target.into();
        {
            let mut state = self.state.borrow_mut();
            state
                .effect_dependencies
                .retain(|existing| !existing.same(&target));
            let edge = match &target {
                PotentialStep::Step(step) if Rc::ptr_eq(&step.state, &self.state) => {
                    Dependency::SelfBarrier
                }
                _ => Dependency::On(target),
            };
            if !state.dependencies.iter().any(|d| d.same_edge(&edge)) {
                state.dependencies.push(edge);
            }
        }
        self
    }

    /// Marks this step as an effect of `target`: it joins the graph only if
    /// `target` itself ends up in it.
    ///
    /// If `target` was previously registered through [`Step::depends_on`], it
    /// is moved out of the hard set: the last call wins. A step cannot be an
    /// effect of itself.
    pub fn is_effect_of(self, target: impl Into<PotentialStep>) -> Result<Self> {
        let target = target.into();
        if let PotentialStep::Step(step) = &target {
            if Rc::ptr_eq(&step.state, &self.state) {
                return Err(GantryError::SelfEffect {
                    step: self.to_string(),
                });
            }
        }
        {
            let mut state = self.state.borrow_mut();
            state.dependencies.retain(|existing| match existing {
                Dependency::On(potential) => !potential.same(&target),
                Dependency::SelfBarrier => true,
            });
            if !state
                .effect_dependencies
                .iter()
                .any(|existing| existing.same(&target))
            {
                state.effect_dependencies.push(target);
            }
        }
        Ok(self)
    }

    /// Marks the step continue-on-failure eligible: a barrier preceding a run
    /// of such steps lets them execute even when earlier steps failed.
    pub fn always_execute(self) -> Self {
        self.state.borrow_mut().always = true;
        self
    }

    pub fn always(&self) -> bool {
        self.state.borrow().always
    }

    /// In explicit-dependency serialization, suppresses the per-edge
    /// `allow_failure` flag in favor of a step-wide one.
    pub fn allow_dependency_failure(self, allow: bool) -> Self {
        self.state.borrow_mut().allow_dependency_failure = allow;
        self
    }

    pub fn dependencies(&self) -> Vec<Dependency> {
        self.state.borrow().dependencies.clone()
    }

    pub fn effect_dependencies(&self) -> Vec<PotentialStep> {
        self.state.borrow().effect_dependencies.clone()
    }

    pub(crate) fn has_any_dependency(&self) -> bool {
        let state = self.state.borrow();
        !state.dependencies.is_empty() || !state.effect_dependencies.is_empty()
    }

    pub(crate) fn set_dependencies(&self, dependencies: Vec<Dependency>) {
        self.state.borrow_mut().dependencies = dependencies;
    }

    pub(crate) fn set_effect_dependencies(&self, effects: Vec<PotentialStep>) {
        self.state.borrow_mut().effect_dependencies = effects;
    }

    /// Deep-copies the step into a fresh handle with the same key and
    /// attributes. The walker rebuilds graphs from duplicates so mutation
    /// never aliases caller-held handles.
    pub(crate) fn duplicate(&self) -> Step {
        self.key();
        Step {
            state: Rc::new(RefCell::new(self.state.borrow().clone())),
        }
    }

    pub(crate) fn edge_snapshot(&self) -> EdgeSnapshot {
        let state = self.state.borrow();
        EdgeSnapshot {
            dependencies: state.dependencies.clone(),
            effect_dependencies: state.effect_dependencies.clone(),
        }
    }

    pub(crate) fn edges_match(&self, snapshot: &EdgeSnapshot) -> bool {
        let state = self.state.borrow();
        state.dependencies.len() == snapshot.dependencies.len()
            && state.effect_dependencies.len() == snapshot.effect_dependencies.len()
            && state
                .dependencies
                .iter()
                .zip(&snapshot.dependencies)
                .all(|(a, b)| a.same_edge(b))
            && state
                .effect_dependencies
                .iter()
                .zip(&snapshot.effect_dependencies)
                .all(|(a, b)| a.same(b))
    }

    /// Adds a branch limit pattern; the step only runs on matching branches.
    pub fn with_branch(self, pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        assert!(!pattern.is_empty(), "branch pattern must not be empty");
        {
            let mut state = self.state.borrow_mut();
            match &mut state.kind {
                StepKind::Command(attrs) => attrs.branches.insert(pattern),
                StepKind::Block(attrs) => attrs.branches.insert(pattern),
                StepKind::Trigger(attrs) => attrs.branches.insert(pattern),
            };
        }
        self
    }

    /// Sets the display label. Valid on command and trigger steps.
    pub fn with_label(self, label: impl Into<String>) -> Self {
        {
            let mut state = self.state.borrow_mut();
            match &mut state.kind {
                StepKind::Command(attrs) => attrs.label = Some(label.into()),
                StepKind::Trigger(attrs) => attrs.label = Some(label.into()),
                StepKind::Block(_) => panic!("with_label is not valid on block steps"),
            }
        }
        self
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        match &state.kind {
            StepKind::Command(attrs) => write!(f, "{}", attrs.display_name()),
            StepKind::Block(attrs) => write!(f, "{}", attrs.display_name()),
            StepKind::Trigger(attrs) => write!(f, "{}", attrs.display_name()),
        }
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.to_string())
            .field("key", &self.state.borrow().key)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_identity() {
        let step = Step::command("echo hi");
        let other = step.clone();
        assert!(step.same(&other));
        assert!(!step.same(&Step::command("echo hi")));
    }

    #[test]
    fn key_is_lazily_assigned_and_stable() {
        let step = Step::command("echo hi");
        let key = step.key();
        assert!(!key.is_empty());
        assert_eq!(step.key(), key);
    }

    #[test]
    fn with_key_overrides_the_generated_key() {
        let step = Step::command("echo hi").with_key("greet");
        assert_eq!(step.key(), "greet");
    }

    #[test]
    #[should_panic(expected = "whitespace")]
    fn with_key_rejects_whitespace() {
        let _ = Step::command("echo hi").with_key("not a key");
    }

    #[test]
    fn depends_on_records_an_edge_once() {
        let a = Step::command("a");
        let b = Step::command("b").depends_on(&a).depends_on(&a);
        assert_eq!(b.dependencies().len(), 1);
    }

    #[test]
    fn self_dependency_becomes_a_barrier_signal() {
        let step = Step::command("a");
        let step = step.clone().depends_on(&step);
        let deps = step.dependencies();
        assert_eq!(deps.len(), 1);
        assert!(matches!(deps[0], Dependency::SelfBarrier));
    }

    #[test]
    fn self_effect_is_an_error() {
        let step = Step::command("a");
        let err = step.clone().is_effect_of(&step).unwrap_err();
        assert!(err.to_string().contains("cannot be an effect of itself"));
    }

    #[test]
    fn last_call_wins_between_the_two_sets() {
        let target = Step::command("t");

        let step = Step::command("a")
            .depends_on(&target)
            .is_effect_of(&target)
            .unwrap();
        assert!(step.dependencies().is_empty());
        assert_eq!(step.effect_dependencies().len(), 1);

        let step = step.depends_on(&target);
        assert_eq!(step.dependencies().len(), 1);
        assert!(step.effect_dependencies().is_empty());
    }

    #[test]
    fn duplicate_is_a_distinct_handle_with_the_same_key() {
        let step = Step::command("a").with_key("a");
        let copy = step.duplicate();
        assert!(!copy.same(&step));
        assert_eq!(copy.key(), "a");
        assert_eq!(copy.to_string(), step.to_string());
    }

    #[test]
    fn edge_snapshot_detects_added_edges() {
        let step = Step::command("a");
        let snapshot = step.edge_snapshot();
        assert!(step.edges_match(&snapshot));

        let step = step.depends_on(Step::command("late"));
        assert!(!step.edges_match(&snapshot));
    }

    #[test]
    #[should_panic(expected = "not valid on block steps")]
    fn label_on_block_step_is_a_caller_bug() {
        let _ = Step::block("release").with_label("nope");
    }
}
