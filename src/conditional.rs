//! Conditional steps and their per-pass resolution cache.
//!
//! A [`Conditional`] wraps a step whose membership in the graph is decided at
//! resolution time by an accept predicate. The wrapped step itself may be
//! deferred: already built, produced by a closure on demand, or awaited from
//! a future.

use std::cell::Cell;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use async_trait::async_trait;
use futures::future::{LocalBoxFuture, Shared};
use futures::FutureExt;

use crate::error::{GantryError, Result};
use crate::steps::{PotentialStep, Step};

/// Decides whether a conditional step joins the graph.
///
/// `accept` may suspend (branch lookups, API calls). A failure aborts the
/// enclosing resolution pass and is reported verbatim.
#[async_trait(?Send)]
pub trait Condition {
    async fn accept(&self) -> anyhow::Result<bool>;
}

/// Plain closures double as conditions, so simple guards read naturally:
/// `Conditional::new(step, || branch == "main")`.
#[async_trait(?Send)]
impl<F> Condition for F
where
    F: Fn() -> bool,
{
    async fn accept(&self) -> anyhow::Result<bool> {
        Ok(self())
    }
}

type SharedStep = Shared<LocalBoxFuture<'static, Step>>;

/// The deferred step inside a [`Conditional`].
enum Guarded {
    Ready(Step),
    Producer(Box<dyn Fn() -> anyhow::Result<Step>>),
    Pending(SharedStep),
}

struct ConditionalState {
    guarded: Guarded,
    condition: Box<dyn Condition>,
    overridable: Cell<bool>,
}

/// A step guarded by an accept predicate.
///
/// Conditionals are cheap-to-clone handles; clones share identity, and the
/// resolution pass caches outcomes per instance, so a conditional referenced
/// by several steps is decided and produced once per pass.
#[derive(Clone)]
pub struct Conditional {
    state: Rc<ConditionalState>,
}

impl Conditional {
    /// Guards an already-built step.
    pub fn new(step: Step, condition: impl Condition + 'static) -> Self {
        Self::build(Guarded::Ready(step), condition)
    }

    /// Guards a step produced on demand. The producer runs at most once per
    /// resolution pass, and only if the conditional is accepted or forced
    /// through a hard dependency.
    pub fn deferred(
        producer: impl Fn() -> anyhow::Result<Step> + 'static,
        condition: impl Condition + 'static,
    ) -> Self {
        Self::build(Guarded::Producer(Box::new(producer)), condition)
    }

    /// Guards a step that is still being computed. The future is shared, so
    /// it is polled to completion once and the result reused, even across
    /// passes.
    pub fn pending(
        step: impl Future<Output = Step> + 'static,
        condition: impl Condition + 'static,
    ) -> Self {
        Self::build(Guarded::Pending(step.boxed_local().shared()), condition)
    }

    fn build(guarded: Guarded, condition: impl Condition + 'static) -> Self {
        Self {
            state: Rc::new(ConditionalState {
                guarded,
                condition: Box::new(condition),
                overridable: Cell::new(false),
            }),
        }
    }

    /// Marks the conditional as overridable: resolution passes running in
    /// accept-all mode include it without consulting its predicate.
    pub fn overridable(self, allow: bool) -> Self {
        self.state.overridable.set(allow);
        self
    }

    pub fn is_overridable(&self) -> bool {
        self.state.overridable.get()
    }

    /// Identity comparison: two handles are the same conditional only if they
    /// share state.
    pub(crate) fn same(&self, other: &Conditional) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    pub(crate) async fn accept(&self) -> anyhow::Result<bool> {
        self.state.condition.accept().await
    }

    pub(crate) async fn produce(&self) -> anyhow::Result<Step> {
        match &self.state.guarded {
            Guarded::Ready(step) => Ok(step.clone()),
            Guarded::Producer(producer) => producer(),
            Guarded::Pending(pending) => Ok(pending.clone().await),
        }
    }
}

impl fmt::Debug for Conditional {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conditional")
            .field("overridable", &self.is_overridable())
            .finish_non_exhaustive()
    }
}

/// Per-pass memoization of conditional outcomes.
///
/// Every top-level evaluation, linearization, or serialization call creates a
/// fresh cache and drops it when the pass ends; caches are never shared
/// across calls. Each conditional gets an integer handle at first encounter
/// and both the accept decision and the produced step are cached by handle,
/// so user predicates and producers run at most once per pass no matter how
/// many steps reference the conditional.
pub(crate) struct ResolveCache {
    entries: Vec<CacheEntry>,
    accept_all: bool,
}

struct CacheEntry {
    conditional: Conditional,
    decision: Option<bool>,
    produced: Option<Step>,
}

impl ResolveCache {
    pub(crate) fn new(accept_all: bool) -> Self {
        Self {
            entries: Vec::new(),
            accept_all,
        }
    }

    fn handle(&mut self, conditional: &Conditional) -> usize {
        if let Some(found) = self
            .entries
            .iter()
            .position(|e| e.conditional.same(conditional))
        {
            return found;
        }
        self.entries.push(CacheEntry {
            conditional: conditional.clone(),
            decision: None,
            produced: None,
        });
        self.entries.len() - 1
    }

    /// Runs the accept predicate, at most once per conditional per pass. In
    /// accept-all mode, overridable conditionals are accepted without being
    /// consulted.
    pub(crate) async fn decide(&mut self, conditional: &Conditional) -> Result<bool> {
        let handle = self.handle(conditional);
        if let Some(decision) = self.entries[handle].decision {
            return Ok(decision);
        }
        let decision = if self.accept_all && conditional.is_overridable() {
            true
        } else {
            conditional.accept().await.map_err(GantryError::Condition)?
        };
        tracing::trace!(accepted = decision, "resolved conditional");
        self.entries[handle].decision = Some(decision);
        Ok(decision)
    }

    /// Produces the guarded step, at most once per conditional per pass.
    /// Used both for accepted conditionals and for conditionals forced into
    /// the graph by a hard dependency, which bypass `decide` entirely.
    pub(crate) async fn produce(&mut self, conditional: &Conditional) -> Result<Step> {
        let handle = self.handle(conditional);
        if let Some(step) = &self.entries[handle].produced {
            return Ok(step.clone());
        }
        let step = conditional
            .produce()
            .await
            .map_err(GantryError::Condition)?;
        self.entries[handle].produced = Some(step.clone());
        Ok(step)
    }

    /// The step a conditional resolved to earlier in this pass, if any.
    /// Never runs the producer; presence checks for effect ancestors must
    /// not drag absent conditionals into the graph.
    pub(crate) fn produced(&self, conditional: &Conditional) -> Option<Step> {
        self.entries
            .iter()
            .find(|e| e.conditional.same(conditional))
            .and_then(|e| e.produced.clone())
    }

    /// Resolves a potential step to its concrete step, producing conditional
    /// targets on first use.
    pub(crate) async fn step_of(&mut self, potential: &PotentialStep) -> Result<Step> {
        match potential {
            PotentialStep::Step(step) => Ok(step.clone()),
            PotentialStep::Conditional(conditional) => self.produce(conditional).await,
        }
    }

    /// Like [`ResolveCache::step_of`], but side-effect free: a conditional
    /// that never resolved in this pass yields `None`.
    pub(crate) fn peek_step(&self, potential: &PotentialStep) -> Option<Step> {
        match potential {
            PotentialStep::Step(step) => Some(step.clone()),
            PotentialStep::Conditional(conditional) => self.produced(conditional),
        }
    }
}
