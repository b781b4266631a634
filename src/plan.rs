//! Barrier synthesis: turning the linear order into steps and `wait` points.
//!
//! Engines that cannot express explicit edges only understand "everything
//! before this point has finished". The synthesizer scans the linearized
//! steps and inserts a barrier whenever a step's dependency sits after the
//! most recent one, then folds continue-on-failure runs into the preceding
//! barrier.

use std::fmt;

use crate::conditional::ResolveCache;
use crate::steps::{Dependency, Step};

/// A synchronization point between groups of steps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Barrier {
    /// Steps after this barrier run even when steps before it failed.
    pub continue_on_failure: bool,
}

impl fmt::Display for Barrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.continue_on_failure {
            write!(f, "[wait; continue-on-failure]")
        } else {
            write!(f, "[wait]")
        }
    }
}

/// One entry of the synthesized plan.
#[derive(Clone, Debug)]
pub enum PlanItem {
    Step(Step),
    Barrier(Barrier),
}

impl fmt::Display for PlanItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanItem::Step(step) => write!(f, "{step}"),
            PlanItem::Barrier(barrier) => write!(f, "{barrier}"),
        }
    }
}

/// Interleaves barriers into an already-linearized step list.
pub(crate) fn with_barriers(sorted: &[Step], cache: &ResolveCache) -> Vec<PlanItem> {
    let mut items: Vec<PlanItem> = Vec::new();
    let mut last_barrier: Option<usize> = None;
    let mut since_barrier = 0usize;
    let mut run_all_always = true;

    let position = |items: &[PlanItem], step: &Step| -> Option<usize> {
        items.iter().position(|item| match item {
            PlanItem::Step(existing) => existing.same(step),
            PlanItem::Barrier(_) => false,
        })
    };

    for step in sorted {
        let mut needs_barrier = false;
        for dependency in step.dependencies() {
            match dependency {
                // The self-reference separates the step from whatever came
                // before; with nothing emitted since the last barrier there
                // is nothing to separate.
                Dependency::SelfBarrier => needs_barrier = since_barrier > 0,
                Dependency::On(ref target) => {
                    if let Some(resolved) = cache.peek_step(target) {
                        if let Some(pos) = position(&items, &resolved) {
                            needs_barrier = last_barrier.map_or(true, |b| pos > b);
                        }
                    }
                }
            }
            if needs_barrier {
                break;
            }
        }
        if !needs_barrier {
            // Effect edges order their endpoints too when both survive.
            for potential in step.effect_dependencies() {
                if let Some(resolved) = cache.peek_step(&potential) {
                    if let Some(pos) = position(&items, &resolved) {
                        needs_barrier = last_barrier.map_or(true, |b| pos > b);
                        if needs_barrier {
                            break;
                        }
                    }
                }
            }
        }

        if needs_barrier {
            items.push(PlanItem::Barrier(Barrier {
                continue_on_failure: false,
            }));
            last_barrier = Some(items.len() - 1);
            since_barrier = 0;
            run_all_always = true;
        } else if let Some(barrier) = last_barrier {
            // The first non-always step after a continue-on-failure run gets
            // a fresh plain barrier; it must not inherit the relaxed one.
            let relaxed = matches!(
                items[barrier],
                PlanItem::Barrier(Barrier {
                    continue_on_failure: true
                })
            );
            if relaxed && !step.always() && run_all_always && since_barrier > 0 {
                items.push(PlanItem::Barrier(Barrier {
                    continue_on_failure: false,
                }));
                last_barrier = Some(items.len() - 1);
                since_barrier = 0;
                run_all_always = true;
            }
        }

        if step.always() && step.has_any_dependency() && run_all_always {
            if let Some(barrier) = last_barrier {
                if let PlanItem::Barrier(barrier) = &mut items[barrier] {
                    barrier.continue_on_failure = true;
                }
            }
        }

        run_all_always = run_all_always && step.always();
        items.push(PlanItem::Step(step.clone()));
        since_barrier += 1;
    }

    tracing::debug!(
        barriers = items.len() - sorted.len(),
        steps = sorted.len(),
        "synthesized plan"
    );
    items
}
