//! Error types for gantry operations.
//!
//! This module defines [`GantryError`], the primary error type used throughout
//! the crate, and a [`Result`] type alias for convenience.
//!
//! # Error Handling Strategy
//!
//! - Use `GantryError` for graph errors that need distinct handling
//! - Caller-supplied callbacks (conditions, mutators) report failures as
//!   `anyhow::Error`, carried transparently so their messages survive intact
//! - Every error aborts the resolution pass it occurred in; there is no
//!   partial output to recover

use thiserror::Error;

/// Core error type for gantry operations.
#[derive(Debug, Error)]
pub enum GantryError {
    /// The same step or conditional instance was added to a pipeline twice.
    #[error("Cannot add the same step to a pipeline twice: {step}")]
    DuplicateStep { step: String },

    /// A step named itself as an effect dependency. Self-references are only
    /// legal as hard dependencies, where they act as a barrier signal.
    #[error("A step cannot be an effect of itself: {step}")]
    SelfEffect { step: String },

    /// A conditional's accept predicate or step producer failed.
    #[error(transparent)]
    Condition(anyhow::Error),

    /// Step dependency cycle detected among hard dependency edges.
    #[error("Circular dependency detected: {cycle}")]
    CircularDependency { cycle: String },

    /// A serialization-time mutator changed a step's dependency or effect
    /// set, invalidating the linearization already computed from it.
    #[error("Mutator cannot mutate dependencies of step '{step}'")]
    MutatedDependencies { step: String },

    /// A walk encountered a conditional that should already be resolved.
    #[error("Encountered a conditional during walk: run evaluate_pipeline first")]
    UnresolvedConditional,

    /// A walker or serialization mutator callback failed.
    #[error(transparent)]
    Mutator(anyhow::Error),

    /// YAML rendering of the serialized pipeline failed.
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for gantry operations.
pub type Result<T> = std::result::Result<T, GantryError>;
