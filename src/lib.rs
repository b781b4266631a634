//! Gantry - CI pipelines as dependency graphs.
//!
//! Gantry lets you describe schedulable steps with hard and effect
//! dependencies, some guarded by conditionals, and turns that description
//! into a strictly ordered plan for a CI engine that expresses ordering
//! either through wait barriers or explicit `depends_on` edges.
//!
//! # Modules
//!
//! - [`steps`] - Step entities, identity, and dependency wiring
//! - [`conditional`] - Conditional steps and per-pass resolution caching
//! - [`pipeline`] - The pipeline collection and serializer entry points
//! - [`sort`] - Linearization: effect pruning and stable topological order
//! - [`plan`] - Barrier synthesis over the linear order
//! - [`walker`] - Graph evaluation and the identity-preserving mutation pass
//! - [`serialize`] - JSON/YAML/structural/dot encoders and their options
//! - [`error`] - Error types and result alias
//!
//! # Example
//!
//! ```
//! use futures::executor::block_on;
//! use gantry::{Pipeline, Step};
//!
//! let build = Step::command("make build");
//! let test = Step::command("make test").depends_on(&build);
//! let pipeline = Pipeline::new("ci")
//!     .add(build)
//!     .unwrap()
//!     .add(test)
//!     .unwrap();
//!
//! let yaml = block_on(pipeline.to_yaml(Default::default())).unwrap();
//! assert!(yaml.contains("make test"));
//! ```

pub mod conditional;
pub mod error;
pub mod pipeline;
pub mod plan;
pub mod serialize;
pub mod sort;
pub mod steps;
pub mod walker;

pub use conditional::{Condition, Conditional};
pub use error::{GantryError, Result};
pub use pipeline::Pipeline;
pub use plan::{Barrier, PlanItem};
pub use serialize::SerializationOptions;
pub use sort::linearize;
pub use steps::{Command, Dependency, ExitStatus, PotentialStep, Step};
pub use walker::{evaluate_pipeline, walk, Mutator};
