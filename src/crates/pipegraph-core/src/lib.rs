//! # pipegraph-core
//!
//! Compiles a declarative multi-tool pipeline description into a scheduled execution
//! graph. A pipeline names a set of *tasks* (each bound to a *tool*'s argument schema) and
//! a set of *common nodes* merging tasks' arguments into shared options and files. This
//! crate turns that description into:
//!
//! - a topologically ordered task workflow, with streaming producers immediately followed
//!   by their consumers,
//! - a merged graph of task/option/file nodes carrying final values, retention flags, and
//!   command-line-inclusion flags per edge,
//! - a deletion plan for intermediate files, and dependency/output file lists.
//!
//! ## Pipeline
//!
//! ```text
//! Builder -> Merger -> parameter-set / evaluate-command binders -> originating/additional
//!   passes -> required-argument verification -> Scheduler
//! ```
//!
//! [`compiler::Compiler`] wires every phase together; [`config`] loads tool/pipeline/
//! parameter-set files from JSON or YAML into the types each phase consumes.

pub mod builder;
pub mod compiler;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod graph;
pub mod ids;
pub mod merger;
pub mod paramset;
pub mod passes;
pub mod pipeline;
pub mod required;
pub mod scheduler;
pub mod schema;
pub mod visualization;

pub use compiler::{CompiledWorkflow, Compiler};
pub use error::{CompilerError, Result};
pub use graph::Graph;
pub use pipeline::PipelineDefinition;
pub use schema::ToolRegistry;
