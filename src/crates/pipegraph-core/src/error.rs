//! Error types for every phase of pipeline compilation.
//!
//! All errors are fatal to the current run — nothing is retried and no partial graph is
//! ever handed back to the caller. Each variant carries enough context (tool, task,
//! argument, node id) to render a precise locus without re-walking the graph.

use thiserror::Error;

use crate::ids::NodeId;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, CompilerError>;

#[derive(Debug, Error)]
pub enum CompilerError {
    /// Invalid tool/pipeline configuration: unknown argument, bad extension list, etc.
    #[error("schema error: {message}")]
    Schema { message: String },

    /// A common-node merge failed: unknown `(task, argument)`, or a filename-stub merge
    /// could not find a sibling whose extension matches a `linkedExtension` override.
    #[error("merge error in common node '{common_node}': {message}")]
    Merge { common_node: String, message: String },

    /// An originating edge named a stub source, or a non-input target.
    #[error("originating edge error ({source:?} -> {target:?}): {message}")]
    OriginatingEdge {
        source: (String, String),
        target: (String, String),
        message: String,
    },

    /// Parameter-set application or export failed.
    #[error("parameter set error ('{name}'): {message}")]
    ParameterSet { name: String, message: String },

    /// An evaluate-at-runtime command template could not be resolved.
    #[error("evaluate-command error (task '{task}', argument '{argument}'): {message}")]
    EvaluateCommand {
        task: String,
        argument: String,
        message: String,
    },

    /// A required argument has no value and no satisfied alternative. `short_form`,
    /// `description` and `alternatives` are preserved for structured rendering even
    /// though the summary line below only surfaces the long form.
    #[error("required argument not set: task '{task}', argument --{long_form} ({description})")]
    Requirement {
        task: String,
        long_form: String,
        short_form: Option<String>,
        description: String,
        alternatives: Vec<String>,
    },

    /// The same intermediate filename was scheduled for deletion at more than one point.
    #[error("filename collision: '{filename}' scheduled for deletion more than once")]
    Collision { filename: String },

    /// A graph invariant (e.g. file-node count per option) was violated after merging.
    #[error("structural invariant violated at {node}: {message}")]
    Structural { node: NodeId, message: String },

    /// Failure loading or parsing a configuration file.
    #[error("io/config error: {0}")]
    Io(String),
}

impl From<serde_json::Error> for CompilerError {
    fn from(e: serde_json::Error) -> Self {
        CompilerError::Io(e.to_string())
    }
}

impl From<serde_yaml::Error> for CompilerError {
    fn from(e: serde_yaml::Error) -> Self {
        CompilerError::Io(e.to_string())
    }
}

impl From<std::io::Error> for CompilerError {
    fn from(e: std::io::Error) -> Self {
        CompilerError::Io(e.to_string())
    }
}
