//! Pipeline registry: the declarative description of how tasks chain together.
//!
//! A [`PipelineDefinition`] is pure data — produced by [`crate::config`] from a pipeline
//! file, or constructed directly by callers embedding this crate. It says nothing about
//! how the graph is built; that is the [`crate::builder::Builder`] and
//! [`crate::merger::Merger`]'s job.

use std::collections::HashMap;

use crate::ids::TaskId;

/// One task slot in the pipeline: a pipeline-unique name bound to a tool.
#[derive(Debug, Clone)]
pub struct TaskDecl {
    pub name: TaskId,
    pub tool: String,
}

/// A declared `(task, argument)` reference, as they appear throughout the pipeline schema.
pub type TaskArgument = (TaskId, String);

/// A common-node entry: a logical identity merging several tasks' arguments into one node.
#[derive(Debug, Clone, Default)]
pub struct CommonNodeEntry {
    pub id: String,
    pub pairs: Vec<TaskArgument>,
    /// Override extension per `(task, argument)`, when this common node routes a
    /// filename-stub's expansions to different consumer tasks (§4.2 phase M5).
    pub linked_extension: HashMap<TaskArgument, String>,
    pub delete_files: bool,
}

/// A pipeline-declared edge from a source task's output argument directly into a target
/// task's input argument, bypassing the common-node mechanism (§4.6).
#[derive(Debug, Clone)]
pub struct OriginatingEdgeSpec {
    pub source: TaskArgument,
    pub target: TaskArgument,
}

/// A common-node that aggregates several `(task, argument)` pairs with none of them
/// preexisting, allocating a fresh option (and file, if applicable) node (§4.6).
#[derive(Debug, Clone)]
pub struct AdditionalNodeSpec {
    pub id: String,
    pub pairs: Vec<TaskArgument>,
}

/// A pipeline argument left unbound to any common node, resolved lazily by walking the
/// first pair of the named additional node to find its realised option (§4.6).
#[derive(Debug, Clone)]
pub struct UnassignedArgument {
    pub pipeline_argument: String,
    pub additional_node_id: String,
}

/// A command template evaluated at runtime, with placeholder IDs bound to source arguments.
#[derive(Debug, Clone)]
pub struct EvaluateCommandSpec {
    pub target: TaskArgument,
    /// Template string containing `$ID` placeholders, e.g. `"nproc - $X"`.
    pub template: String,
    /// Placeholder ID -> source `(task, argument)` providing its per-iteration value.
    pub sources: HashMap<String, TaskArgument>,
}

/// Which compiled-graph identity a parameter set's entries are applied against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterSetTarget {
    /// Entries' `id` fields are pipeline common-node IDs.
    Pipeline,
    /// Entries' `id` fields are argument long forms on the single named tool task.
    Tool(String),
}

/// A single `(argument, values)` overlay within a parameter set.
#[derive(Debug, Clone)]
pub struct ParameterSetEntry {
    /// Common-node ID (pipeline mode) or argument long form (tool mode).
    pub id: String,
    /// Explicit argument override, when the entry's `id` is not itself the argument name.
    pub argument: Option<String>,
    pub values: Vec<String>,
}

/// A named, loaded parameter set ready to be applied by [`crate::paramset`].
#[derive(Debug, Clone)]
pub struct ParameterSetSpec {
    pub name: String,
    pub target: ParameterSetTarget,
    pub entries: Vec<ParameterSetEntry>,
}

/// The full declarative pipeline: tasks plus every cross-task wiring declaration.
#[derive(Debug, Clone, Default)]
pub struct PipelineDefinition {
    pub tasks: Vec<TaskDecl>,
    pub common_nodes: Vec<CommonNodeEntry>,
    pub originating_edges: Vec<OriginatingEdgeSpec>,
    /// `(task, argument)` pairs whose multiple iterations collapse to one invocation.
    pub greedy_arguments: Vec<TaskArgument>,
    pub tasks_outputting_to_stream: Vec<TaskId>,
    pub additional_nodes: Vec<AdditionalNodeSpec>,
    pub unassigned_arguments: Vec<UnassignedArgument>,
    /// Pipeline-argument name -> common-node ID, used by the parameter-set binder.
    pub pipeline_arguments: HashMap<String, String>,
    pub evaluate_commands: Vec<EvaluateCommandSpec>,
    pub parameter_sets: HashMap<String, ParameterSetSpec>,
}

impl PipelineDefinition {
    pub fn task(&self, name: &str) -> Option<&TaskDecl> {
        self.tasks.iter().find(|t| t.name == name)
    }

    pub fn common_node(&self, id: &str) -> Option<&CommonNodeEntry> {
        self.common_nodes.iter().find(|n| n.id == id)
    }
}
