//! Builds one per-task subgraph per pipeline task, ready for [`crate::merger::Merger`].
//!
//! For each task the builder creates the task node, then one option node (and, for file
//! arguments, one or more file-node children) per argument the tool requires or the
//! pipeline otherwise references. Edge direction encodes I/O: an input argument's node
//! points at the task; an output argument's node is pointed at by the task (§4.1).

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::error::Result;
use crate::graph::{EdgeAttrs, FileNode, Graph, OptionNode, TaskNode, Values};
use crate::ids::{FileId, FileSuffix, IdAllocator, NodeId, OptionId, TaskId};
use crate::pipeline::PipelineDefinition;
use crate::schema::{ArgumentSchema, ToolRegistry, ToolSchema};

/// Maps a pipeline-declared `(task, argument)` pair to the option node the builder created
/// for it. The merger consults this to decide whether a common-node pair is "eligible" —
/// i.e. whether its node already exists (§4.2 phase M1).
pub type TaskArgumentIndex = HashMap<(TaskId, String), OptionId>;

/// Constructs per-task subgraphs from a tool registry and pipeline definition.
pub struct Builder<'a> {
    tools: &'a ToolRegistry,
    pipeline: &'a PipelineDefinition,
    alloc: IdAllocator,
}

impl<'a> Builder<'a> {
    pub fn new(tools: &'a ToolRegistry, pipeline: &'a PipelineDefinition) -> Self {
        Self {
            tools,
            pipeline,
            alloc: IdAllocator::new(),
        }
    }

    /// Runs the build, returning the disjoint per-task subgraphs (already unioned into one
    /// [`Graph`], since task names are unique), the `(task, argument) -> option` index, and
    /// the id allocator so the merger can keep allocating without colliding with these ids.
    pub fn build(mut self) -> Result<(Graph, TaskArgumentIndex, IdAllocator)> {
        let mut graph = Graph::new();
        let mut index = TaskArgumentIndex::new();

        for task_decl in &self.pipeline.tasks {
            let tool = self.tools.get(&task_decl.tool)?;
            graph.add_task(TaskNode::new(task_decl.name.clone(), tool.name.clone()));

            for long_form in referenced_arguments(&task_decl.name, tool, self.pipeline) {
                let arg = tool.argument(&long_form)?;
                let option_id = self.alloc.alloc_option();
                graph.add_option(new_option_node(option_id, arg));
                index.insert((task_decl.name.clone(), long_form.clone()), option_id);

                if arg.is_file() {
                    build_file_nodes(&mut graph, option_id, arg, &task_decl.name);
                } else {
                    let edge = EdgeAttrs::plain(arg.long_form.clone(), arg.short_form.clone(), arg.is_input);
                    link_task(&mut graph, NodeId::Option(option_id), &task_decl.name, arg.is_input, edge);
                }
            }
        }

        Ok((graph, index, self.alloc))
    }
}

fn new_option_node(id: OptionId, arg: &ArgumentSchema) -> OptionNode {
    OptionNode {
        id,
        long_form: arg.long_form.clone(),
        arg_type: arg.arg_type,
        is_input: arg.is_input,
        is_output: arg.is_output,
        is_required: arg.is_required,
        is_filename_stub: arg.is_filename_stub,
        allow_multiple_values: arg.allow_multiple_values,
        allowed_extensions: arg.allowed_extensions.clone(),
        linked_extension: None,
        delete_files: false,
        is_constructed: false,
        is_marked_for_removal: false,
        associated_file_nodes: Vec::new(),
        values: Values::new(),
        is_command_to_evaluate: false,
    }
}

/// Creates the file node(s) for a file-type option: one for a plain file, one per
/// extension for a filename stub (invariant 2), and edges them to `task`.
fn build_file_nodes(graph: &mut Graph, option_id: OptionId, arg: &ArgumentSchema, task: &TaskId) {
    if arg.is_filename_stub {
        for (i, ext) in arg.filename_extensions.iter().enumerate() {
            let file_id = FileId {
                option: option_id,
                suffix: FileSuffix::Indexed((i + 1) as u32),
            };
            let mut exts = BTreeSet::new();
            exts.insert(ext.clone());
            graph.add_file(FileNode {
                id: file_id,
                description: arg.description.clone(),
                allowed_extensions: exts,
                allow_multiple_values: arg.allow_multiple_values,
                values: Values::new(),
                is_streaming: false,
                is_marked_for_removal: false,
            });
            graph.option_mut(option_id).unwrap().associated_file_nodes.push(file_id);
            let edge = EdgeAttrs {
                is_filename_stub: true,
                ..EdgeAttrs::plain(arg.long_form.clone(), arg.short_form.clone(), arg.is_input)
            };
            link_task(graph, NodeId::File(file_id), task, arg.is_input, edge);
        }
    } else {
        let file_id = FileId {
            option: option_id,
            suffix: FileSuffix::Single,
        };
        graph.add_file(FileNode {
            id: file_id,
            description: arg.description.clone(),
            allowed_extensions: arg.allowed_extensions.clone(),
            allow_multiple_values: arg.allow_multiple_values,
            values: Values::new(),
            is_streaming: false,
            is_marked_for_removal: false,
        });
        graph.option_mut(option_id).unwrap().associated_file_nodes.push(file_id);
        let edge = EdgeAttrs::plain(arg.long_form.clone(), arg.short_form.clone(), arg.is_input);
        link_task(graph, NodeId::File(file_id), task, arg.is_input, edge);
    }
}

/// Adds the task-direction edge: `node -> task` for inputs, `task -> node` for outputs.
fn link_task(graph: &mut Graph, node: NodeId, task: &TaskId, is_input: bool, edge: EdgeAttrs) {
    if is_input {
        graph.add_edge(node, NodeId::Task(task.clone()), edge);
    } else {
        graph.add_edge(NodeId::Task(task.clone()), node, edge);
    }
}

/// An argument of `tool` needs a node on `task` if the tool marks it required, or if the
/// pipeline mentions `(task, argument)` anywhere: common nodes, originating edges,
/// additional nodes, greedy arguments, evaluate-commands, or a tool-mode parameter set.
fn referenced_arguments(task: &TaskId, tool: &ToolSchema, pipeline: &PipelineDefinition) -> Vec<String> {
    let mut set: HashSet<String> = tool
        .arguments
        .values()
        .filter(|a| a.is_required)
        .map(|a| a.long_form.clone())
        .collect();

    let mut note = |t: &TaskId, arg: &str| {
        if t == task {
            set.insert(arg.to_string());
        }
    };

    for common in &pipeline.common_nodes {
        for (t, a) in &common.pairs {
            note(t, a);
        }
    }
    for edge in &pipeline.originating_edges {
        note(&edge.source.0, &edge.source.1);
        note(&edge.target.0, &edge.target.1);
    }
    for additional in &pipeline.additional_nodes {
        for (t, a) in &additional.pairs {
            note(t, a);
        }
    }
    for (t, a) in &pipeline.greedy_arguments {
        note(t, a);
    }
    for ec in &pipeline.evaluate_commands {
        note(&ec.target.0, &ec.target.1);
        for (t, a) in ec.sources.values() {
            note(t, a);
        }
    }
    for set_spec in pipeline.parameter_sets.values() {
        if let crate::pipeline::ParameterSetTarget::Tool(tool_name) = &set_spec.target {
            if tool_name == &tool.name {
                for entry in &set_spec.entries {
                    let arg = entry.argument.as_deref().unwrap_or(&entry.id);
                    note(task, arg);
                }
            }
        }
    }

    // Stable, deterministic order: declared tool argument order first, then anything left.
    let mut ordered: Vec<String> = Vec::new();
    for name in &tool.argument_order {
        if set.remove(name) {
            ordered.push(name.clone());
        }
    }
    let mut rest: Vec<String> = set.into_iter().collect();
    rest.sort();
    ordered.extend(rest);
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ArgumentType, ToolSchema};

    fn sample_tool() -> ToolSchema {
        let mut arguments = HashMap::new();
        arguments.insert(
            "--out".to_string(),
            ArgumentSchema {
                long_form: "--out".to_string(),
                short_form: Some("-o".to_string()),
                description: "output bam".to_string(),
                arg_type: ArgumentType::File,
                is_input: false,
                is_output: true,
                is_required: true,
                allowed_extensions: BTreeSet::from([".bam".to_string()]),
                is_filename_stub: false,
                filename_extensions: Vec::new(),
                allow_multiple_values: false,
                output_stream: false,
                if_output_is_stream: None,
                can_be_set_by_argument: Vec::new(),
            },
        );
        ToolSchema {
            name: "alignerA".to_string(),
            description: "aligns reads".to_string(),
            executable: "alignerA".to_string(),
            path: "/usr/bin".to_string(),
            precommand: None,
            modifier: None,
            is_hidden: false,
            argument_order: vec!["--out".to_string()],
            arguments,
        }
    }

    #[test]
    fn builds_one_task_node_and_one_file_node() {
        let mut tools = ToolRegistry::new();
        tools.insert(sample_tool()).unwrap();

        let pipeline = PipelineDefinition {
            tasks: vec![crate::pipeline::TaskDecl {
                name: "A".to_string(),
                tool: "alignerA".to_string(),
            }],
            ..Default::default()
        };

        let (graph, index, _alloc) = Builder::new(&tools, &pipeline).build().unwrap();
        assert!(graph.task("A").is_some());
        let option_id = *index.get(&("A".to_string(), "--out".to_string())).unwrap();
        let option = graph.option(option_id).unwrap();
        assert_eq!(option.associated_file_nodes.len(), 1);
    }
}
