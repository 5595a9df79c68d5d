//! Parameter-set binder: applies a named `(argument, values)` overlay to the merged graph,
//! in either pipeline mode (common-node IDs) or tool mode (a single task's arguments) (§4.4).

use crate::error::{CompilerError, Result};
use crate::graph::{EdgeAttrs, FileNode, Graph, OptionNode, Values};
use crate::ids::{FileId, FileSuffix, IdAllocator, NodeId, OptionId, TaskId};
use crate::merger::NodeIdMap;
use crate::pipeline::{ParameterSetSpec, ParameterSetTarget, PipelineDefinition};
use crate::schema::{ArgumentSchema, ToolRegistry};

pub struct ParameterSetBinder<'a> {
    tools: &'a ToolRegistry,
    pipeline: &'a PipelineDefinition,
}

impl<'a> ParameterSetBinder<'a> {
    pub fn new(tools: &'a ToolRegistry, pipeline: &'a PipelineDefinition) -> Self {
        Self { tools, pipeline }
    }

    /// Applies the named parameter set, returning an error if it is unknown.
    pub fn apply(&self, name: &str, graph: &mut Graph, node_ids: &NodeIdMap, alloc: &mut IdAllocator) -> Result<()> {
        let set = self.pipeline.parameter_sets.get(name).ok_or_else(|| CompilerError::ParameterSet {
            name: name.to_string(),
            message: "no such parameter set".to_string(),
        })?;

        match &set.target {
            ParameterSetTarget::Pipeline => self.apply_pipeline_mode(set, graph, node_ids),
            ParameterSetTarget::Tool(tool_name) => self.apply_tool_mode(set, tool_name, graph, alloc),
        }
    }

    fn apply_pipeline_mode(&self, set: &ParameterSetSpec, graph: &mut Graph, node_ids: &NodeIdMap) -> Result<()> {
        for entry in &set.entries {
            let argument = entry.argument.as_deref().unwrap_or(&entry.id);
            let common_node_id = self.pipeline.pipeline_arguments.get(argument).unwrap_or(&entry.id);

            let option_id = if let Some(&id) = node_ids.get(common_node_id) {
                id
            } else {
                let cn = self.pipeline.common_node(common_node_id).ok_or_else(|| CompilerError::ParameterSet {
                    name: set.name.clone(),
                    message: format!("unknown common node '{common_node_id}' for argument '{argument}'"),
                })?;
                let (task, arg) = cn.pairs.first().ok_or_else(|| CompilerError::ParameterSet {
                    name: set.name.clone(),
                    message: format!("common node '{common_node_id}' has no declared pairs to fall back on"),
                })?;
                find_option_by_task_argument(graph, task, arg).ok_or_else(|| CompilerError::ParameterSet {
                    name: set.name.clone(),
                    message: format!("could not resolve common node '{common_node_id}' in the merged graph"),
                })?
            };

            write_values(graph, option_id, &entry.values);
        }
        Ok(())
    }

    fn apply_tool_mode(&self, set: &ParameterSetSpec, tool_name: &str, graph: &mut Graph, alloc: &mut IdAllocator) -> Result<()> {
        let task_name = self
            .pipeline
            .tasks
            .iter()
            .find(|t| t.tool == tool_name)
            .map(|t| t.name.clone())
            .ok_or_else(|| CompilerError::ParameterSet {
                name: set.name.clone(),
                message: format!("no task in the pipeline is bound to tool '{tool_name}'"),
            })?;
        let tool = self.tools.get(tool_name)?;

        for entry in &set.entries {
            let argument = entry.argument.as_deref().unwrap_or(&entry.id);
            let option_id = match find_option_by_task_argument(graph, &task_name, argument) {
                Some(id) => id,
                None => synthesize_option(graph, alloc, &task_name, tool.argument(argument)?),
            };
            write_values(graph, option_id, &entry.values);
        }
        Ok(())
    }

    /// Serialises the current merged graph's argument values back into parameter-set
    /// entries, for the `--export-parameter-set` CLI path.
    pub fn export(&self, graph: &Graph, node_ids: &NodeIdMap, name: &str) -> Result<ExportedParameterSet> {
        if name.trim().is_empty() {
            return Err(CompilerError::ParameterSet {
                name: name.to_string(),
                message: "export name must not be empty".to_string(),
            });
        }
        if self.pipeline.parameter_sets.contains_key(name) {
            return Err(CompilerError::ParameterSet {
                name: name.to_string(),
                message: "a parameter set with this name already exists".to_string(),
            });
        }

        let mut entries = Vec::new();
        for cn in &self.pipeline.common_nodes {
            let Some(&id) = node_ids.get(&cn.id) else { continue };
            let Some(option) = graph.option(id) else { continue };
            if option.values.is_empty() {
                continue;
            }
            let values = option.values.get(&1).cloned().unwrap_or_default();
            entries.push(ExportedEntry {
                id: cn.id.clone(),
                argument: None,
                values,
            });
        }

        Ok(ExportedParameterSet {
            name: name.to_string(),
            entries,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ExportedEntry {
    pub id: String,
    pub argument: Option<String>,
    pub values: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ExportedParameterSet {
    pub name: String,
    pub entries: Vec<ExportedEntry>,
}

/// Writes `values` to `option_id`'s (and, for a non-stub file argument, its sole file
/// node's) `values` map, all under iteration 1.
fn write_values(graph: &mut Graph, option_id: OptionId, values: &[String]) {
    let mut map = Values::new();
    map.insert(1, values.to_vec());

    let file_nodes = if let Some(opt) = graph.option_mut(option_id) {
        opt.values = map.clone();
        opt.associated_file_nodes.clone()
    } else {
        Vec::new()
    };
    if file_nodes.len() == 1 {
        if let Some(file) = graph.file_mut(file_nodes[0]) {
            file.values = map;
        }
    }
}

/// Finds the option node bound to `(task, argument)` in the merged graph by inspecting
/// `task`'s incident edges for one whose `longFormArgument` matches.
pub(crate) fn find_option_by_task_argument(graph: &Graph, task: &TaskId, argument: &str) -> Option<OptionId> {
    let node = NodeId::Task(task.clone());
    for neighbour in graph.predecessors(&node).iter().chain(graph.successors(&node).iter()) {
        let edge = graph.edge(neighbour, &node).or_else(|| graph.edge(&node, neighbour));
        let Some(edge) = edge else { continue };
        if edge.long_form_argument != argument {
            continue;
        }
        match neighbour {
            NodeId::Option(oid) => return Some(*oid),
            NodeId::File(fid) => return Some(fid.option),
            NodeId::Task(_) => {}
        }
    }
    None
}

fn synthesize_option(graph: &mut Graph, alloc: &mut IdAllocator, task: &TaskId, arg: &ArgumentSchema) -> OptionId {
    let id = alloc.alloc_option();
    graph.add_option(OptionNode {
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
        is_constructed: true,
        is_marked_for_removal: false,
        associated_file_nodes: Vec::new(),
        values: Values::new(),
        is_command_to_evaluate: false,
    });

    if arg.is_file() {
        if arg.is_filename_stub {
            for (i, ext) in arg.filename_extensions.iter().enumerate() {
                let fid = FileId { option: id, suffix: FileSuffix::Indexed((i + 1) as u32) };
                graph.add_file(FileNode {
                    id: fid,
                    description: arg.description.clone(),
                    allowed_extensions: std::iter::once(ext.clone()).collect(),
                    allow_multiple_values: arg.allow_multiple_values,
                    values: Values::new(),
                    is_streaming: false,
                    is_marked_for_removal: false,
                });
                graph.option_mut(id).unwrap().associated_file_nodes.push(fid);
            }
        } else {
            let fid = FileId { option: id, suffix: FileSuffix::Single };
            graph.add_file(FileNode {
                id: fid,
                description: arg.description.clone(),
                allowed_extensions: arg.allowed_extensions.clone(),
                allow_multiple_values: arg.allow_multiple_values,
                values: Values::new(),
                is_streaming: false,
                is_marked_for_removal: false,
            });
            graph.option_mut(id).unwrap().associated_file_nodes.push(fid);
        }
        let edge = EdgeAttrs::plain(arg.long_form.clone(), arg.short_form.clone(), arg.is_input);
        let fid = graph.option(id).unwrap().associated_file_nodes[0];
        if arg.is_input {
            graph.add_edge(NodeId::File(fid), NodeId::Task(task.clone()), edge);
        } else {
            graph.add_edge(NodeId::Task(task.clone()), NodeId::File(fid), edge);
        }
    } else {
        let edge = EdgeAttrs::plain(arg.long_form.clone(), arg.short_form.clone(), arg.is_input);
        if arg.is_input {
            graph.add_edge(NodeId::Option(id), NodeId::Task(task.clone()), edge);
        } else {
            graph.add_edge(NodeId::Task(task.clone()), NodeId::Option(id), edge);
        }
    }

    id
}
