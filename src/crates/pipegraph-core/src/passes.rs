//! Originating-edge, additional-node, and unset-flag passes that run after the merger and
//! before required-argument verification (§4.6).

use crate::error::{CompilerError, Result};
use crate::graph::{EdgeAttrs, FileNode, Graph, OptionNode, Values};
use crate::ids::{FileId, FileSuffix, IdAllocator, NodeId, OptionId};
use crate::merger::NodeIdMap;
use crate::paramset::find_option_by_task_argument;
use crate::pipeline::PipelineDefinition;
use crate::schema::{ArgumentSchema, ArgumentType, ToolRegistry};

pub struct Passes<'a> {
    tools: &'a ToolRegistry,
    pipeline: &'a PipelineDefinition,
}

impl<'a> Passes<'a> {
    pub fn new(tools: &'a ToolRegistry, pipeline: &'a PipelineDefinition) -> Self {
        Self { tools, pipeline }
    }

    pub fn run(&self, graph: &mut Graph, node_ids: &mut NodeIdMap, alloc: &mut IdAllocator) -> Result<()> {
        self.originating_edges(graph)?;
        self.additional_nodes(graph, node_ids, alloc)?;
        self.unassigned_arguments(graph, node_ids);
        self.unset_flags(graph);
        Ok(())
    }

    /// Pipeline-declared edges bypassing the common-node mechanism: a source
    /// `(task, argument)`'s node is wired directly to a target `(task, argument)` input.
    fn originating_edges(&self, graph: &mut Graph) -> Result<()> {
        for oe in &self.pipeline.originating_edges {
            let (source_task, source_arg) = &oe.source;
            let (target_task, target_arg) = &oe.target;

            let target_schema = self.argument(target_task, target_arg)?;
            if !target_schema.is_input {
                return Err(CompilerError::OriginatingEdge {
                    source: oe.source.clone(),
                    target: oe.target.clone(),
                    message: format!("target argument '{target_arg}' is not an input"),
                });
            }
            let source_schema = self.argument(source_task, source_arg)?;
            if source_schema.is_filename_stub {
                return Err(CompilerError::OriginatingEdge {
                    source: oe.source.clone(),
                    target: oe.target.clone(),
                    message: "originating edges cannot source a filename-stub argument".to_string(),
                });
            }

            let source_id = find_option_by_task_argument(graph, source_task, source_arg).ok_or_else(|| CompilerError::OriginatingEdge {
                source: oe.source.clone(),
                target: oe.target.clone(),
                message: "source argument not found in the merged graph".to_string(),
            })?;

            let mut edge = EdgeAttrs::plain(target_schema.long_form.clone(), target_schema.short_form.clone(), true);
            edge.is_originating_edge = true;

            let option = graph.option(source_id).unwrap();
            if option.is_file() {
                for fid in option.associated_file_nodes.clone() {
                    graph.add_edge(NodeId::File(fid), NodeId::Task(target_task.clone()), edge.clone());
                }
            } else {
                graph.add_edge(NodeId::Option(source_id), NodeId::Task(target_task.clone()), edge);
            }
        }
        Ok(())
    }

    /// A common node that aggregates several `(task, argument)` pairs none of which
    /// preexisted: allocate one fresh option (and file nodes, if applicable) from the
    /// first pair's schema, then edge every pair to it.
    fn additional_nodes(&self, graph: &mut Graph, node_ids: &mut NodeIdMap, alloc: &mut IdAllocator) -> Result<()> {
        for node in &self.pipeline.additional_nodes {
            let Some((first_task, first_arg)) = node.pairs.first() else { continue };
            let schema = self.argument(first_task, first_arg)?;

            let id = alloc.alloc_option();
            graph.add_option(new_option(id, schema));
            if schema.is_file() {
                create_files(graph, id, schema);
            }

            for (task, arg) in &node.pairs {
                let pair_schema = self.argument(task, arg)?;
                let edge = EdgeAttrs::plain(pair_schema.long_form.clone(), pair_schema.short_form.clone(), pair_schema.is_input);
                if pair_schema.is_file() {
                    let file_nodes = graph.option(id).unwrap().associated_file_nodes.clone();
                    for fid in file_nodes {
                        link(graph, NodeId::File(fid), task, pair_schema.is_input, edge.clone());
                    }
                } else {
                    link(graph, NodeId::Option(id), task, pair_schema.is_input, edge);
                }
            }

            node_ids.insert(node.id.clone(), id);
        }
        Ok(())
    }

    /// Binds a pipeline-argument name directly to an additional node's resolved option,
    /// by walking the additional node's own first pair in the now-wired graph.
    fn unassigned_arguments(&self, graph: &Graph, node_ids: &mut NodeIdMap) {
        for unassigned in &self.pipeline.unassigned_arguments {
            let Some(additional) = self
                .pipeline
                .additional_nodes
                .iter()
                .find(|n| n.id == unassigned.additional_node_id)
            else {
                continue;
            };
            let Some((task, arg)) = additional.pairs.first() else { continue };
            if let Some(id) = find_option_by_task_argument(graph, task, arg) {
                node_ids.insert(unassigned.pipeline_argument.clone(), id);
            }
        }
    }

    /// Any flag-typed option left with no value after all binding defaults to `"unset"`.
    fn unset_flags(&self, graph: &mut Graph) {
        let ids: Vec<OptionId> = graph.option_ids().collect();
        for id in ids {
            let opt = graph.option_mut(id).unwrap();
            if opt.arg_type == ArgumentType::Flag && opt.values.is_empty() {
                let mut values = Values::new();
                values.insert(1, vec!["unset".to_string()]);
                opt.values = values;
            }
        }
    }

    fn argument(&self, task: &str, arg: &str) -> Result<&ArgumentSchema> {
        let decl = self.pipeline.task(task).ok_or_else(|| CompilerError::Schema {
            message: format!("unknown task '{task}'"),
        })?;
        self.tools.get(&decl.tool)?.argument(arg)
    }
}

fn link(graph: &mut Graph, node: NodeId, task: &str, is_input: bool, edge: EdgeAttrs) {
    if is_input {
        graph.add_edge(node, NodeId::Task(task.to_string()), edge);
    } else {
        graph.add_edge(NodeId::Task(task.to_string()), node, edge);
    }
}

fn new_option(id: OptionId, arg: &ArgumentSchema) -> OptionNode {
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
        is_constructed: true,
        is_marked_for_removal: false,
        associated_file_nodes: Vec::new(),
        values: Values::new(),
        is_command_to_evaluate: false,
    }
}

fn create_files(graph: &mut Graph, option_id: OptionId, arg: &ArgumentSchema) {
    if arg.is_filename_stub {
        for (i, ext) in arg.filename_extensions.iter().enumerate() {
            let fid = FileId { option: option_id, suffix: FileSuffix::Indexed((i + 1) as u32) };
            graph.add_file(FileNode {
                id: fid,
                description: arg.description.clone(),
                allowed_extensions: std::iter::once(ext.clone()).collect(),
                allow_multiple_values: arg.allow_multiple_values,
                values: Values::new(),
                is_streaming: false,
                is_marked_for_removal: false,
            });
            graph.option_mut(option_id).unwrap().associated_file_nodes.push(fid);
        }
    } else {
        let fid = FileId { option: option_id, suffix: FileSuffix::Single };
        graph.add_file(FileNode {
            id: fid,
            description: arg.description.clone(),
            allowed_extensions: arg.allowed_extensions.clone(),
            allow_multiple_values: arg.allow_multiple_values,
            values: Values::new(),
            is_streaming: false,
            is_marked_for_removal: false,
        });
        graph.option_mut(option_id).unwrap().associated_file_nodes.push(fid);
    }
}
