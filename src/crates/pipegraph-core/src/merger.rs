//! Common-node merge protocol: collapses option (and file) nodes the pipeline declares to
//! be the same logical value, including filename-stub expansion (§4.2).
//!
//! Phases M1-M2 (selection and placeholder materialisation) and M3-M4 (edge and file-node
//! rewiring) run per common node, in declared order, since later common nodes never affect
//! earlier ones. M5-M7 are graph-wide passes that run once after every common node has been
//! folded.

use std::collections::{BTreeSet, HashMap};

use crate::builder::TaskArgumentIndex;
use crate::error::{CompilerError, Result};
use crate::graph::{EdgeAttrs, FileNode, Graph, OptionNode, Values};
use crate::ids::{FileId, FileSuffix, IdAllocator, NodeId, OptionId, TaskId};
use crate::pipeline::{CommonNodeEntry, PipelineDefinition};
use crate::schema::{ArgumentSchema, ToolRegistry};

/// Maps a pipeline common-node ID to the option node that survived merging it, per
/// invariant 4 and the `nodeIDs` map referenced throughout §4.4 and §4.6.
pub type NodeIdMap = HashMap<String, OptionId>;

pub struct Merger<'a> {
    tools: &'a ToolRegistry,
    pipeline: &'a PipelineDefinition,
}

impl<'a> Merger<'a> {
    pub fn new(tools: &'a ToolRegistry, pipeline: &'a PipelineDefinition) -> Self {
        Self { tools, pipeline }
    }

    pub fn run(
        &self,
        mut graph: Graph,
        task_args: &TaskArgumentIndex,
        mut alloc: IdAllocator,
    ) -> Result<(Graph, NodeIdMap, IdAllocator)> {
        let mut node_ids = NodeIdMap::new();

        for cn in &self.pipeline.common_nodes {
            if cn.pairs.is_empty() {
                continue;
            }
            if cn.pairs.len() == 1 {
                let (task, arg) = &cn.pairs[0];
                let id = existing_node(task_args, task, arg, &cn.id)?;
                node_ids.insert(cn.id.clone(), id);
                continue;
            }
            let target = self.select_or_materialise(&mut graph, &mut alloc, task_args, cn)?;
            node_ids.insert(cn.id.clone(), target);
            self.rewire(&mut graph, task_args, cn, target)?;
        }

        self.check_edges(&graph, &node_ids)?;
        self.annotate_retention_and_streaming(&mut graph);
        apply_retention(&mut graph, self.pipeline, &node_ids);
        self.mark_greedy(&mut graph);

        Ok((graph, node_ids, alloc))
    }

    // ---- M1 / M2 ----

    fn select_or_materialise(
        &self,
        graph: &mut Graph,
        alloc: &mut IdAllocator,
        task_args: &TaskArgumentIndex,
        cn: &CommonNodeEntry,
    ) -> Result<OptionId> {
        let mut winner = None;
        for (task, arg) in &cn.pairs {
            if cn.linked_extension.contains_key(&(task.clone(), arg.clone())) {
                continue;
            }
            if let Some(&id) = task_args.get(&(task.clone(), arg.clone())) {
                winner = Some(id);
                break;
            }
        }

        if let Some(id) = winner {
            return Ok(id);
        }

        // No eligible pair: materialise a placeholder from the first pair's schema (M2).
        let (first_task, first_arg) = &cn.pairs[0];
        let arg_schema = self.argument_schema(first_task, first_arg, &cn.id)?;
        let id = alloc.alloc_option();
        graph.add_option(new_merge_option(id, arg_schema));
        if arg_schema.is_file() {
            create_file_nodes(graph, id, arg_schema);
        }
        Ok(id)
    }

    // ---- M3 / M4 ----

    fn rewire(
        &self,
        graph: &mut Graph,
        task_args: &TaskArgumentIndex,
        cn: &CommonNodeEntry,
        target: OptionId,
    ) -> Result<()> {
        for (task, arg) in &cn.pairs {
            let removed = task_args.get(&(task.clone(), arg.clone())).copied();
            let removed = match removed {
                Some(id) if id != target => id,
                _ => continue,
            };

            if arg == "read json file" {
                graph.add_edge(
                    NodeId::Option(target),
                    NodeId::Task(task.clone()),
                    EdgeAttrs::plain(arg.clone(), None, true),
                );
                mark_and_purge_option(graph, removed);
                continue;
            }

            let arg_schema = self.argument_schema(task, arg, &cn.id)?;
            let edge = EdgeAttrs::plain(arg_schema.long_form.clone(), arg_schema.short_form.clone(), arg_schema.is_input);

            if arg_schema.is_file() {
                let linked_ext = cn.linked_extension.get(&(task.clone(), arg.clone()));
                let short_form = arg_schema.short_form.clone();
                self.rewire_file_edge(graph, target, removed, task, arg_schema.is_input, short_form, linked_ext, &cn.id)?;
            } else {
                link(graph, NodeId::Option(target), task, arg_schema.is_input, edge);
            }

            mark_and_purge_option(graph, removed);
        }
        Ok(())
    }

    fn rewire_file_edge(
        &self,
        graph: &mut Graph,
        target: OptionId,
        removed: OptionId,
        task: &TaskId,
        is_input: bool,
        short_form: Option<String>,
        linked_ext: Option<&String>,
        common_node: &str,
    ) -> Result<()> {
        let target_stub = graph.option(target).map(|o| o.is_filename_stub).unwrap_or(false);
        let removed_stub = graph.option(removed).map(|o| o.is_filename_stub).unwrap_or(false);

        let edge = |long_form: String, short_form: Option<String>| EdgeAttrs::plain(long_form, short_form, is_input);

        match (target_stub, removed_stub) {
            (false, false) => {
                let file_id = graph.option(target).unwrap().associated_file_nodes[0];
                let long_form = graph.option(target).unwrap().long_form.clone();
                link(graph, NodeId::File(file_id), task, is_input, edge(long_form, short_form));
            }
            (true, false) => {
                let ext = linked_ext.ok_or_else(|| CompilerError::Merge {
                    common_node: common_node.to_string(),
                    message: format!("no linkedExtension declared for task '{task}' merging into a filename-stub node"),
                })?;
                let file_id = graph
                    .option(target)
                    .unwrap()
                    .associated_file_nodes
                    .iter()
                    .copied()
                    .find(|fid| graph.file(*fid).unwrap().allowed_extensions.contains(ext))
                    .ok_or_else(|| CompilerError::Merge {
                        common_node: common_node.to_string(),
                        message: format!("no sibling file node has extension '{ext}'"),
                    })?;
                let long_form = graph.option(target).unwrap().long_form.clone();
                link(graph, NodeId::File(file_id), task, is_input, edge(long_form, short_form));
            }
            (false, true) => {
                self.convert_target_to_stub(graph, target, removed)?;
                let file_ids = graph.option(target).unwrap().associated_file_nodes.clone();
                let long_form = graph.option(target).unwrap().long_form.clone();
                for fid in file_ids {
                    link(graph, NodeId::File(fid), task, is_input, edge(long_form.clone(), short_form.clone()));
                }
            }
            (true, true) => {
                let file_ids = graph.option(target).unwrap().associated_file_nodes.clone();
                let long_form = graph.option(target).unwrap().long_form.clone();
                for fid in file_ids {
                    link(graph, NodeId::File(fid), task, is_input, edge(long_form.clone(), short_form.clone()));
                }
            }
        }
        Ok(())
    }

    /// Repurposes a non-stub merge target's sole file node into the first slot of a stub,
    /// taking on the removed stub's extensions (M4, the "no/yes" case).
    fn convert_target_to_stub(&self, graph: &mut Graph, target: OptionId, removed: OptionId) -> Result<()> {
        if graph.option(target).unwrap().is_filename_stub {
            return Ok(());
        }
        let removed_files = graph.option(removed).unwrap().associated_file_nodes.clone();
        let mut extensions = Vec::with_capacity(removed_files.len());
        let mut descriptions = Vec::with_capacity(removed_files.len());
        let mut allow_multi = Vec::with_capacity(removed_files.len());
        for fid in &removed_files {
            let file = graph.file(*fid).unwrap();
            extensions.push(file.allowed_extensions.clone());
            descriptions.push(file.description.clone());
            allow_multi.push(file.allow_multiple_values);
        }

        let old_single = graph.option(target).unwrap().associated_file_nodes[0];
        let new_first = FileId {
            option: target,
            suffix: FileSuffix::First,
        };
        graph.rename_file(old_single, new_first);
        let first = graph.file_mut(new_first).unwrap();
        first.allowed_extensions = extensions[0].clone();
        first.description = descriptions[0].clone();

        let mut new_ids = vec![new_first];
        for i in 1..removed_files.len() {
            let fid = FileId {
                option: target,
                suffix: FileSuffix::Indexed((i + 1) as u32),
            };
            graph.add_file(FileNode {
                id: fid,
                description: descriptions[i].clone(),
                allowed_extensions: extensions[i].clone(),
                allow_multiple_values: allow_multi[i],
                values: Values::new(),
                is_streaming: false,
                is_marked_for_removal: false,
            });
            new_ids.push(fid);
        }

        let target_opt = graph.option_mut(target).unwrap();
        target_opt.associated_file_nodes = new_ids;
        target_opt.is_filename_stub = true;
        Ok(())
    }

    // ---- M5 ----

    /// Re-checks that every `linkedExtension` pair is wired to the file node whose sole
    /// extension matches the declared override, repairing edges phase M4's rename could
    /// have left pointing at the wrong sibling.
    fn check_edges(&self, graph: &Graph, node_ids: &NodeIdMap) -> Result<()> {
        for cn in &self.pipeline.common_nodes {
            if cn.linked_extension.is_empty() {
                continue;
            }
            let Some(&target) = node_ids.get(&cn.id) else {
                continue;
            };
            for ((task, _arg), ext) in &cn.linked_extension {
                let option = graph.option(target).ok_or_else(|| CompilerError::Structural {
                    node: NodeId::Option(target),
                    message: "merge target missing after merge".to_string(),
                })?;
                let matching = option
                    .associated_file_nodes
                    .iter()
                    .copied()
                    .find(|fid| graph.file(*fid).map(|f| f.allowed_extensions.contains(ext)).unwrap_or(false));
                let Some(file_id) = matching else {
                    return Err(CompilerError::Merge {
                        common_node: cn.id.clone(),
                        message: format!("no sibling file node has linkedExtension '{ext}' for task '{task}'"),
                    });
                };
                let connected = graph.edge(&NodeId::File(file_id), &NodeId::Task(task.clone())).is_some()
                    || graph.edge(&NodeId::Task(task.clone()), &NodeId::File(file_id)).is_some();
                if !connected {
                    return Err(CompilerError::Merge {
                        common_node: cn.id.clone(),
                        message: format!("task '{task}' is not wired to the file node matching linkedExtension '{ext}'"),
                    });
                }
            }
        }
        Ok(())
    }

    // ---- M6 ----

    /// Sets `outputToStream` on declared tasks. `deleteFiles` retention is applied
    /// separately by [`apply_retention`], since it is only resolvable once `node_ids`
    /// (returned from this same pass) exists.
    fn annotate_retention_and_streaming(&self, graph: &mut Graph) {
        for task in &self.pipeline.tasks_outputting_to_stream {
            if let Some(t) = graph.task_mut(task) {
                t.output_to_stream = true;
            }
        }
    }

    // ---- M7 ----

    fn mark_greedy(&self, graph: &mut Graph) {
        for (task, arg) in &self.pipeline.greedy_arguments {
            let preds: Vec<NodeId> = graph.predecessors(&NodeId::Task(task.clone())).to_vec();
            for pred in preds {
                let matches = graph
                    .edge(&pred, &NodeId::Task(task.clone()))
                    .map(|e| &e.long_form_argument == arg)
                    .unwrap_or(false);
                if matches {
                    if let Some(e) = graph.edge_mut(&pred, &NodeId::Task(task.clone())) {
                        e.is_greedy = true;
                    }
                }
            }
        }
        let tasks: Vec<TaskId> = graph.task_order().to_vec();
        for task in tasks {
            let preds: Vec<NodeId> = graph.predecessors(&NodeId::Task(task.clone())).to_vec();
            let any_greedy = preds
                .iter()
                .any(|p| graph.edge(p, &NodeId::Task(task.clone())).map(|e| e.is_greedy).unwrap_or(false));
            if any_greedy {
                if let Some(t) = graph.task_mut(&task) {
                    t.is_greedy = true;
                }
            }
        }
    }

    fn argument_schema(&self, task: &TaskId, arg: &str, common_node: &str) -> Result<&ArgumentSchema> {
        let task_decl = self.pipeline.task(task).ok_or_else(|| CompilerError::Merge {
            common_node: common_node.to_string(),
            message: format!("common node references unknown task '{task}'"),
        })?;
        let tool = self.tools.get(&task_decl.tool)?;
        tool.argument(arg).map_err(|_| CompilerError::Merge {
            common_node: common_node.to_string(),
            message: format!("task '{task}' tool has no argument '{arg}'"),
        })
    }
}

fn existing_node(task_args: &TaskArgumentIndex, task: &TaskId, arg: &str, common_node: &str) -> Result<OptionId> {
    task_args
        .get(&(task.clone(), arg.to_string()))
        .copied()
        .ok_or_else(|| CompilerError::Merge {
            common_node: common_node.to_string(),
            message: format!("no node built for task '{task}' argument '{arg}'"),
        })
}

fn link(graph: &mut Graph, node: NodeId, task: &TaskId, is_input: bool, edge: EdgeAttrs) {
    if is_input {
        graph.add_edge(node, NodeId::Task(task.clone()), edge);
    } else {
        graph.add_edge(NodeId::Task(task.clone()), node, edge);
    }
}

fn mark_and_purge_option(graph: &mut Graph, id: OptionId) {
    if let Some(opt) = graph.option_mut(id) {
        opt.is_marked_for_removal = true;
        for fid in opt.associated_file_nodes.clone() {
            if let Some(f) = graph.file_mut(fid) {
                f.is_marked_for_removal = true;
            }
        }
    }
    graph.purge_option(id);
}

fn new_merge_option(id: OptionId, arg: &ArgumentSchema) -> OptionNode {
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

fn create_file_nodes(graph: &mut Graph, option_id: OptionId, arg: &ArgumentSchema) {
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
    }
}

/// Applies `deleteFiles` from common-node declarations to their surviving option nodes.
/// Kept separate from the merge pass proper since it only needs the resolved node map.
pub fn apply_retention(graph: &mut Graph, pipeline: &PipelineDefinition, node_ids: &NodeIdMap) {
    for cn in &pipeline.common_nodes {
        if !cn.delete_files {
            continue;
        }
        if let Some(&id) = node_ids.get(&cn.id) {
            if let Some(opt) = graph.option_mut(id) {
                opt.delete_files = true;
            }
        }
    }
}
