//! Topological scheduling: workflow order, streaming reorder, dataset counts, and
//! intermediate-file deletion planning (§4.3).

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::{CompilerError, Result};
use crate::graph::{Graph, ValuesExt};
use crate::ids::{FileId, NodeId, TaskId};
use crate::schema::{StreamInclusion, ToolRegistry};

/// `task -> iteration -> filenames scheduled for deletion once that task completes`.
pub type DeletionPlan = BTreeMap<TaskId, BTreeMap<u32, Vec<String>>>;

/// The fully resolved execution plan handed to downstream consumers (§6 Output).
#[derive(Debug, Clone)]
pub struct Schedule {
    pub workflow: Vec<TaskId>,
    pub deletions: DeletionPlan,
    pub dependencies: Vec<String>,
    pub outputs: Vec<String>,
}

pub struct Scheduler<'a> {
    tools: &'a ToolRegistry,
}

impl<'a> Scheduler<'a> {
    pub fn new(tools: &'a ToolRegistry) -> Self {
        Self { tools }
    }

    pub fn run(&self, graph: &mut Graph) -> Result<Schedule> {
        let streaming = self.identify_streaming(graph)?;
        let initial = graph.topological_task_order()?;
        let workflow = self.streaming_reorder(initial, graph, &streaming);
        self.compute_dataset_counts(graph, &workflow);
        let deletions = self.plan_deletions(graph, &workflow)?;
        let (dependencies, outputs) = self.compute_dependencies_and_outputs(graph, &deletions);

        Ok(Schedule {
            workflow,
            deletions,
            dependencies,
            outputs,
        })
    }

    /// Marks the streaming file (and its incident edges) for every task declared
    /// `outputToStream`, returning `task -> streaming file` for use by the reorder pass.
    fn identify_streaming(&self, graph: &mut Graph) -> Result<HashMap<TaskId, FileId>> {
        let mut streaming_file_of_task = HashMap::new();

        for task_name in graph.task_order().to_vec() {
            let task = graph.task(&task_name).unwrap();
            if !task.output_to_stream {
                continue;
            }
            let tool = self.tools.get(&task.tool)?;
            let Some(stream_arg) = tool.streaming_argument() else {
                continue;
            };

            let producer = NodeId::Task(task_name.clone());
            let mut target: Option<FileId> = None;
            for succ in graph.successors(&producer).to_vec() {
                if let NodeId::File(fid) = succ {
                    let matches = graph
                        .edge(&producer, &succ)
                        .map(|e| e.long_form_argument == stream_arg.long_form)
                        .unwrap_or(false);
                    if matches {
                        target = Some(fid);
                        break;
                    }
                }
            }

            let Some(fid) = target else { continue };
            let do_not_include = stream_arg.if_output_is_stream == Some(StreamInclusion::DoNotInclude);

            if let Some(f) = graph.file_mut(fid) {
                f.is_streaming = true;
            }
            if let Some(e) = graph.edge_mut(&producer, &NodeId::File(fid)) {
                e.is_streaming = true;
                if do_not_include {
                    e.include_on_command_line = false;
                }
            }

            for succ in graph.successors(&NodeId::File(fid)).to_vec() {
                if let NodeId::Task(_) = succ {
                    if let Some(e) = graph.edge_mut(&NodeId::File(fid), &succ) {
                        e.is_streaming = true;
                        if do_not_include {
                            e.include_on_command_line = false;
                        }
                    }
                }
            }

            streaming_file_of_task.insert(task_name.clone(), fid);
        }

        Ok(streaming_file_of_task)
    }

    /// Moves each streaming consumer immediately after its producer, preserving the
    /// relative order of every task not involved in a streaming edge.
    fn streaming_reorder(&self, mut workflow: Vec<TaskId>, graph: &Graph, streaming: &HashMap<TaskId, FileId>) -> Vec<TaskId> {
        let mut i = 0;
        // Streaming edges never cycle and there is at most one mandatory move per producer
        // task, so this terminates well inside `workflow.len()^2` iterations.
        let mut guard = 0usize;
        let bound = workflow.len() * workflow.len() + workflow.len() + 1;

        while i < workflow.len() && guard < bound {
            guard += 1;
            let Some(&fid) = streaming.get(&workflow[i]) else {
                i += 1;
                continue;
            };
            let consumer = graph.scheduling_successors(&NodeId::File(fid)).into_iter().find_map(|n| match n {
                NodeId::Task(t) => Some(t),
                _ => None,
            });
            let Some(consumer) = consumer else {
                i += 1;
                continue;
            };
            let Some(consumer_pos) = workflow.iter().position(|t| t == &consumer) else {
                i += 1;
                continue;
            };

            if consumer_pos == i + 1 {
                i += 1;
                continue;
            }
            let moved = workflow.remove(consumer_pos);
            let insert_at = if consumer_pos < i { i } else { i + 1 };
            workflow.insert(insert_at, moved);
            // Re-examine position i: the consumer may itself produce a stream.
        }
        workflow
    }

    /// Dataset count per task: the max iteration count among predecessor option values,
    /// forced to 1 when the task has a greedy multi-iteration file input and no
    /// multi-iteration non-file option (the single-invocation-over-many-files case).
    fn compute_dataset_counts(&self, graph: &mut Graph, workflow: &[TaskId]) {
        for task_name in workflow {
            let preds = graph.scheduling_predecessors(&NodeId::Task(task_name.clone()));

            let mut max_iterations = 1u32;
            let mut has_greedy_multi_file = false;
            let mut has_multi_non_file_option = false;

            for pred in &preds {
                let is_greedy = graph
                    .edge(pred, &NodeId::Task(task_name.clone()))
                    .map(|e| e.is_greedy)
                    .unwrap_or(false);

                match pred {
                    NodeId::Option(oid) => {
                        if let Some(opt) = graph.option(*oid) {
                            let n = opt.values.max_iteration().max(1);
                            max_iterations = max_iterations.max(n);
                            if !opt.is_file() && n > 1 {
                                has_multi_non_file_option = true;
                            }
                        }
                    }
                    NodeId::File(fid) => {
                        if let Some(file) = graph.file(*fid) {
                            let n = file.values.max_iteration().max(1);
                            max_iterations = max_iterations.max(n);
                            if is_greedy && n > 1 {
                                has_greedy_multi_file = true;
                            }
                        }
                    }
                    NodeId::Task(_) => {}
                }
            }

            let dataset_count = if has_greedy_multi_file && !has_multi_non_file_option {
                1
            } else {
                max_iterations
            };

            if let Some(t) = graph.task_mut(task_name) {
                t.number_of_data_sets = dataset_count;
            }
        }
    }

    /// Builds the `task -> iteration -> filenames` deletion plan for intermediate files,
    /// erroring if any filename would be scheduled for deletion more than once.
    fn plan_deletions(&self, graph: &Graph, workflow: &[TaskId]) -> Result<DeletionPlan> {
        let mut plan = DeletionPlan::new();
        let mut seen_filenames: HashSet<String> = HashSet::new();

        for fid in graph.file_ids().collect::<Vec<_>>() {
            let file = graph.file(fid).unwrap();
            if file.is_streaming || file.is_marked_for_removal {
                continue;
            }
            let node = NodeId::File(fid);
            let has_predecessor_task = graph
                .scheduling_predecessors(&node)
                .iter()
                .any(|p| matches!(p, NodeId::Task(_)));
            let successor_tasks: Vec<TaskId> = graph
                .scheduling_successors(&node)
                .into_iter()
                .filter_map(|s| match s {
                    NodeId::Task(t) => Some(t),
                    _ => None,
                })
                .collect();
            if !has_predecessor_task || successor_tasks.is_empty() {
                continue;
            }

            let option = graph
                .option(fid.option)
                .ok_or_else(|| CompilerError::Structural {
                    node: node.clone(),
                    message: "file node has no owning option".to_string(),
                })?;
            if !option.delete_files {
                // Retention is opt-in per §4.2 phase M6: only common nodes explicitly
                // marked `deleteFiles=true` schedule their files for deletion.
                continue;
            }

            let last_task = successor_tasks
                .iter()
                .max_by_key(|t| workflow.iter().position(|w| *w == **t).unwrap_or(usize::MAX))
                .unwrap();

            for (iteration, values) in &file.values {
                for filename in values {
                    if !seen_filenames.insert(filename.clone()) {
                        return Err(CompilerError::Collision {
                            filename: filename.clone(),
                        });
                    }
                    plan.entry(last_task.clone())
                        .or_default()
                        .entry(*iteration)
                        .or_default()
                        .push(filename.clone());
                }
            }
        }

        Ok(plan)
    }

    fn compute_dependencies_and_outputs(&self, graph: &Graph, deletions: &DeletionPlan) -> (Vec<String>, Vec<String>) {
        let scheduled_for_deletion: HashSet<&String> = deletions.values().flat_map(|by_iter| by_iter.values().flatten()).collect();

        let mut dependencies = Vec::new();
        let mut outputs = Vec::new();

        for fid in graph.file_ids().collect::<Vec<_>>() {
            let file = graph.file(fid).unwrap();
            if file.is_streaming {
                continue;
            }
            let node = NodeId::File(fid);
            let has_predecessor = !graph.scheduling_predecessors(&node).is_empty();
            let has_successor = !graph.scheduling_successors(&node).is_empty();

            if !has_predecessor {
                for values in file.values.values() {
                    dependencies.extend(values.iter().cloned());
                }
            }
            if !has_successor {
                for values in file.values.values() {
                    for v in values {
                        if !scheduled_for_deletion.contains(v) {
                            outputs.push(v.clone());
                        }
                    }
                }
            }
        }

        (dependencies, outputs)
    }
}
