//! Required-argument verification and the post-scheduling isolated-node report (§4.7, §4.8).

use std::collections::HashMap;

use crate::error::{CompilerError, Result};
use crate::graph::Graph;
use crate::ids::{FileId, NodeId, TaskId};
use crate::pipeline::PipelineDefinition;
use crate::schema::ToolRegistry;

pub struct RequirementChecker<'a> {
    tools: &'a ToolRegistry,
    pipeline: &'a PipelineDefinition,
}

impl<'a> RequirementChecker<'a> {
    pub fn new(tools: &'a ToolRegistry, pipeline: &'a PipelineDefinition) -> Self {
        Self { tools, pipeline }
    }

    /// For every task, groups predecessor file nodes by the argument long form their edge
    /// declares (originating edges alias several file nodes under one long form). A
    /// required group with no populated member is an error; a satisfied group's empty
    /// siblings are pruned.
    pub fn run(&self, graph: &mut Graph) -> Result<()> {
        let tasks = graph.task_order().to_vec();
        for task in &tasks {
            let node = NodeId::Task(task.clone());
            let preds = graph.predecessors(&node).to_vec();

            let mut groups: HashMap<String, Vec<FileId>> = HashMap::new();
            for p in &preds {
                if let NodeId::File(fid) = p {
                    if let Some(edge) = graph.edge(p, &node) {
                        groups.entry(edge.long_form_argument.clone()).or_default().push(*fid);
                    }
                }
            }

            for (long_form, file_ids) in groups {
                let required = file_ids
                    .iter()
                    .any(|fid| graph.option(fid.option).map(|o| o.is_required).unwrap_or(false));
                if !required {
                    continue;
                }

                let satisfied = file_ids
                    .iter()
                    .any(|fid| graph.file(*fid).map(|f| !f.values.is_empty()).unwrap_or(false));

                if satisfied {
                    for fid in &file_ids {
                        let empty = graph.file(*fid).map(|f| f.values.is_empty()).unwrap_or(false);
                        if empty {
                            self.purge_alternative(graph, *fid);
                        }
                    }
                    continue;
                }

                let unknown_task_err = || CompilerError::Requirement {
                    task: task.clone(),
                    long_form: long_form.clone(),
                    short_form: None,
                    description: String::new(),
                    alternatives: Vec::new(),
                };
                let task_decl = self.pipeline.task(task).ok_or_else(unknown_task_err)?;
                let tool = self.tools.get(&task_decl.tool)?;
                let schema = tool.argument(&long_form)?;
                return Err(CompilerError::Requirement {
                    task: task.clone(),
                    long_form: long_form.clone(),
                    short_form: schema.short_form.clone(),
                    description: schema.description.clone(),
                    alternatives: schema.can_be_set_by_argument.clone(),
                });
            }
        }
        Ok(())
    }

    fn purge_alternative(&self, graph: &mut Graph, fid: FileId) {
        if let Some(o) = graph.option_mut(fid.option) {
            o.is_marked_for_removal = true;
        }
        if let Some(f) = graph.file_mut(fid) {
            f.is_marked_for_removal = true;
        }
        graph.purge_option(fid.option);
    }
}

/// A task is isolated iff none of its predecessor file nodes have any other predecessor or
/// consumer, and none of its successor file nodes have any successor.
pub fn isolated_tasks(graph: &Graph) -> Vec<TaskId> {
    let mut isolated = Vec::new();
    for task in graph.task_order() {
        let node = NodeId::Task(task.clone());

        let preds_isolated = graph.predecessors(&node).iter().all(|p| {
            let other_preds = graph.predecessors(p).iter().any(|pp| pp != &node);
            let other_succs = graph.successors(p).iter().any(|ps| ps != &node);
            !other_preds && !other_succs
        });
        let succs_isolated = graph.successors(&node).iter().all(|s| graph.successors(s).is_empty());

        if preds_isolated && succs_isolated {
            isolated.push(task.clone());
        }
    }
    isolated
}
