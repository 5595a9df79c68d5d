//! Evaluate-commands binder: resolves pipeline arguments whose value is a shell command
//! template evaluated at runtime, substituting placeholder IDs with source node values
//! per iteration (§4.5).

use crate::error::{CompilerError, Result};
use crate::graph::{EdgeAttrs, Graph, ValuesExt, Values};
use crate::ids::NodeId;
use crate::merger::NodeIdMap;
use crate::paramset::find_option_by_task_argument;
use crate::pipeline::PipelineDefinition;

pub struct EvaluateBinder<'a> {
    pipeline: &'a PipelineDefinition,
}

impl<'a> EvaluateBinder<'a> {
    pub fn new(pipeline: &'a PipelineDefinition) -> Self {
        Self { pipeline }
    }

    pub fn run(&self, graph: &mut Graph, node_ids: &NodeIdMap) -> Result<()> {
        for ec in &self.pipeline.evaluate_commands {
            let (target_task, target_argument) = &ec.target;
            let target_id = resolve(graph, node_ids, self.pipeline, target_task, target_argument).ok_or_else(|| {
                CompilerError::EvaluateCommand {
                    task: target_task.clone(),
                    argument: target_argument.clone(),
                    message: "target argument not found in the merged graph".to_string(),
                }
            })?;

            if graph.option(target_id).map(|o| !o.values.is_empty()).unwrap_or(false) {
                continue; // user already supplied a value; evaluate-command yields to it
            }

            let mut sources = Vec::with_capacity(ec.sources.len());
            for (placeholder, (src_task, src_argument)) in &ec.sources {
                let src_id = resolve(graph, node_ids, self.pipeline, src_task, src_argument).ok_or_else(|| {
                    CompilerError::EvaluateCommand {
                        task: target_task.clone(),
                        argument: target_argument.clone(),
                        message: format!("source '{placeholder}' (task '{src_task}', argument '{src_argument}') not found"),
                    }
                })?;
                sources.push((placeholder.clone(), src_id));
            }
            // Longest-first so `$X1` is not partially consumed by a replacement for `$X`.
            sources.sort_by_key(|(p, _)| std::cmp::Reverse(p.len()));

            let mut max_iterations = 1u32;
            for (_, src_id) in &sources {
                let n = graph.option(*src_id).map(|o| o.values.max_iteration().max(1)).unwrap_or(1);
                if n > 1 {
                    if max_iterations > 1 && max_iterations != n {
                        return Err(CompilerError::EvaluateCommand {
                            task: target_task.clone(),
                            argument: target_argument.clone(),
                            message: "source iteration counts are incompatible (neither 1 nor a shared N)".to_string(),
                        });
                    }
                    max_iterations = n;
                }
            }

            let mut values = Values::new();
            for iteration in 1..=max_iterations {
                let mut rendered = ec.template.clone();
                for (placeholder, src_id) in &sources {
                    let token = format!("${placeholder}");
                    let value = graph
                        .option(*src_id)
                        .and_then(|o| o.values.at(iteration))
                        .and_then(|v| v.first())
                        .cloned()
                        .unwrap_or_default();
                    rendered = rendered.replace(&token, &value);
                }
                values.insert(iteration, vec![format!("$({rendered})")]);
            }

            if let Some(opt) = graph.option_mut(target_id) {
                opt.values = values;
                opt.is_command_to_evaluate = true;
            }

            for (_, src_id) in &sources {
                tag_provenance_edge(graph, *src_id, target_task);
            }
        }
        Ok(())
    }
}

fn resolve(graph: &Graph, node_ids: &NodeIdMap, pipeline: &PipelineDefinition, task: &str, argument: &str) -> Option<crate::ids::OptionId> {
    if let Some(common_node_id) = pipeline.pipeline_arguments.get(argument) {
        if let Some(&id) = node_ids.get(common_node_id) {
            return Some(id);
        }
    }
    find_option_by_task_argument(graph, &task.to_string(), argument)
}

/// Adds an edge tagging that `target_task` consumed `src_id`'s value through an
/// evaluate-command template, from the source option and (if file) its primary file node.
/// Marked `is_evaluate_command` so `Graph::scheduling_predecessors`/`scheduling_successors`
/// (and everything built on them: dataset counts, deletion planning, dependency/output
/// detection, topological order) skip it — it exists purely for `visualization`'s provenance
/// rendering, never as a scheduling dependency.
fn tag_provenance_edge(graph: &mut Graph, src_id: crate::ids::OptionId, target_task: &str) {
    let mut edge = EdgeAttrs::plain(String::new(), None, true);
    edge.is_evaluate_command = true;
    edge.include_on_command_line = false;

    let file_node = graph.option(src_id).and_then(|o| o.associated_file_nodes.first().copied());
    graph.add_edge(NodeId::Option(src_id), NodeId::Task(target_task.to_string()), edge.clone());
    if let Some(fid) = file_node {
        graph.add_edge(NodeId::File(fid), NodeId::Task(target_task.to_string()), edge);
    }
}
