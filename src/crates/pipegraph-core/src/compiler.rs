//! Top-level facade wiring Builder -> Merger -> binders/passes -> requirement check ->
//! Scheduler into one compilation run (§2 data flow, §6 Output).

use tracing::{info, info_span};

use crate::builder::Builder;
use crate::error::Result;
use crate::evaluator::EvaluateBinder;
use crate::graph::Graph;
use crate::ids::TaskId;
use crate::merger::{Merger, NodeIdMap};
use crate::paramset::ParameterSetBinder;
use crate::passes::Passes;
use crate::pipeline::PipelineDefinition;
use crate::required::{isolated_tasks, RequirementChecker};
use crate::scheduler::{Schedule, Scheduler};
use crate::schema::ToolRegistry;

/// Everything a downstream consumer needs: the merged graph, the resolved common-node map,
/// the schedule, and any isolated tasks worth flagging.
#[derive(Debug, Clone)]
pub struct CompiledWorkflow {
    pub graph: Graph,
    pub node_ids: NodeIdMap,
    pub schedule: Schedule,
    pub isolated_tasks: Vec<TaskId>,
}

pub struct Compiler<'a> {
    tools: &'a ToolRegistry,
    pipeline: &'a PipelineDefinition,
}

impl<'a> Compiler<'a> {
    pub fn new(tools: &'a ToolRegistry, pipeline: &'a PipelineDefinition) -> Self {
        Self { tools, pipeline }
    }

    /// Runs every phase in order. `parameter_sets` are applied, in the given order,
    /// immediately after merging and before evaluate-commands, so their values are visible
    /// to the evaluator and the requirement check.
    pub fn compile(&self, parameter_sets: &[String]) -> Result<CompiledWorkflow> {
        let _span = info_span!("compile").entered();

        let (graph, task_args, alloc) = {
            let _span = info_span!("builder").entered();
            Builder::new(self.tools, self.pipeline).build()?
        };
        info!(tasks = graph.task_order().len(), "built per-task subgraphs");

        let (mut graph, mut node_ids, mut alloc) = {
            let _span = info_span!("merge").entered();
            Merger::new(self.tools, self.pipeline).run(graph, &task_args, alloc)?
        };
        info!(common_nodes = node_ids.len(), "merged common nodes");

        {
            let _span = info_span!("paramset").entered();
            let binder = ParameterSetBinder::new(self.tools, self.pipeline);
            for name in parameter_sets {
                binder.apply(name, &mut graph, &node_ids, &mut alloc)?;
            }
        }

        {
            let _span = info_span!("evaluate").entered();
            EvaluateBinder::new(self.pipeline).run(&mut graph, &node_ids)?;
        }

        Passes::new(self.tools, self.pipeline).run(&mut graph, &mut node_ids, &mut alloc)?;

        {
            let _span = info_span!("required").entered();
            RequirementChecker::new(self.tools, self.pipeline).run(&mut graph)?;
        }

        let schedule = {
            let _span = info_span!("schedule").entered();
            Scheduler::new(self.tools).run(&mut graph)?
        };
        info!(workflow = ?schedule.workflow, "scheduled workflow");

        let isolated_tasks = isolated_tasks(&graph);
        if !isolated_tasks.is_empty() {
            tracing::warn!(?isolated_tasks, "isolated tasks detected");
        }

        Ok(CompiledWorkflow {
            graph,
            node_ids,
            schedule,
            isolated_tasks,
        })
    }

    /// Exports the current state of a compiled workflow as a reusable parameter set.
    pub fn export_parameter_set(&self, compiled: &CompiledWorkflow, name: &str) -> Result<crate::paramset::ExportedParameterSet> {
        ParameterSetBinder::new(self.tools, self.pipeline).export(&compiled.graph, &compiled.node_ids, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{CommonNodeEntry, TaskDecl};
    use crate::schema::{ArgumentSchema, ArgumentType, ToolSchema};
    use std::collections::{BTreeSet, HashMap};

    fn tool(name: &str, out: bool) -> ToolSchema {
        let long_form = if out { "--out" } else { "--in" };
        let mut arguments = HashMap::new();
        arguments.insert(
            long_form.to_string(),
            ArgumentSchema {
                long_form: long_form.to_string(),
                short_form: None,
                description: "bam file".to_string(),
                arg_type: ArgumentType::File,
                is_input: !out,
                is_output: out,
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
            name: name.to_string(),
            description: String::new(),
            executable: name.to_string(),
            path: "/usr/bin".to_string(),
            precommand: None,
            modifier: None,
            is_hidden: false,
            argument_order: vec![long_form.to_string()],
            arguments,
        }
    }

    /// Scenario S1: a two-task chain merging under one common node compiles to `[A, B]`
    /// with one surviving option, one file node, and no deletions.
    #[test]
    fn scenario_s1_simple_chain() {
        let mut tools = ToolRegistry::new();
        tools.insert(tool("alignerA", true)).unwrap();
        tools.insert(tool("alignerB", false)).unwrap();

        let pipeline = PipelineDefinition {
            tasks: vec![
                TaskDecl { name: "A".to_string(), tool: "alignerA".to_string() },
                TaskDecl { name: "B".to_string(), tool: "alignerB".to_string() },
            ],
            common_nodes: vec![CommonNodeEntry {
                id: "alignments".to_string(),
                pairs: vec![("A".to_string(), "--out".to_string()), ("B".to_string(), "--in".to_string())],
                linked_extension: HashMap::new(),
                delete_files: false,
            }],
            ..Default::default()
        };

        let compiler = Compiler::new(&tools, &pipeline);
        let compiled = compiler.compile(&[]).unwrap();

        assert_eq!(compiled.schedule.workflow, vec!["A".to_string(), "B".to_string()]);
        assert!(compiled.schedule.deletions.is_empty());
        let survivor = compiled.node_ids["alignments"];
        assert_eq!(compiled.graph.option(survivor).unwrap().associated_file_nodes.len(), 1);
    }

    /// Scenario S2: same chain with `deleteFiles=true` schedules the bam under task B,
    /// iteration 1.
    #[test]
    fn scenario_s2_delete_files() {
        let mut tools = ToolRegistry::new();
        tools.insert(tool("alignerA", true)).unwrap();
        tools.insert(tool("alignerB", false)).unwrap();

        let mut pipeline = PipelineDefinition {
            tasks: vec![
                TaskDecl { name: "A".to_string(), tool: "alignerA".to_string() },
                TaskDecl { name: "B".to_string(), tool: "alignerB".to_string() },
            ],
            common_nodes: vec![CommonNodeEntry {
                id: "alignments".to_string(),
                pairs: vec![("A".to_string(), "--out".to_string()), ("B".to_string(), "--in".to_string())],
                linked_extension: HashMap::new(),
                delete_files: true,
            }],
            ..Default::default()
        };
        pipeline.parameter_sets.insert(
            "seed".to_string(),
            crate::pipeline::ParameterSetSpec {
                name: "seed".to_string(),
                target: crate::pipeline::ParameterSetTarget::Pipeline,
                entries: vec![crate::pipeline::ParameterSetEntry {
                    id: "alignments".to_string(),
                    argument: None,
                    values: vec!["sample.bam".to_string()],
                }],
            },
        );

        let compiler = Compiler::new(&tools, &pipeline);
        let compiled = compiler.compile(&["seed".to_string()]).unwrap();

        assert_eq!(compiled.schedule.deletions.get("B").unwrap()[&1], vec!["sample.bam".to_string()]);
    }
}
