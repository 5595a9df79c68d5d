//! Property tests for the universal invariants of the compiled graph (§8).
//!
//! Each property builds a randomised chain pipeline (a sequence of tasks each merged with
//! the next under one common node) and checks an invariant that must hold regardless of
//! chain length or which tasks are marked greedy.

use std::collections::HashMap;

use proptest::prelude::*;

use pipegraph_core::builder::Builder;
use pipegraph_core::graph::ValuesExt;
use pipegraph_core::merger::Merger;
use pipegraph_core::pipeline::{CommonNodeEntry, PipelineDefinition, TaskDecl};
use pipegraph_core::scheduler::Scheduler;
use pipegraph_core::schema::{ArgumentSchema, ArgumentType, ToolRegistry, ToolSchema};

fn file_argument(long_form: &str, is_input: bool) -> ArgumentSchema {
    ArgumentSchema {
        long_form: long_form.to_string(),
        short_form: None,
        description: String::new(),
        arg_type: ArgumentType::File,
        is_input,
        is_output: !is_input,
        is_required: true,
        allowed_extensions: std::iter::once(".dat".to_string()).collect(),
        is_filename_stub: false,
        filename_extensions: Vec::new(),
        allow_multiple_values: false,
        output_stream: false,
        if_output_is_stream: None,
        can_be_set_by_argument: Vec::new(),
    }
}

/// Builds a linear chain `task_0 -> task_1 -> ... -> task_{n-1}`, each pair merged under
/// its own common node, with `greedy` selecting which input arguments are greedy.
fn chain_pipeline(n: usize, greedy: &[bool]) -> (ToolRegistry, PipelineDefinition) {
    let mut tools = ToolRegistry::new();
    for i in 0..n {
        let mut arguments = HashMap::new();
        if i > 0 {
            arguments.insert("--in".to_string(), file_argument("--in", true));
        }
        if i + 1 < n {
            arguments.insert("--out".to_string(), file_argument("--out", false));
        }
        let argument_order = arguments.keys().cloned().collect();
        tools
            .insert(ToolSchema {
                name: format!("tool{i}"),
                description: String::new(),
                executable: format!("tool{i}"),
                path: "/usr/bin".to_string(),
                precommand: None,
                modifier: None,
                is_hidden: false,
                argument_order,
                arguments,
            })
            .unwrap();
    }

    let tasks = (0..n)
        .map(|i| TaskDecl { name: format!("task{i}"), tool: format!("tool{i}") })
        .collect();

    let common_nodes = (0..n.saturating_sub(1))
        .map(|i| CommonNodeEntry {
            id: format!("link{i}"),
            pairs: vec![
                (format!("task{i}"), "--out".to_string()),
                (format!("task{}", i + 1), "--in".to_string()),
            ],
            linked_extension: HashMap::new(),
            delete_files: false,
        })
        .collect();

    let greedy_arguments = (0..n.saturating_sub(1))
        .filter(|&i| greedy.get(i).copied().unwrap_or(false))
        .map(|i| (format!("task{}", i + 1), "--in".to_string()))
        .collect();

    (
        tools,
        PipelineDefinition {
            tasks,
            common_nodes,
            greedy_arguments,
            ..Default::default()
        },
    )
}

proptest! {
    /// Invariant 1: the task subgraph is acyclic and the emitted workflow is a valid
    /// topological order (each task appears after everything it depends on).
    #[test]
    fn workflow_is_a_topological_order(n in 1usize..8) {
        let (tools, pipeline) = chain_pipeline(n, &[]);
        let (graph, task_args, alloc) = Builder::new(&tools, &pipeline).build().unwrap();
        let (mut graph, _node_ids, _alloc) = Merger::new(&tools, &pipeline).run(graph, &task_args, alloc).unwrap();
        let schedule = Scheduler::new(&tools).run(&mut graph).unwrap();

        prop_assert_eq!(schedule.workflow.len(), n);
        for i in 0..n {
            let pos = schedule.workflow.iter().position(|t| t == &format!("task{i}")).unwrap();
            if i > 0 {
                let prev_pos = schedule.workflow.iter().position(|t| t == &format!("task{}", i - 1)).unwrap();
                prop_assert!(prev_pos < pos);
            }
        }
    }

    /// Invariant 2: every non-stub file option has exactly one associated file node, both
    /// before and after merging.
    #[test]
    fn non_stub_file_options_have_one_file_node(n in 1usize..8) {
        let (tools, pipeline) = chain_pipeline(n, &[]);
        let (graph, task_args, alloc) = Builder::new(&tools, &pipeline).build().unwrap();
        let (graph, _node_ids, _alloc) = Merger::new(&tools, &pipeline).run(graph, &task_args, alloc).unwrap();

        for (_, option) in graph.options() {
            if option.is_file() && !option.is_filename_stub {
                prop_assert_eq!(option.associated_file_nodes.len(), 1);
            }
        }
    }

    /// Invariant 4: each merged common node resolves to exactly one surviving option node.
    #[test]
    fn each_common_node_resolves_to_one_option(n in 2usize..8) {
        let (tools, pipeline) = chain_pipeline(n, &[]);
        let (graph, task_args, alloc) = Builder::new(&tools, &pipeline).build().unwrap();
        let (graph, node_ids, _alloc) = Merger::new(&tools, &pipeline).run(graph, &task_args, alloc).unwrap();

        for cn in &pipeline.common_nodes {
            let id = node_ids.get(&cn.id).copied().unwrap();
            prop_assert!(graph.option(id).is_some());
        }
    }

    /// Invariant 9: if any predecessor edge of a task is greedy, the task itself is greedy.
    #[test]
    fn greedy_propagates_from_edge_to_task(n in 2usize..6, greedy_first in any::<bool>()) {
        let greedy = vec![greedy_first];
        let (tools, pipeline) = chain_pipeline(n, &greedy);
        let (graph, task_args, alloc) = Builder::new(&tools, &pipeline).build().unwrap();
        let (graph, _node_ids, _alloc) = Merger::new(&tools, &pipeline).run(graph, &task_args, alloc).unwrap();

        if greedy_first {
            prop_assert!(graph.task("task1").unwrap().is_greedy);
        }
    }

    /// Invariant 6 (value-map shape): a freshly built, unpopulated graph has no dense-but-
    /// non-contiguous value maps -- every node starts with an empty (trivially dense) map.
    #[test]
    fn fresh_graph_has_dense_empty_value_maps(n in 1usize..6) {
        let (tools, pipeline) = chain_pipeline(n, &[]);
        let (graph, task_args, alloc) = Builder::new(&tools, &pipeline).build().unwrap();
        let (graph, _node_ids, _alloc) = Merger::new(&tools, &pipeline).run(graph, &task_args, alloc).unwrap();

        for (_, option) in graph.options() {
            prop_assert!(option.values.is_dense());
        }
        for (_, file) in graph.files() {
            prop_assert!(file.values.is_dense());
        }
    }
}
