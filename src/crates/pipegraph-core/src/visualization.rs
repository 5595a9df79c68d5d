//! Graph rendering for human inspection — DOT (Graphviz) and Mermaid output.
//!
//! This is a debugging aid for the `visualize` CLI subcommand, not part of the scheduling
//! algorithm: it renders whatever state the graph is in (pre- or post-merge) without
//! judging correctness.

use std::fmt::Write as _;

use crate::graph::Graph;
use crate::ids::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisualizationFormat {
    Dot,
    Mermaid,
}

pub fn visualize(graph: &Graph, format: VisualizationFormat) -> String {
    match format {
        VisualizationFormat::Dot => render_dot(graph),
        VisualizationFormat::Mermaid => render_mermaid(graph),
    }
}

fn node_label(graph: &Graph, id: &NodeId) -> String {
    match id {
        NodeId::Task(t) => t.clone(),
        NodeId::Option(oid) => graph
            .option(*oid)
            .map(|o| format!("{}\\n{}", oid, o.long_form))
            .unwrap_or_else(|| oid.to_string()),
        NodeId::File(fid) => graph
            .file(*fid)
            .map(|f| format!("{}\\n{}", fid, f.description))
            .unwrap_or_else(|| fid.to_string()),
    }
}

fn node_shape(id: &NodeId) -> &'static str {
    match id {
        NodeId::Task(_) => "box",
        NodeId::Option(_) => "ellipse",
        NodeId::File(_) => "note",
    }
}

fn all_nodes(graph: &Graph) -> Vec<NodeId> {
    let mut nodes: Vec<NodeId> = graph.task_order().iter().map(|t| NodeId::Task(t.clone())).collect();
    nodes.extend(graph.option_ids().map(NodeId::Option));
    nodes.extend(graph.file_ids().map(NodeId::File));
    nodes
}

fn all_edges(graph: &Graph) -> Vec<(NodeId, NodeId)> {
    let mut edges = Vec::new();
    for node in all_nodes(graph) {
        for succ in graph.successors(&node) {
            edges.push((node.clone(), succ.clone()));
        }
    }
    edges
}

fn render_dot(graph: &Graph) -> String {
    let mut out = String::new();
    out.push_str("digraph pipeline {\n  rankdir=LR;\n");
    for node in all_nodes(graph) {
        let id = node.to_string();
        let label = node_label(graph, &node);
        let shape = node_shape(&node);
        let _ = writeln!(out, "  \"{id}\" [label=\"{label}\", shape={shape}];");
    }
    for (from, to) in all_edges(graph) {
        let attrs = graph.edge(&from, &to);
        let style = match attrs {
            Some(a) if a.is_streaming => " [style=dashed, label=\"stream\"]",
            Some(a) if a.is_evaluate_command => " [style=dotted, label=\"evaluate\"]",
            _ => "",
        };
        let _ = writeln!(out, "  \"{from}\" -> \"{to}\"{style};");
    }
    out.push_str("}\n");
    out
}

fn render_mermaid(graph: &Graph) -> String {
    let mut out = String::from("graph LR\n");
    for node in all_nodes(graph) {
        let id = node.to_string();
        let label = node_label(graph, &node);
        let rendered = match node {
            NodeId::Task(_) => format!("    {id}[{label}]\n"),
            NodeId::Option(_) => format!("    {id}({label})\n"),
            NodeId::File(_) => format!("    {id}[({label})]\n"),
        };
        out.push_str(&rendered);
    }
    for (from, to) in all_edges(graph) {
        let attrs = graph.edge(&from, &to);
        let arrow = match attrs {
            Some(a) if a.is_streaming => "-.->|stream|",
            Some(a) if a.is_evaluate_command => "-.->|evaluate|",
            _ => "-->",
        };
        let _ = writeln!(out, "    {from} {arrow} {to}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeAttrs, FileNode, Graph, OptionNode, TaskNode, Values};
    use crate::ids::{FileId, FileSuffix, OptionId, TaskId};
    use crate::schema::ArgumentType;
    use std::collections::BTreeSet;

    fn sample_graph() -> Graph {
        let mut graph = Graph::default();
        let task: TaskId = "A".to_string();
        graph.add_task(TaskNode {
            name: task.clone(),
            tool: "aligner".to_string(),
            number_of_data_sets: 1,
            is_greedy: false,
            output_to_stream: false,
        });
        let option_id = OptionId(1);
        graph.add_option(OptionNode {
            id: option_id,
            long_form: "--out".to_string(),
            arg_type: ArgumentType::File,
            is_input: false,
            is_output: true,
            is_required: true,
            is_filename_stub: false,
            allow_multiple_values: false,
            allowed_extensions: BTreeSet::from([".bam".to_string()]),
            linked_extension: None,
            delete_files: false,
            is_constructed: false,
            is_marked_for_removal: false,
            associated_file_nodes: vec![FileId { option: option_id, suffix: FileSuffix::Single }],
            values: Values::new(),
            is_command_to_evaluate: false,
        });
        let fid = FileId { option: option_id, suffix: FileSuffix::Single };
        graph.add_file(FileNode {
            id: fid,
            description: "alignment".to_string(),
            allowed_extensions: BTreeSet::from([".bam".to_string()]),
            allow_multiple_values: false,
            values: Values::new(),
            is_streaming: false,
            is_marked_for_removal: false,
        });
        graph.add_edge(NodeId::Task(task), NodeId::File(fid), EdgeAttrs::plain("--out".to_string(), None, false));
        graph
    }

    #[test]
    fn dot_output_contains_task_and_file_nodes() {
        let graph = sample_graph();
        let dot = visualize(&graph, VisualizationFormat::Dot);
        assert!(dot.starts_with("digraph pipeline"));
        assert!(dot.contains("\"A\""));
    }

    #[test]
    fn mermaid_output_uses_arrow_syntax() {
        let graph = sample_graph();
        let mermaid = visualize(&graph, VisualizationFormat::Mermaid);
        assert!(mermaid.starts_with("graph LR"));
        assert!(mermaid.contains("-->"));
    }
}
