//! Core graph data structures: typed nodes, attributed edges, and structural queries.
//!
//! A [`Graph`] is a heterogeneous directed graph of three node kinds — [`TaskNode`],
//! [`OptionNode`], [`FileNode`] — with edges that always connect a task to an option-or-file
//! (never task-to-task or option-to-file; see invariant 4 of the specification). There is no
//! generic graph library dependency: adjacency is a pair of ordered predecessor/successor
//! lists plus an edge-attribute map, which is all topological sort needs.
//!
//! # Example
//!
//! ```
//! use pipegraph_core::graph::{Graph, TaskNode};
//!
//! let mut graph = Graph::new();
//! graph.add_task(TaskNode::new("align".to_string(), "bwa".to_string()));
//! graph.add_task(TaskNode::new("sort".to_string(), "samtools".to_string()));
//! assert_eq!(graph.task_order().len(), 2);
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::ids::{FileId, NodeId, OptionId, TaskId};
use crate::schema::{ArgumentType, StreamInclusion};

/// Per-iteration value storage: iteration number (1-based) -> ordered list of string values.
///
/// The iteration keys of a populated node must form a dense range `{1..N}` or `{1}` alone
/// (invariant 6); [`ValuesExt::is_dense`] checks this.
pub type Values = BTreeMap<u32, Vec<String>>;

/// Helpers for the per-iteration value map shared by option and file nodes.
pub trait ValuesExt {
    fn is_dense(&self) -> bool;
    fn max_iteration(&self) -> u32;
    /// Looks up values at `iteration`, falling back to iteration 1 when absent (per the
    /// "missing iteration falls back to 1" convention pinned by scenario S5).
    fn at(&self, iteration: u32) -> Option<&[String]>;
}

impl ValuesExt for Values {
    fn is_dense(&self) -> bool {
        if self.is_empty() {
            return true;
        }
        let max = *self.keys().max().unwrap();
        (1..=max).all(|k| self.contains_key(&k))
    }

    fn max_iteration(&self) -> u32 {
        self.keys().max().copied().unwrap_or(0)
    }

    fn at(&self, iteration: u32) -> Option<&[String]> {
        self.get(&iteration)
            .or_else(|| self.get(&1))
            .map(|v| v.as_slice())
    }
}

/// A task node: one invocation of a tool inside the pipeline.
#[derive(Debug, Clone)]
pub struct TaskNode {
    pub name: TaskId,
    pub tool: String,
    pub output_to_stream: bool,
    pub number_of_data_sets: u32,
    pub is_greedy: bool,
}

impl TaskNode {
    pub fn new(name: TaskId, tool: String) -> Self {
        Self {
            name,
            tool,
            output_to_stream: false,
            number_of_data_sets: 1,
            is_greedy: false,
        }
    }
}

/// An option node: a logical argument of a task (file or scalar).
#[derive(Debug, Clone)]
pub struct OptionNode {
    pub id: OptionId,
    pub long_form: String,
    pub arg_type: ArgumentType,
    pub is_input: bool,
    pub is_output: bool,
    pub is_required: bool,
    pub is_filename_stub: bool,
    pub allow_multiple_values: bool,
    pub allowed_extensions: BTreeSet<String>,
    pub linked_extension: Option<String>,
    pub delete_files: bool,
    /// Set for option nodes synthesized outside the Builder (additional nodes, parameter
    /// sets, placeholders materialised in merge phase M2).
    pub is_constructed: bool,
    pub is_marked_for_removal: bool,
    /// File-node children, in expansion order (invariant 1/2).
    pub associated_file_nodes: Vec<FileId>,
    pub values: Values,
    pub is_command_to_evaluate: bool,
}

impl OptionNode {
    pub fn is_file(&self) -> bool {
        self.arg_type == ArgumentType::File
    }
}

/// A file node: a concrete file (or stream) bound to an option.
#[derive(Debug, Clone)]
pub struct FileNode {
    pub id: FileId,
    pub description: String,
    pub allowed_extensions: BTreeSet<String>,
    pub allow_multiple_values: bool,
    pub values: Values,
    pub is_streaming: bool,
    pub is_marked_for_removal: bool,
}

/// Attributes carried by a directed task<->option-or-file edge.
#[derive(Debug, Clone)]
pub struct EdgeAttrs {
    pub long_form_argument: String,
    pub short_form_argument: Option<String>,
    pub is_input: bool,
    pub is_output: bool,
    pub is_greedy: bool,
    pub is_streaming: bool,
    pub is_filename_stub: bool,
    pub include_on_command_line: bool,
    pub if_output_is_stream: Option<StreamInclusion>,
    pub is_originating_edge: bool,
    pub is_evaluate_command: bool,
}

impl EdgeAttrs {
    /// A plain edge for a non-stub, non-streaming, always-included argument; callers
    /// override individual fields for the special cases (stub, streaming, originating).
    pub fn plain(long_form_argument: String, short_form_argument: Option<String>, is_input: bool) -> Self {
        Self {
            long_form_argument,
            short_form_argument,
            is_input,
            is_output: !is_input,
            is_greedy: false,
            is_streaming: false,
            is_filename_stub: false,
            include_on_command_line: true,
            if_output_is_stream: None,
            is_originating_edge: false,
            is_evaluate_command: false,
        }
    }
}

/// The merged, attributed graph of task/option/file nodes built by [`crate::builder::Builder`]
/// and [`crate::merger::Merger`].
#[derive(Debug, Clone, Default)]
pub struct Graph {
    tasks: HashMap<TaskId, TaskNode>,
    options: HashMap<OptionId, OptionNode>,
    files: HashMap<FileId, FileNode>,
    /// Declaration order of tasks, preserved independently of the `HashMap` above so that
    /// iteration order matches the pipeline definition (§5 ordering guarantees).
    task_order: Vec<TaskId>,
    predecessors: HashMap<NodeId, Vec<NodeId>>,
    successors: HashMap<NodeId, Vec<NodeId>>,
    edges: HashMap<(NodeId, NodeId), EdgeAttrs>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- construction ----

    pub fn add_task(&mut self, node: TaskNode) {
        if !self.tasks.contains_key(&node.name) {
            self.task_order.push(node.name.clone());
        }
        self.tasks.insert(node.name.clone(), node);
    }

    pub fn add_option(&mut self, node: OptionNode) {
        self.options.insert(node.id, node);
    }

    pub fn add_file(&mut self, node: FileNode) {
        self.files.insert(node.id, node);
    }

    /// Adds a directed edge `from -> to`, appending to the adjacency lists. Each ordered
    /// pair carries at most one edge in this graph (an option/file serves one argument per
    /// task), so repeated calls for the same pair overwrite the attributes rather than
    /// duplicating the adjacency entry.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId, attrs: EdgeAttrs) {
        let key = (from.clone(), to.clone());
        if !self.edges.contains_key(&key) {
            self.successors.entry(from.clone()).or_default().push(to.clone());
            self.predecessors.entry(to.clone()).or_default().push(from.clone());
        }
        self.edges.insert(key, attrs);
    }

    pub fn remove_edge(&mut self, from: &NodeId, to: &NodeId) {
        self.edges.remove(&(from.clone(), to.clone()));
        if let Some(v) = self.successors.get_mut(from) {
            v.retain(|n| n != to);
        }
        if let Some(v) = self.predecessors.get_mut(to) {
            v.retain(|n| n != from);
        }
    }

    // ---- node accessors ----

    pub fn task(&self, id: &str) -> Option<&TaskNode> {
        self.tasks.get(id)
    }

    pub fn task_mut(&mut self, id: &str) -> Option<&mut TaskNode> {
        self.tasks.get_mut(id)
    }

    pub fn option(&self, id: OptionId) -> Option<&OptionNode> {
        self.options.get(&id)
    }

    pub fn option_mut(&mut self, id: OptionId) -> Option<&mut OptionNode> {
        self.options.get_mut(&id)
    }

    pub fn file(&self, id: FileId) -> Option<&FileNode> {
        self.files.get(&id)
    }

    pub fn file_mut(&mut self, id: FileId) -> Option<&mut FileNode> {
        self.files.get_mut(&id)
    }

    pub fn task_order(&self) -> &[TaskId] {
        &self.task_order
    }

    pub fn option_ids(&self) -> impl Iterator<Item = OptionId> + '_ {
        self.options.keys().copied()
    }

    pub fn file_ids(&self) -> impl Iterator<Item = FileId> + '_ {
        self.files.keys().copied()
    }

    pub fn options(&self) -> impl Iterator<Item = (&OptionId, &OptionNode)> {
        self.options.iter()
    }

    pub fn files(&self) -> impl Iterator<Item = (&FileId, &FileNode)> {
        self.files.iter()
    }

    // ---- structural queries ----

    pub fn predecessors(&self, id: &NodeId) -> &[NodeId] {
        self.predecessors.get(id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn successors(&self, id: &NodeId) -> &[NodeId] {
        self.successors.get(id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn edge(&self, from: &NodeId, to: &NodeId) -> Option<&EdgeAttrs> {
        self.edges.get(&(from.clone(), to.clone()))
    }

    pub fn edge_mut(&mut self, from: &NodeId, to: &NodeId) -> Option<&mut EdgeAttrs> {
        self.edges.get_mut(&(from.clone(), to.clone()))
    }

    /// Predecessors of `id` through edges that carry a real scheduling dependency, excluding
    /// evaluate-command provenance edges (§4.5): those document where a rendered value came
    /// from but must never make their target look dependent on, or their source look
    /// consumed by, the other end for ordering/dataset-count/deletion purposes.
    pub fn scheduling_predecessors(&self, id: &NodeId) -> Vec<NodeId> {
        self.predecessors(id)
            .iter()
            .filter(|p| !self.edge(p, id).map(|e| e.is_evaluate_command).unwrap_or(false))
            .cloned()
            .collect()
    }

    /// Successors of `id` through edges that carry a real scheduling dependency; see
    /// [`Graph::scheduling_predecessors`].
    pub fn scheduling_successors(&self, id: &NodeId) -> Vec<NodeId> {
        self.successors(id)
            .iter()
            .filter(|s| !self.edge(id, s).map(|e| e.is_evaluate_command).unwrap_or(false))
            .cloned()
            .collect()
    }

    /// Predecessor task nodes of `task`, reached through its input option/file nodes.
    pub fn predecessor_tasks(&self, task: &str) -> Vec<TaskId> {
        let mut out = Vec::new();
        for pred in self.scheduling_predecessors(&NodeId::Task(task.to_string())) {
            for grandpred in self.scheduling_predecessors(&pred) {
                if let NodeId::Task(t) = grandpred {
                    if !out.contains(&t) {
                        out.push(t);
                    }
                }
            }
        }
        out
    }

    /// Successor task nodes of `task`, reached through its output option/file nodes.
    pub fn successor_tasks(&self, task: &str) -> Vec<TaskId> {
        let mut out = Vec::new();
        for succ in self.scheduling_successors(&NodeId::Task(task.to_string())) {
            for grandsucc in self.scheduling_successors(&succ) {
                if let NodeId::Task(t) = grandsucc {
                    if !out.contains(&t) {
                        out.push(t);
                    }
                }
            }
        }
        out
    }

    /// Removes an option node and all its associated file nodes, purging every incident
    /// edge. Invariant 3 requires callers to have already marked both for removal before
    /// the purge step runs; this method performs the actual deletion.
    pub fn purge_option(&mut self, id: OptionId) {
        if let Some(opt) = self.options.remove(&id) {
            for file_id in opt.associated_file_nodes {
                self.purge_file(file_id);
            }
        }
        self.purge_node(&NodeId::Option(id));
    }

    pub fn purge_file(&mut self, id: FileId) {
        self.files.remove(&id);
        self.purge_node(&NodeId::File(id));
    }

    /// Re-keys a file node from `old` to `new`, carrying its data and every incident edge
    /// along with it. Used by the merger when a non-stub merge target is converted into a
    /// stub's first slot (`_FILE` -> `_1`, §4.2 phase M4's no/yes case).
    pub fn rename_file(&mut self, old: FileId, new: FileId) {
        if old == new {
            return;
        }
        let mut node = self.files.remove(&old).expect("rename_file: source file missing");
        node.id = new;
        self.files.insert(new, node);

        let old_id = NodeId::File(old);
        let new_id = NodeId::File(new);

        if let Some(preds) = self.predecessors.remove(&old_id) {
            for p in &preds {
                if let Some(attrs) = self.edges.remove(&(p.clone(), old_id.clone())) {
                    self.edges.insert((p.clone(), new_id.clone()), attrs);
                }
                if let Some(v) = self.successors.get_mut(p) {
                    for n in v.iter_mut() {
                        if *n == old_id {
                            *n = new_id.clone();
                        }
                    }
                }
            }
            self.predecessors.insert(new_id.clone(), preds);
        }
        if let Some(succs) = self.successors.remove(&old_id) {
            for s in &succs {
                if let Some(attrs) = self.edges.remove(&(old_id.clone(), s.clone())) {
                    self.edges.insert((new_id.clone(), s.clone()), attrs);
                }
                if let Some(v) = self.predecessors.get_mut(s) {
                    for n in v.iter_mut() {
                        if *n == old_id {
                            *n = new_id.clone();
                        }
                    }
                }
            }
            self.successors.insert(new_id.clone(), succs);
        }
    }

    fn purge_node(&mut self, id: &NodeId) {
        let preds = self.predecessors.remove(id).unwrap_or_default();
        let succs = self.successors.remove(id).unwrap_or_default();
        for p in &preds {
            self.edges.remove(&(p.clone(), id.clone()));
            if let Some(v) = self.successors.get_mut(p) {
                v.retain(|n| n != id);
            }
        }
        for s in &succs {
            self.edges.remove(&(id.clone(), s.clone()));
            if let Some(v) = self.predecessors.get_mut(s) {
                v.retain(|n| n != id);
            }
        }
    }

    /// Topological sort restricted to task nodes, ignoring option/file nodes in between.
    /// Returns an error describing a cycle if the task subgraph is not acyclic
    /// (invariant 5).
    pub fn topological_task_order(&self) -> crate::error::Result<Vec<TaskId>> {
        let mut in_degree: HashMap<&str, usize> = self
            .task_order
            .iter()
            .map(|t| (t.as_str(), 0usize))
            .collect();
        for t in &self.task_order {
            for _pred in self.predecessor_tasks(t) {
                *in_degree.get_mut(t.as_str()).unwrap() += 1;
            }
        }

        let mut ready: Vec<&str> = self
            .task_order
            .iter()
            .map(|s| s.as_str())
            .filter(|t| in_degree[t] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.task_order.len());
        let mut visited = 0usize;

        while let Some(t) = ready.first().copied() {
            ready.remove(0);
            order.push(t.to_string());
            visited += 1;
            for succ in self.successor_tasks(t) {
                let entry = in_degree.get_mut(succ.as_str()).unwrap();
                *entry -= 1;
                if *entry == 0 {
                    ready.push(succ.as_str());
                    // keep ready sorted by declared task order for determinism
                    ready.sort_by_key(|name| {
                        self.task_order.iter().position(|t| t == name).unwrap()
                    });
                }
            }
        }

        if visited != self.task_order.len() {
            return Err(crate::error::CompilerError::Structural {
                node: NodeId::Task(self.task_order[0].clone()),
                message: "task subgraph contains a cycle".to_string(),
            });
        }
        Ok(order)
    }
}
