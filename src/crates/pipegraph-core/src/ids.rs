//! Typed node identifiers.
//!
//! The original engine this crate is modeled on tags node identity inside plain strings
//! (`OPTION_3`, `OPTION_3_FILE`, `OPTION_3_FILE_2`, `CREATE_NODE_1`, ...). That scheme is
//! replaced here with a small closed set of identifier types: [`OptionId`] and [`FileId`]
//! carry their allocation counter and expansion suffix as data, not as string fragments.
//! The string form only exists for debug rendering (`Display`) and the `--visualize` CLI path.

use std::fmt;

/// A pipeline-unique task name, assigned by the pipeline definition itself (never allocated).
pub type TaskId = String;

/// Monotonically allocated identifier for an option node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OptionId(pub(crate) u64);

impl fmt::Display for OptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OPTION_{}", self.0)
    }
}

/// How a file node's identity was derived from its parent option.
///
/// Mirrors the three suffix shapes the source produces (`_FILE`, `_FILE_<k>`, `_1`),
/// but as a closed enum rather than string concatenation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileSuffix {
    /// The sole file of a non-filename-stub option (`_FILE`).
    Single,
    /// One of N siblings of a filename-stub option, 1-based (`_FILE_<n>`).
    Indexed(u32),
    /// The surviving first file after a non-stub file is folded into a stub's first slot
    /// during merge phase M4 (`_1`).
    First,
}

impl fmt::Display for FileSuffix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileSuffix::Single => write!(f, "_FILE"),
            FileSuffix::Indexed(n) => write!(f, "_FILE_{n}"),
            FileSuffix::First => write!(f, "_1"),
        }
    }
}

/// Identifier of a file node: the owning option plus its expansion suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId {
    pub option: OptionId,
    pub suffix: FileSuffix,
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.option, self.suffix)
    }
}

/// Placeholder identity for a common-node merge target that has not yet been realised
/// into a concrete [`OptionId`] (phase M1 creates these; phase M2 replaces them).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlaceholderId(pub(crate) u64);

impl fmt::Display for PlaceholderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CREATE_NODE_{}", self.0)
    }
}

/// Identity of any node in the graph: a task, an option, or a file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeId {
    Task(TaskId),
    Option(OptionId),
    File(FileId),
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Task(t) => write!(f, "{t}"),
            NodeId::Option(o) => write!(f, "{o}"),
            NodeId::File(file) => write!(f, "{file}"),
        }
    }
}

impl From<OptionId> for NodeId {
    fn from(id: OptionId) -> Self {
        NodeId::Option(id)
    }
}

impl From<FileId> for NodeId {
    fn from(id: FileId) -> Self {
        NodeId::File(id)
    }
}

/// Process-local monotonic counter backing [`OptionId`]/[`PlaceholderId`] allocation.
///
/// IDs are never recycled within a run, per the resource policy in the specification.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next_option: u64,
    next_placeholder: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_option(&mut self) -> OptionId {
        let id = OptionId(self.next_option);
        self.next_option += 1;
        id
    }

    pub fn alloc_placeholder(&mut self) -> PlaceholderId {
        let id = PlaceholderId(self.next_placeholder);
        self.next_placeholder += 1;
        id
    }
}
