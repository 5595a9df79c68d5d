//! Tool registry: per-tool argument schemas consumed by the [`crate::builder::Builder`].
//!
//! This module owns the *declarative* shape of a command-line tool — its argument
//! names, types, I/O direction, and extension constraints — but never executes
//! anything. Schema validation happens once, at load time (see [`crate::config`]).

use std::collections::{BTreeSet, HashMap};

use crate::error::{CompilerError, Result};

/// The value type carried by an argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgumentType {
    Flag,
    String,
    Integer,
    Float,
    File,
}

/// How `ifOutputIsStream` should affect command-line inclusion for a streaming output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum StreamInclusion {
    #[serde(rename = "do not include")]
    DoNotInclude,
    #[serde(rename = "include")]
    Include,
}

/// Schema of a single argument of a tool.
#[derive(Debug, Clone)]
pub struct ArgumentSchema {
    pub long_form: String,
    pub short_form: Option<String>,
    pub description: String,
    pub arg_type: ArgumentType,
    pub is_input: bool,
    pub is_output: bool,
    pub is_required: bool,
    /// Extensions a file argument accepts, each leading-dot (`.bam`).
    pub allowed_extensions: BTreeSet<String>,
    pub is_filename_stub: bool,
    /// Per-extension expansion list for a filename-stub argument, in declared order.
    pub filename_extensions: Vec<String>,
    pub allow_multiple_values: bool,
    /// Set when this argument is the one tool arguments declare as the streamed output.
    pub output_stream: bool,
    pub if_output_is_stream: Option<StreamInclusion>,
    /// Alternate argument names that can satisfy this argument's requirement (§4.7).
    pub can_be_set_by_argument: Vec<String>,
}

impl ArgumentSchema {
    pub fn is_file(&self) -> bool {
        self.arg_type == ArgumentType::File
    }
}

/// Schema of a single command-line tool.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub executable: String,
    pub path: String,
    pub precommand: Option<String>,
    pub modifier: Option<String>,
    /// Preserved for lossless round-tripping of a tool file (§10.6); unused by graph
    /// construction itself.
    pub is_hidden: bool,
    pub argument_order: Vec<String>,
    pub arguments: HashMap<String, ArgumentSchema>,
}

impl ToolSchema {
    pub fn argument(&self, long_form: &str) -> Result<&ArgumentSchema> {
        self.arguments.get(long_form).ok_or_else(|| CompilerError::Schema {
            message: format!(
                "tool '{}' has no argument '{}'",
                self.name, long_form
            ),
        })
    }

    /// The tool's unique output-stream argument, if any. At most one may be declared.
    pub fn streaming_argument(&self) -> Option<&ArgumentSchema> {
        self.arguments.values().find(|a| a.output_stream)
    }
}

/// Registry of all tools known to a compilation run.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolSchema>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tool: ToolSchema) -> Result<()> {
        if self.tools.contains_key(&tool.name) {
            return Err(CompilerError::Schema {
                message: format!("non-unique tool name: {}", tool.name),
            });
        }
        self.tools.insert(tool.name.clone(), tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&ToolSchema> {
        self.tools.get(name).ok_or_else(|| CompilerError::Schema {
            message: format!("unknown tool: {name}"),
        })
    }
}
