//! On-disk loading of tool schemas, pipeline schemas, and parameter-set files (§10.1).
//!
//! The on-disk shapes mirror the external interfaces of §6 field-for-field and are
//! deserialized directly, then validated and lowered into the core [`crate::schema`] and
//! [`crate::pipeline`] types. JSON and YAML are both accepted, the way this workspace's
//! graph definitions already accept either encoding.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CompilerError, Result};
use crate::pipeline::{
    AdditionalNodeSpec, CommonNodeEntry, EvaluateCommandSpec, OriginatingEdgeSpec, ParameterSetEntry,
    ParameterSetSpec, ParameterSetTarget, PipelineDefinition, TaskDecl, UnassignedArgument,
};
use crate::schema::{ArgumentSchema, ArgumentType, StreamInclusion, ToolRegistry, ToolSchema};

/// On-disk tool-schema file: `{tools: {name: {..., arguments: {longForm: {...}}}}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolFile {
    pub tools: HashMap<String, ToolFileEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolFileEntry {
    pub description: String,
    pub executable: String,
    pub path: String,
    #[serde(default)]
    pub precommand: Option<String>,
    #[serde(default)]
    pub modifier: Option<String>,
    #[serde(default, rename = "isHidden")]
    pub is_hidden: bool,
    #[serde(default, rename = "argumentOrder")]
    pub argument_order: Vec<String>,
    pub arguments: HashMap<String, ArgumentFileEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArgumentFileEntry {
    #[serde(default, rename = "shortForm")]
    pub short_form: Option<String>,
    pub description: String,
    #[serde(rename = "type")]
    pub arg_type: ArgumentType,
    #[serde(rename = "isInput")]
    pub is_input: bool,
    #[serde(rename = "isOutput")]
    pub is_output: bool,
    #[serde(rename = "isRequired")]
    pub is_required: bool,
    /// Either a plain list, or a single `|`-joined string (normalized at load time, not here).
    #[serde(default, rename = "allowedExtensions")]
    pub allowed_extensions: ExtensionList,
    #[serde(default, rename = "isFilenameStub")]
    pub is_filename_stub: bool,
    #[serde(default, rename = "filenameExtensions")]
    pub filename_extensions: Vec<String>,
    #[serde(default, rename = "allowMultipleValues")]
    pub allow_multiple_values: bool,
    #[serde(default, rename = "outputStream")]
    pub output_stream: bool,
    #[serde(default, rename = "ifOutputIsStream")]
    pub if_output_is_stream: Option<StreamInclusion>,
    #[serde(default, rename = "canBeSetByArgument")]
    pub can_be_set_by_argument: Vec<String>,
}

/// Accepts either a JSON array of extensions or a single `|`-joined string, the way the
/// original configuration reader did (`toolAttributes.py`'s `'|' in extension` check).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtensionList {
    Joined(String),
    List(Vec<String>),
}

impl Default for ExtensionList {
    fn default() -> Self {
        ExtensionList::List(Vec::new())
    }
}

impl ExtensionList {
    fn into_vec(self) -> Vec<String> {
        match self {
            ExtensionList::Joined(s) if s.is_empty() => Vec::new(),
            ExtensionList::Joined(s) => s.split('|').map(str::to_string).collect(),
            ExtensionList::List(v) => v,
        }
    }
}

/// On-disk pipeline-schema file (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineFile {
    pub tasks: HashMap<String, String>,
    #[serde(default)]
    pub nodes: Vec<CommonNodeFileEntry>,
    #[serde(default, rename = "originatingEdges")]
    pub originating_edges: Vec<OriginatingEdgeFileEntry>,
    #[serde(default, rename = "greedyTasks")]
    pub greedy_tasks: Vec<TaskArgumentFileEntry>,
    #[serde(default, rename = "tasksOutputtingToStream")]
    pub tasks_outputting_to_stream: Vec<String>,
    #[serde(default, rename = "additionalNodes")]
    pub additional_nodes: Vec<AdditionalNodeFileEntry>,
    #[serde(default, rename = "unassignedArguments")]
    pub unassigned_arguments: Vec<UnassignedArgumentFileEntry>,
    #[serde(default, rename = "pipelineArguments")]
    pub pipeline_arguments: HashMap<String, String>,
    #[serde(default, rename = "evaluateCommands")]
    pub evaluate_commands: Vec<EvaluateCommandFileEntry>,
    #[serde(default, rename = "parameterSets")]
    pub parameter_sets: HashMap<String, ParameterSetFileEntry>,
}

/// A `(task, argument)` reference as it appears on disk: a 2-element JSON array, not an
/// object, matching §6's `[task, argument]` notation.
pub type TaskArgumentFileEntry = (String, String);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommonNodeFileEntry {
    #[serde(rename = "ID")]
    pub id: String,
    pub tasks: Vec<TaskArgumentFileEntry>,
    #[serde(default, rename = "linkedExtension")]
    pub linked_extension: HashMap<String, HashMap<String, String>>,
    #[serde(default, rename = "deleteFiles")]
    pub delete_files: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginatingEdgeFileEntry {
    pub source: TaskArgumentFileEntry,
    pub target: TaskArgumentFileEntry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdditionalNodeFileEntry {
    #[serde(rename = "ID")]
    pub id: String,
    pub tasks: Vec<TaskArgumentFileEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnassignedArgumentFileEntry {
    #[serde(rename = "pipelineArgument")]
    pub pipeline_argument: String,
    #[serde(rename = "additionalNodeID")]
    pub additional_node_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateCommandFileEntry {
    pub target: TaskArgumentFileEntry,
    pub template: String,
    pub sources: HashMap<String, TaskArgumentFileEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterSetFileTarget {
    Pipeline(PipelineMarker),
    Tool { tool: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineMarker {
    pub pipeline: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSetFileEntry {
    #[serde(default)]
    pub target: Option<ParameterSetFileTarget>,
    pub entries: Vec<ParameterSetEntryFileEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSetEntryFileEntry {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(default)]
    pub argument: Option<String>,
    /// Coerced to strings regardless of native JSON scalar type, matching the original's
    /// `str(value)` parameter-set reader.
    pub values: Vec<serde_json::Value>,
}

fn json_value_to_string(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Loads a tool-schema document (JSON or YAML, chosen by extension) into a [`ToolRegistry`].
pub fn load_tool_registry(path: impl AsRef<Path>) -> Result<ToolRegistry> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let file: ToolFile = parse_by_extension(path, &content)?;

    let mut registry = ToolRegistry::new();
    for (name, entry) in file.tools {
        let mut arguments = HashMap::new();
        for (long_form, arg) in entry.arguments {
            arguments.insert(
                long_form.clone(),
                ArgumentSchema {
                    long_form: long_form.clone(),
                    short_form: arg.short_form,
                    description: arg.description,
                    arg_type: arg.arg_type,
                    is_input: arg.is_input,
                    is_output: arg.is_output,
                    is_required: arg.is_required,
                    allowed_extensions: arg.allowed_extensions.into_vec().into_iter().collect(),
                    is_filename_stub: arg.is_filename_stub,
                    filename_extensions: arg.filename_extensions,
                    allow_multiple_values: arg.allow_multiple_values,
                    output_stream: arg.output_stream,
                    if_output_is_stream: arg.if_output_is_stream,
                    can_be_set_by_argument: arg.can_be_set_by_argument,
                },
            );
        }
        registry.insert(ToolSchema {
            name: name.clone(),
            description: entry.description,
            executable: entry.executable,
            path: entry.path,
            precommand: entry.precommand,
            modifier: entry.modifier,
            is_hidden: entry.is_hidden,
            argument_order: entry.argument_order,
            arguments,
        })?;
    }
    Ok(registry)
}

/// Loads a pipeline-schema document into a [`PipelineDefinition`].
pub fn load_pipeline(path: impl AsRef<Path>) -> Result<PipelineDefinition> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let file: PipelineFile = parse_by_extension(path, &content)?;

    let pair = |e: &TaskArgumentFileEntry| e.clone();

    Ok(PipelineDefinition {
        tasks: file
            .tasks
            .into_iter()
            .map(|(name, tool)| TaskDecl { name, tool })
            .collect(),
        common_nodes: file
            .nodes
            .into_iter()
            .map(|n| CommonNodeEntry {
                id: n.id,
                pairs: n.tasks.iter().map(pair).collect(),
                linked_extension: n
                    .linked_extension
                    .into_iter()
                    .flat_map(|(task, by_arg)| {
                        by_arg.into_iter().map(move |(arg, ext)| ((task.clone(), arg), ext))
                    })
                    .collect(),
                delete_files: n.delete_files,
            })
            .collect(),
        originating_edges: file
            .originating_edges
            .iter()
            .map(|e| OriginatingEdgeSpec {
                source: pair(&e.source),
                target: pair(&e.target),
            })
            .collect(),
        greedy_arguments: file.greedy_tasks.iter().map(pair).collect(),
        tasks_outputting_to_stream: file.tasks_outputting_to_stream,
        additional_nodes: file
            .additional_nodes
            .into_iter()
            .map(|n| AdditionalNodeSpec {
                id: n.id,
                pairs: n.tasks.iter().map(pair).collect(),
            })
            .collect(),
        unassigned_arguments: file
            .unassigned_arguments
            .into_iter()
            .map(|u| UnassignedArgument {
                pipeline_argument: u.pipeline_argument,
                additional_node_id: u.additional_node_id,
            })
            .collect(),
        pipeline_arguments: file.pipeline_arguments,
        evaluate_commands: file
            .evaluate_commands
            .into_iter()
            .map(|e| EvaluateCommandSpec {
                target: pair(&e.target),
                template: e.template,
                sources: e.sources.into_iter().map(|(id, t)| (id, pair(&t))).collect(),
            })
            .collect(),
        parameter_sets: file
            .parameter_sets
            .into_iter()
            .map(|(name, spec)| {
                let target = match spec.target {
                    Some(ParameterSetFileTarget::Tool { tool }) => ParameterSetTarget::Tool(tool),
                    _ => ParameterSetTarget::Pipeline,
                };
                (
                    name.clone(),
                    ParameterSetSpec {
                        name,
                        target,
                        entries: spec
                            .entries
                            .into_iter()
                            .map(|e| ParameterSetEntry {
                                id: e.id,
                                argument: e.argument,
                                values: e.values.iter().map(json_value_to_string).collect(),
                            })
                            .collect(),
                    },
                )
            })
            .collect(),
    })
}

/// Loads a standalone parameter-set file (outside a pipeline document's `parameterSets` map)
/// and returns it under `name`, ready for [`crate::paramset::ParameterSetBinder::apply`].
pub fn load_parameter_set(path: impl AsRef<Path>, name: &str) -> Result<ParameterSetSpec> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let file: ParameterSetFileEntry = parse_by_extension(path, &content)?;

    let target = match file.target {
        Some(ParameterSetFileTarget::Tool { tool }) => ParameterSetTarget::Tool(tool),
        _ => ParameterSetTarget::Pipeline,
    };
    Ok(ParameterSetSpec {
        name: name.to_string(),
        target,
        entries: file
            .entries
            .into_iter()
            .map(|e| ParameterSetEntry {
                id: e.id,
                argument: e.argument,
                values: e.values.iter().map(json_value_to_string).collect(),
            })
            .collect(),
    })
}

fn parse_by_extension<T: for<'de> Deserialize<'de>>(path: &Path, content: &str) -> Result<T> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(content)?),
        _ => Ok(serde_json::from_str(content).or_else(|json_err| {
            serde_yaml::from_str(content).map_err(|_| CompilerError::Io(json_err.to_string()))
        })?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_tool_file_with_joined_extensions() {
        let path = write_temp(
            "pipegraph_tool_test.json",
            r#"{
                "tools": {
                    "aligner": {
                        "description": "aligns reads",
                        "executable": "aligner",
                        "path": "/usr/bin",
                        "arguments": {
                            "--out": {
                                "description": "alignment output",
                                "type": "file",
                                "isInput": false,
                                "isOutput": true,
                                "isRequired": true,
                                "allowedExtensions": ".bam|.sam"
                            }
                        }
                    }
                }
            }"#,
        );

        let registry = load_tool_registry(&path).unwrap();
        let tool = registry.get("aligner").unwrap();
        let arg = tool.argument("--out").unwrap();
        assert_eq!(arg.allowed_extensions.len(), 2);
        assert!(arg.allowed_extensions.contains(".bam"));
        assert!(arg.allowed_extensions.contains(".sam"));

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn parameter_set_values_are_coerced_to_strings() {
        let path = write_temp(
            "pipegraph_paramset_test.json",
            r#"{"entries": [{"ID": "threads", "values": [4, "8"]}]}"#,
        );

        let spec = load_parameter_set(&path, "seed").unwrap();
        assert_eq!(spec.entries[0].values, vec!["4".to_string(), "8".to_string()]);

        std::fs::remove_file(path).ok();
    }
}
