//! Exercises the JSON-loading path end to end: tool file + pipeline file on disk ->
//! `ToolRegistry`/`PipelineDefinition` -> full compilation.

use std::io::Write;

use pipegraph_core::compiler::Compiler;
use pipegraph_core::config;

fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
    let mut path = std::env::temp_dir();
    path.push(name);
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    path
}

#[test]
fn loads_and_compiles_a_two_task_pipeline_from_json() {
    let tools_path = write_temp(
        "pipegraph_integration_tools.json",
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
                            "allowedExtensions": [".bam"]
                        }
                    }
                },
                "sorter": {
                    "description": "sorts alignments",
                    "executable": "sorter",
                    "path": "/usr/bin",
                    "arguments": {
                        "--in": {
                            "description": "alignment input",
                            "type": "file",
                            "isInput": true,
                            "isOutput": false,
                            "isRequired": true,
                            "allowedExtensions": [".bam"]
                        }
                    }
                }
            }
        }"#,
    );

    let pipeline_path = write_temp(
        "pipegraph_integration_pipeline.json",
        r#"{
            "tasks": {"A": "aligner", "B": "sorter"},
            "nodes": [
                {"ID": "alignments", "tasks": [["A", "--out"], ["B", "--in"]]}
            ]
        }"#,
    );

    let tools = config::load_tool_registry(&tools_path).unwrap();
    let pipeline = config::load_pipeline(&pipeline_path).unwrap();

    let compiler = Compiler::new(&tools, &pipeline);
    let compiled = compiler.compile(&[]).unwrap();

    assert_eq!(compiled.schedule.workflow, vec!["A".to_string(), "B".to_string()]);

    std::fs::remove_file(tools_path).ok();
    std::fs::remove_file(pipeline_path).ok();
}
