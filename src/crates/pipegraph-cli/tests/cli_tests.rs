//! End-to-end tests for the `pipegraph` binary: writes tool/pipeline schema files to a temp
//! directory and runs the compiled binary against them, checking stdout/exit status.

use std::io::Write;
use std::process::Command;

use tempfile::TempDir;

fn write(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    path
}

fn tools_fixture(dir: &TempDir) -> std::path::PathBuf {
    write(
        dir,
        "tools.json",
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
    )
}

fn pipeline_fixture(dir: &TempDir) -> std::path::PathBuf {
    write(
        dir,
        "pipeline.json",
        r#"{
            "tasks": {"A": "aligner", "B": "sorter"},
            "nodes": [
                {"ID": "alignments", "tasks": [["A", "--out"], ["B", "--in"]]}
            ]
        }"#,
    )
}

fn bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_pipegraph"))
}

#[test]
fn compile_prints_workflow_json() {
    let dir = TempDir::new().unwrap();
    let tools = tools_fixture(&dir);
    let pipeline = pipeline_fixture(&dir);

    let output = bin()
        .args(["compile", "--tools"])
        .arg(&tools)
        .arg("--pipeline")
        .arg(&pipeline)
        .output()
        .unwrap();

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8(output.stdout).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed["workflow"], serde_json::json!(["A", "B"]));
}

#[test]
fn validate_accepts_a_well_formed_pipeline() {
    let dir = TempDir::new().unwrap();
    let tools = tools_fixture(&dir);
    let pipeline = pipeline_fixture(&dir);

    let output = bin()
        .args(["validate", "--tools"])
        .arg(&tools)
        .arg("--pipeline")
        .arg(&pipeline)
        .output()
        .unwrap();

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("valid"));
}

#[test]
fn validate_rejects_a_missing_required_argument() {
    let dir = TempDir::new().unwrap();
    let tools = tools_fixture(&dir);
    let pipeline = write(
        &dir,
        "pipeline.json",
        r#"{
            "tasks": {"A": "aligner", "B": "sorter"},
            "nodes": []
        }"#,
    );

    let output = bin()
        .args(["validate", "--tools"])
        .arg(&tools)
        .arg("--pipeline")
        .arg(&pipeline)
        .output()
        .unwrap();

    assert!(!output.status.success());
}

#[test]
fn visualize_emits_dot_digraph() {
    let dir = TempDir::new().unwrap();
    let tools = tools_fixture(&dir);
    let pipeline = pipeline_fixture(&dir);

    let output = bin()
        .args(["visualize", "--tools"])
        .arg(&tools)
        .arg("--pipeline")
        .arg(&pipeline)
        .args(["--format", "dot"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("digraph"));
}

#[test]
fn visualize_rejects_unknown_format() {
    let dir = TempDir::new().unwrap();
    let tools = tools_fixture(&dir);
    let pipeline = pipeline_fixture(&dir);

    let output = bin()
        .args(["visualize", "--tools"])
        .arg(&tools)
        .arg("--pipeline")
        .arg(&pipeline)
        .args(["--format", "svg"])
        .output()
        .unwrap();

    assert!(!output.status.success());
}
