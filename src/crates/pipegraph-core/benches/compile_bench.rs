//! Benchmarks compilation of a linear N-task chain pipeline end to end.

use std::collections::HashMap;

use criterion::{criterion_group, criterion_main, Criterion};

use pipegraph_core::compiler::Compiler;
use pipegraph_core::pipeline::{CommonNodeEntry, PipelineDefinition, TaskDecl};
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

fn chain_pipeline(n: usize) -> (ToolRegistry, PipelineDefinition) {
    let mut tools = ToolRegistry::new();
    for i in 0..n {
        let mut arguments = HashMap::new();
        if i > 0 {
            arguments.insert("--in".to_string(), file_argument("--in", true));
        }
        if i + 1 < n {
            arguments.insert("--out".to_string(), file_argument("--out", false));
        }
        tools
            .insert(ToolSchema {
                name: format!("tool{i}"),
                description: String::new(),
                executable: format!("tool{i}"),
                path: "/usr/bin".to_string(),
                precommand: None,
                modifier: None,
                is_hidden: false,
                argument_order: arguments.keys().cloned().collect(),
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

    (tools, PipelineDefinition { tasks, common_nodes, ..Default::default() })
}

fn bench_compile(c: &mut Criterion) {
    let (tools, pipeline) = chain_pipeline(200);
    c.bench_function("compile_200_task_chain", |b| {
        b.iter(|| {
            let compiler = Compiler::new(&tools, &pipeline);
            compiler.compile(&[]).unwrap()
        })
    });
}

criterion_group!(benches, bench_compile);
criterion_main!(benches);
