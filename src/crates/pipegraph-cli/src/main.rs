//! # pipegraph-cli
//!
//! CLI front-end for the pipeline graph compiler.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use pipegraph_core::compiler::Compiler;
use pipegraph_core::config;
use pipegraph_core::visualization::{visualize, VisualizationFormat};

#[derive(Parser)]
#[command(name = "pipegraph")]
#[command(about = "Compiles multi-tool pipeline definitions into scheduled task workflows", long_about = None)]
#[command(version)]
struct Cli {
    /// Raise the tracing subscriber's filter level for this run.
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full compiler (Builder -> Merger -> binders -> Scheduler) and print the result as JSON.
    Compile {
        #[arg(long)]
        tools: PathBuf,
        #[arg(long)]
        pipeline: PathBuf,
        /// Named parameter set(s) to apply, in order, after merging.
        #[arg(long = "parameter-set")]
        parameter_sets: Vec<String>,
        /// Export the final argument values under this name instead of printing the workflow.
        #[arg(long)]
        export_parameter_set: Option<String>,
    },

    /// Run schema loading, the Builder, the Merger, and required-argument verification only.
    Validate {
        #[arg(long)]
        tools: PathBuf,
        #[arg(long)]
        pipeline: PathBuf,
    },

    /// Render the merged graph as DOT or Mermaid for human inspection.
    Visualize {
        #[arg(long)]
        tools: PathBuf,
        #[arg(long)]
        pipeline: PathBuf,
        #[arg(long, default_value = "dot")]
        format: String,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .try_init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Compile {
            tools,
            pipeline,
            parameter_sets,
            export_parameter_set,
        } => compile(&tools, &pipeline, &parameter_sets, export_parameter_set.as_deref()),
        Commands::Validate { tools, pipeline } => validate(&tools, &pipeline),
        Commands::Visualize { tools, pipeline, format } => visualize_cmd(&tools, &pipeline, &format),
    }
}

fn compile(
    tools_path: &PathBuf,
    pipeline_path: &PathBuf,
    parameter_sets: &[String],
    export_name: Option<&str>,
) -> anyhow::Result<()> {
    let tools = config::load_tool_registry(tools_path)?;
    let pipeline = config::load_pipeline(pipeline_path)?;
    let compiler = Compiler::new(&tools, &pipeline);
    let compiled = compiler.compile(parameter_sets)?;

    if let Some(name) = export_name {
        let exported = compiler.export_parameter_set(&compiled, name)?;
        println!(
            "{}",
            serde_json::json!({
                "name": exported.name,
                "entries": exported.entries.iter().map(|e| serde_json::json!({
                    "ID": e.id,
                    "argument": e.argument,
                    "values": e.values,
                })).collect::<Vec<_>>(),
            })
        );
        return Ok(());
    }

    if !compiled.isolated_tasks.is_empty() {
        eprintln!("warning: isolated tasks detected: {:?}", compiled.isolated_tasks);
    }

    println!(
        "{}",
        serde_json::json!({
            "workflow": compiled.schedule.workflow,
            "dependencies": compiled.schedule.dependencies,
            "outputs": compiled.schedule.outputs,
            "deletions": compiled.schedule.deletions,
        })
    );
    Ok(())
}

fn validate(tools_path: &PathBuf, pipeline_path: &PathBuf) -> anyhow::Result<()> {
    use pipegraph_core::builder::Builder;
    use pipegraph_core::merger::Merger;
    use pipegraph_core::required::RequirementChecker;

    let tools = config::load_tool_registry(tools_path)?;
    let pipeline = config::load_pipeline(pipeline_path)?;

    let (graph, task_args, alloc) = Builder::new(&tools, &pipeline).build()?;
    let (mut graph, _node_ids, _alloc) = Merger::new(&tools, &pipeline).run(graph, &task_args, alloc)?;
    RequirementChecker::new(&tools, &pipeline).run(&mut graph)?;

    println!("pipeline is valid");
    Ok(())
}

fn visualize_cmd(tools_path: &PathBuf, pipeline_path: &PathBuf, format: &str) -> anyhow::Result<()> {
    use pipegraph_core::builder::Builder;
    use pipegraph_core::merger::Merger;

    let tools = config::load_tool_registry(tools_path)?;
    let pipeline = config::load_pipeline(pipeline_path)?;

    let (graph, task_args, alloc) = Builder::new(&tools, &pipeline).build()?;
    let (graph, _node_ids, _alloc) = Merger::new(&tools, &pipeline).run(graph, &task_args, alloc)?;

    let fmt = match format {
        "mermaid" => VisualizationFormat::Mermaid,
        "dot" => VisualizationFormat::Dot,
        other => anyhow::bail!("unknown visualization format '{other}' (expected 'dot' or 'mermaid')"),
    };
    println!("{}", visualize(&graph, fmt));
    Ok(())
}
