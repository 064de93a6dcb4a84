//! Graph commands - load, list operations, describe operations.

use std::path::PathBuf;

use clap::Args;
use console::style;
use tfc_core::demos::{self, OperationInfo};

use super::{GlobalOptions, graph_path};

/// Arguments for the load-graph command.
#[derive(Args)]
pub struct LoadGraphArgs {
    /// GraphDef file (defaults to graph.path from config)
    graph: Option<PathBuf>,
}

/// Arguments for the graph-info command.
#[derive(Args)]
pub struct GraphInfoArgs {
    /// GraphDef file (defaults to graph.path from config)
    graph: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,
}

/// Arguments for the tensor-info command.
#[derive(Args)]
pub struct TensorInfoArgs {
    /// GraphDef file (defaults to graph.path from config)
    graph: Option<PathBuf>,

    /// Operation to describe; repeatable (defaults to the configured input and output)
    #[arg(short, long = "op")]
    ops: Vec<String>,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,
}

pub fn load(args: LoadGraphArgs, options: &GlobalOptions) -> anyhow::Result<()> {
    let config = options.load_config()?;
    let path = graph_path(args.graph.as_deref(), &config);

    let summary = demos::load_graph(&config, path)?;
    println!(
        "{} Load graph success: {} ({} bytes, {} operations)",
        style("✓").green(),
        path.display(),
        summary.bytes,
        summary.operations
    );
    Ok(())
}

pub fn info(args: GraphInfoArgs, options: &GlobalOptions) -> anyhow::Result<()> {
    let config = options.load_config()?;
    let path = graph_path(args.graph.as_deref(), &config);

    let ops = demos::graph_info(&config, path)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&ops)?);
        return Ok(());
    }

    for (pos, op) in ops.iter().enumerate() {
        println!(
            "{}: {} type: {} device: {} number inputs: {} number outputs: {}",
            pos + 1,
            style(&op.name).bold(),
            op.op_type,
            op.device,
            op.inputs.len(),
            op.outputs.len()
        );
        print_endpoints(op);
        println!();
    }
    Ok(())
}

pub fn tensor_info(args: TensorInfoArgs, options: &GlobalOptions) -> anyhow::Result<()> {
    let config = options.load_config()?;
    let path = graph_path(args.graph.as_deref(), &config);
    let ops = if args.ops.is_empty() {
        vec![config.graph.input_op.clone(), config.graph.output_op.clone()]
    } else {
        args.ops
    };

    let infos = demos::tensor_info(&config, path, &ops)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&infos)?);
        return Ok(());
    }

    for info in &infos {
        match &info.operation {
            Some(op) => {
                println!("{} {}", style("Operation:").bold(), op.name);
                print_endpoints(op);
            }
            None => println!(
                "{} Operation {} not found",
                style("!").yellow(),
                info.name
            ),
        }
        println!();
    }
    Ok(())
}

fn print_endpoints(op: &OperationInfo) {
    for input in &op.inputs {
        println!("  Input: {} type: {}", input.index, input.dtype);
    }
    for output in &op.outputs {
        match &output.shape {
            Some(shape) => println!(
                "  Output: {} type: {} dims: {} {:?}",
                output.index,
                output.dtype,
                shape.len(),
                shape
            ),
            None => println!(
                "  Output: {} type: {} dims: unknown",
                output.index, output.dtype
            ),
        }
    }
}
