//! Run command - feed the input tensor through a session.

use std::path::PathBuf;

use clap::Args;
use tfc_core::demos;

use super::{GlobalOptions, graph_path};

/// Arguments for the run command.
#[derive(Args)]
pub struct RunArgs {
    /// GraphDef file (defaults to graph.path from config)
    graph: Option<PathBuf>,

    /// Input operation name
    #[arg(long)]
    input_op: Option<String>,

    /// Output operation name
    #[arg(long)]
    output_op: Option<String>,

    /// Number of output values to print
    #[arg(short = 'n', long, default_value_t = 4)]
    count: usize,
}

pub fn run(args: RunArgs, options: &GlobalOptions) -> anyhow::Result<()> {
    let mut config = options.load_config()?;
    if let Some(input_op) = args.input_op {
        config.graph.input_op = input_op;
    }
    if let Some(output_op) = args.output_op {
        config.graph.output_op = output_op;
    }
    let path = graph_path(args.graph.as_deref(), &config);

    let output = demos::session_run(&config, path)?;
    let shown: Vec<String> = output
        .values
        .iter()
        .take(args.count)
        .map(|v| v.to_string())
        .collect();
    println!("Output vals: {}", shown.join(","));
    Ok(())
}
