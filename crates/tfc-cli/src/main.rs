//! CLI running the TensorFlow C API examples.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use console::style;
use tfc_core::DemoError;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{config, graph, predict, run, tensor, version};

/// TensorFlow C API examples - load graphs, build tensors, run sessions
#[derive(Parser)]
#[command(name = "tfc")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// TensorFlow shared library to load
    #[arg(long, global = true)]
    library: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the TensorFlow runtime version
    Version,

    /// Read a GraphDef file and import it
    LoadGraph(graph::LoadGraphArgs),

    /// List every operation in a graph
    GraphInfo(graph::GraphInfoArgs),

    /// Describe selected operations of a graph
    TensorInfo(graph::TensorInfoArgs),

    /// Create the input tensor and verify its properties
    CreateTensor,

    /// Run a session on the input tensor
    Run(run::RunArgs),

    /// Run images through a model
    Predict(predict::PredictArgs),

    /// Manage configuration
    Config(config::ConfigArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();

    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to install logger: {err}");
    }

    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {}", style("✗").red(), err);
            ExitCode::from(exit_code(&err))
        }
    }
}

fn execute(cli: Cli) -> anyhow::Result<()> {
    let options = commands::GlobalOptions {
        config: cli.config,
        library: cli.library,
    };

    match cli.command {
        Commands::Version => version::run(&options),
        Commands::LoadGraph(args) => graph::load(args, &options),
        Commands::GraphInfo(args) => graph::info(args, &options),
        Commands::TensorInfo(args) => graph::tensor_info(args, &options),
        Commands::CreateTensor => tensor::run(&options),
        Commands::Run(args) => run::run(args, &options),
        Commands::Predict(args) => predict::run(args, &options),
        Commands::Config(args) => config::run(args, &options),
    }
}

/// Exit code for a failed command: the failure site for workflow errors, 1 otherwise.
fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<DemoError>()
        .map(DemoError::exit_code)
        .unwrap_or(1)
}
