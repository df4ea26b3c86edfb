use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod config_cmd;
mod registry_cmd;
mod run;
mod workflow_cmd;

#[derive(Parser)]
#[command(name = "pflow", version, about = "Declarative workflow execution engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a workflow from a file, a saved name, or piped stdin
    Run {
        /// Workflow file (.json or .pflow.md) or saved workflow name
        workflow: Option<String>,
        /// Workflow parameters as key=value pairs
        #[arg(value_name = "KEY=VALUE")]
        params: Vec<String>,
        /// Output format: text or json
        #[arg(long, default_value = "text")]
        output_format: String,
        /// Resolve templates permissively instead of the document's mode
        #[arg(long)]
        permissive: bool,
        /// Show parameter sources and per-node details
        #[arg(short, long)]
        verbose: bool,
    },
    /// Validate a workflow without executing it
    Validate {
        /// Workflow file (.json or .pflow.md)
        file: PathBuf,
    },
    /// Inspect and exercise the node registry
    Registry {
        #[command(subcommand)]
        command: RegistryCommand,
    },
    /// Manage saved workflows
    Workflow {
        #[command(subcommand)]
        command: WorkflowCommand,
    },
    /// Manage settings and the environment store
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
enum RegistryCommand {
    /// List registered node types
    List,
    /// Show a node type's declared interface
    Describe {
        /// Node type, e.g. read-file
        node_type: String,
    },
    /// Execute a single node with parameters
    Run {
        /// Node type, e.g. shell
        node_type: String,
        /// Node parameters as key=value pairs
        #[arg(value_name = "KEY=VALUE")]
        params: Vec<String>,
        /// Emit the result as JSON
        #[arg(long)]
        json: bool,
        /// Show flattened template paths for the outputs
        #[arg(long)]
        structure: bool,
        /// Show resolution and parameter details
        #[arg(short, long)]
        verbose: bool,
    },
}

#[derive(Subcommand)]
enum WorkflowCommand {
    /// List saved workflows
    List,
    /// Save a workflow file under a name
    Save {
        /// Store name
        name: String,
        /// Workflow file (.json or .pflow.md)
        file: PathBuf,
        /// Description shown in listings
        #[arg(long)]
        description: Option<String>,
        /// Replace an existing document
        #[arg(long)]
        overwrite: bool,
    },
    /// Print a saved workflow's IR
    Show {
        /// Store name
        name: String,
    },
    /// Delete a saved workflow
    Delete {
        /// Store name
        name: String,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Set an environment store entry
    SetEnv {
        key: String,
        value: String,
    },
    /// Set the default workflow model for LLM nodes
    SetModel {
        model: String,
    },
    /// Print the current settings, with sensitive values masked
    Show,
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let code = match dispatch(cli) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("{error:#}");
            1
        }
    };
    std::process::exit(code);
}

fn dispatch(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Run {
            workflow,
            params,
            output_format,
            permissive,
            verbose,
        } => run::execute_workflow(
            workflow.as_deref(),
            &params,
            &output_format,
            permissive,
            verbose,
        ),
        Command::Validate { file } => run::validate_workflow(&file),
        Command::Registry { command } => match command {
            RegistryCommand::List => registry_cmd::list(),
            RegistryCommand::Describe { node_type } => registry_cmd::describe(&node_type),
            RegistryCommand::Run {
                node_type,
                params,
                json,
                structure,
                verbose,
            } => registry_cmd::run_single_node(&node_type, &params, json, structure, verbose),
        },
        Command::Workflow { command } => match command {
            WorkflowCommand::List => workflow_cmd::list(),
            WorkflowCommand::Save {
                name,
                file,
                description,
                overwrite,
            } => workflow_cmd::save(&name, &file, description, overwrite),
            WorkflowCommand::Show { name } => workflow_cmd::show(&name),
            WorkflowCommand::Delete { name } => workflow_cmd::delete(&name),
        },
        Command::Config { command } => match command {
            ConfigCommand::SetEnv { key, value } => config_cmd::set_env(&key, &value),
            ConfigCommand::SetModel { model } => config_cmd::set_model(&model),
            ConfigCommand::Show => config_cmd::show(),
        },
    }
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
