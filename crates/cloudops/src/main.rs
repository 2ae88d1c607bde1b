mod commands;

use clap::{Parser, Subcommand};
use cloudops_core::CommandRegistry;
use cloudops_gcp::GcpGateway;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Log filter env var; stdout carries only the JSON result
const LOG_ENV: &str = "CLOUDOPS_LOG";

#[derive(Parser)]
#[command(name = "cloudops")]
#[command(about = "Instance lifecycle commands for cloud providers", long_about = None)]
struct Cli {
    /// Config file (skips discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a Google Cloud verb, e.g. `cloudops gcp instance create yb-1 --zone us-west1-a`
    Gcp {
        /// Verb group (instance, query, network)
        group: String,
        /// Verb within the group (create, destroy, regions, ...)
        method: String,
        /// Verb arguments, passed through to the command
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// List registered verbs and their flags
    List {
        /// Only this provider
        provider: Option<String>,
        /// Print the command specs as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show version information
    Version,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    if matches!(cli.command, Commands::Version) {
        println!("cloudops {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = cloudops_config::load(cli.config.as_deref())?;
    let registry = cloudops_gcp::register(CommandRegistry::builder(), &config.gcp)?.build();
    tracing::debug!("Registered {} commands", registry.len());

    match cli.command {
        Commands::Gcp {
            group,
            method,
            args,
        } => {
            let gateway = GcpGateway::new(config.gcp);
            let verb = format!("{} {}", group, method);
            let code = commands::run::handle_run(&registry, &gateway, &verb, &args).await?;
            if code != 0 {
                std::process::exit(code);
            }
        }
        Commands::List { provider, json } => {
            commands::list::handle_list(&registry, provider.as_deref(), json)?;
        }
        Commands::Version => {
            unreachable!("Version is handled before config loading");
        }
    }

    Ok(())
}
