use anyhow::Result;
use clap::{Parser, Subcommand};
use kubeduo_cli::commands::{check, destroy, plan, setup, status};
use kubeduo_cli::logging;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Stand up and tear down a two-node kubeadm cluster on Multipass VMs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Cluster config file (default: the per-user kubeduo/cluster.toml)
    #[arg(short, long, global = true, env = "KUBEDUO_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose output - shows debug logs on stderr
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Provision the cluster; completed steps from earlier runs are skipped
    #[command(alias = "up")]
    Setup,
    /// Tear the cluster down, best effort, and remove the host kubeconfig
    #[command(alias = "down")]
    Destroy,
    /// Print the steps setup (or destroy) would run, without running them
    Plan {
        /// Show the teardown plan instead
        #[arg(long)]
        destroy: bool,
    },
    /// Show VM state and the latest recorded outcome of every step
    Status,
    /// Check host prerequisites
    Check,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Setup => setup::handle_setup(config).await,
        Commands::Destroy => destroy::handle_destroy(config).await,
        Commands::Plan { destroy } => plan::handle_plan(config, destroy),
        Commands::Status => status::handle_status(config).await,
        Commands::Check => check::handle_check(),
    }
}
