use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use openstack_shard::{
    config::Config,
    control_plane::openstack::OpenStackClient,
    descriptor::Blueprint,
    registry::BuildRegistry,
};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "openstack-shard", version)]
#[command(about = "OpenStack resource builders and readiness checks", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = "openstack-shard.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check configuration and authenticate against Keystone
    Doctor,
    /// Show the builders a blueprint would produce, without calling OpenStack
    Plan {
        /// Blueprint file with resource descriptors
        #[arg(long)]
        blueprint: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Doctor => {
            let config = Config::load(&cli.config)?;
            run_doctor(config).await
        }
        Commands::Plan { blueprint } => run_plan(&blueprint),
    }
}

async fn run_doctor(config: Config) -> Result<()> {
    println!("openstack-shard doctor");
    println!("======================");
    println!();

    println!("Configuration:");
    println!("  Identity endpoint: {}", config.openstack.endpoint);
    println!("  Username: {}", config.openstack.username);
    println!("  Project: {}", config.openstack.project_id);
    println!("  Domain: {}", config.openstack.domain);
    println!("  Verify SSL: {}", config.openstack.verify_ssl);
    println!(
        "  Waits: volume {}s/{}s, instance {}s/{}s, network {}s/{}s",
        config.waits.volume.timeout_seconds,
        config.waits.volume.poll_interval_seconds,
        config.waits.instance.timeout_seconds,
        config.waits.instance.poll_interval_seconds,
        config.waits.network.timeout_seconds,
        config.waits.network.poll_interval_seconds,
    );
    println!();

    println!("Authenticating...");
    let client = OpenStackClient::connect(&config.openstack)
        .await
        .context("Keystone authentication failed")?;
    println!("  [ok] Token issued");
    println!();

    let endpoints = client.endpoints();
    println!("Service endpoints:");
    println!("  Compute: {}", endpoints.compute);
    println!("  Network: {}", endpoints.network);
    println!("  Volume: {}", endpoints.volume);

    info!("Doctor checks passed");
    Ok(())
}

fn run_plan(path: &std::path::Path) -> Result<()> {
    let blueprint = Blueprint::load(path)?;
    let registry = BuildRegistry::from_blueprint(&blueprint)?;

    println!("Build plan for {}", path.display());
    println!();
    for builder in registry.in_priority_order() {
        let deps = builder.dependencies();
        let deps = if deps.is_empty() {
            "-".to_string()
        } else {
            deps.iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        println!(
            "  [{:>2}] {:<20} {:<24} depends on: {}",
            builder.priority(),
            builder.kind().to_string(),
            builder.name(),
            deps
        );
    }
    println!();
    println!("{} resources", registry.builders().len());
    Ok(())
}
