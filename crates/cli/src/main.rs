//! Latitude Inventory - Ansible dynamic inventory for Latitude bare-metal servers
//!
//! Ansible runs executable inventory sources with `--list` (whole inventory)
//! or `--host <name>` (variables of one host) and reads JSON from stdout.

mod config;
mod logging;
mod output;

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};
use std::sync::Arc;
use tracing::info;

use latitude_inventory_core::application::options::TOKEN_ENV_VAR;
use latitude_inventory_core::application::InventoryService;
use latitude_inventory_infra_latitude::{LatitudeClient, LatitudeClientConfig};

const DEFAULT_INVENTORY_FILE: &str = "latitude.yml";

#[derive(Parser)]
#[command(name = "latitude-inventory")]
#[command(about = "Ansible dynamic inventory for Latitude bare-metal servers", long_about = None)]
#[command(version)]
#[command(group(ArgGroup::new("mode").required(true).args(["list", "host", "verify"])))]
struct Cli {
    /// Print the whole inventory
    #[arg(long)]
    list: bool,

    /// Print the variables of one host
    #[arg(long, value_name = "HOSTNAME")]
    host: Option<String>,

    /// Check the inventory file and exit
    #[arg(long)]
    verify: bool,

    /// Inventory file (name must end with latitude.yml or latitude.yaml)
    #[arg(short, long, env = "LATITUDE_INVENTORY_CONFIG", default_value = DEFAULT_INVENTORY_FILE)]
    inventory: String,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Initialize logging (stderr only)
    logging::init_logging();

    // 2. Load configuration
    let options = config::load_options(&cli.inventory).await?;

    if cli.verify {
        info!(path = %cli.inventory, "Inventory file is valid");
        eprintln!("{}: OK (project {})", cli.inventory, options.latitude_project);
        return Ok(());
    }

    let token = options
        .resolve_token(std::env::var(TOKEN_ENV_VAR).ok())
        .context("Cannot authenticate against the Latitude API")?;

    // 3. Setup dependencies (DI wiring)
    let client = LatitudeClient::new(LatitudeClientConfig::from_options(&options, token))?;
    let service = InventoryService::new(Arc::new(client), options)?;

    // 4. Fetch servers and build the inventory
    let inventory = service
        .collect()
        .await
        .context("Failed to build inventory from Latitude")?;

    // 5. Print the requested document
    let document = match &cli.host {
        Some(host) => inventory.host_json(host),
        None => inventory.to_list_json(),
    };
    println!("{}", output::render(&document, cli.pretty)?);

    Ok(())
}
