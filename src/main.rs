use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use roundup::core::Vehicle;
use tracing::error;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliVehicle {
    Nps,
    Index,
}

impl From<CliVehicle> for Vehicle {
    fn from(value: CliVehicle) -> Self {
        match value {
            CliVehicle::Nps => Vehicle::Nps,
            CliVehicle::Index => Vehicle::Index,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "roundup",
    about = "Round-up retirement savings: period rules and NPS/index return projections"
)]
struct Cli {
    #[arg(long, short, global = true, help = "Enable debug logging")]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API
    Serve {
        #[arg(long, default_value = "0.0.0.0")]
        host: IpAddr,
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Project returns for a request body stored as JSON
    Project {
        #[arg(long, help = "Path to a returns request body")]
        input: PathBuf,
        #[arg(long, value_enum, default_value_t = CliVehicle::Nps)]
        vehicle: CliVehicle,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Command::Serve { host, port } => {
            if let Err(e) = roundup::api::run_http_server(SocketAddr::new(host, port)).await {
                error!("Server error: {e}");
                std::process::exit(1);
            }
        }
        Command::Project { input, vehicle } => {
            if let Err(e) = run_projection(&input, vehicle.into()) {
                error!("{e}");
                std::process::exit(1);
            }
        }
    }
}

fn run_projection(input: &Path, vehicle: Vehicle) -> Result<(), String> {
    let body = std::fs::read_to_string(input)
        .map_err(|e| format!("failed to read {}: {e}", input.display()))?;
    let response = roundup::api::project_returns_json(&body, vehicle).map_err(|e| e.to_string())?;
    let json = serde_json::to_string_pretty(&response).map_err(|e| e.to_string())?;
    println!("{json}");
    Ok(())
}
