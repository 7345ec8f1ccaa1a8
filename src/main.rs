// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use service_bay::backends::session::VehicleInfo;
use service_bay::config::Config;
use service_bay::station::StationId;
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "service-bay")]
#[command(about = "Vehicle service bay inspection dashboard")]
#[command(version = service_bay::constants::app_info::version())]
#[command(subcommand_required = false)]
struct Cli {
    /// Config file (default: <config dir>/service-bay/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Base URL of the analysis and feed API
    #[arg(long, global = true)]
    backend_url: Option<String>,

    /// Service session identifier
    #[arg(long, global = true)]
    session: Option<String>,

    /// Use the image directory camera backend with this directory
    #[arg(long, global = true)]
    camera_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List cameras of the configured backend
    List,

    /// Analyze an image file for one station and print the bill
    Analyze {
        /// Station the image belongs to (front, left, right, brake)
        #[arg(short, long, value_parser = parse_station)]
        station: StationId,

        /// Image file to upload
        file: PathBuf,

        /// Write the annotated image here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run one auto-capture walk without the dashboard
    Auto {
        /// Use the remote feed instead of local cameras
        #[arg(short, long)]
        remote: bool,
    },

    /// Check whether the backend is online
    Health,

    /// Register a vehicle and open a service session
    Start {
        /// Vehicle number plate
        #[arg(long)]
        plate: String,

        /// Owner name
        #[arg(long)]
        owner: String,

        /// Vehicle identifier
        #[arg(long)]
        car_id: String,

        /// Store the new session id in the config file
        #[arg(long)]
        save: bool,
    },

    /// Convert serial telemetry lines from stdin to JSON updates
    Ingest {
        /// Also save each update to the current session's record
        #[arg(long)]
        save: bool,
    },
}

fn parse_station(value: &str) -> Result<StationId, String> {
    StationId::parse(value).ok_or_else(|| format!("unknown station '{}'", value))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // The dashboard owns the terminal, so its logs go to a file
    let dashboard = cli.command.is_none();
    init_logging(dashboard)?;

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(url) = cli.backend_url {
        config.backend_url = url;
    }
    if let Some(session) = cli.session {
        config.session_id = Some(session);
    }
    if let Some(dir) = cli.camera_dir {
        config.camera_backend = service_bay::backends::camera::CameraBackendType::Files;
        config.camera_dir = Some(dir);
    }
    config.validate()?;

    match cli.command {
        None => service_bay::terminal::run(config),
        Some(Commands::List) => cli::list_cameras(&config),
        Some(Commands::Analyze {
            station,
            file,
            output,
        }) => cli::analyze_file(config, station, file, output),
        Some(Commands::Auto { remote }) => cli::auto_capture(config, remote),
        Some(Commands::Health) => cli::health(&config),
        Some(Commands::Start {
            plate,
            owner,
            car_id,
            save,
        }) => {
            let vehicle = VehicleInfo {
                number_plate: plate,
                owner_name: owner,
                car_id,
            };
            let remember_in = if save {
                cli.config.clone().or_else(Config::default_path)
            } else {
                None
            };
            cli::start_service(&config, vehicle, remember_in)
        }
        Some(Commands::Ingest { save }) => cli::ingest(&config, save),
    }
}

fn init_logging(to_file: bool) -> Result<(), Box<dyn std::error::Error>> {
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=service_bay=debug, RUST_LOG=info
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true);

    let log_dir = dirs::cache_dir().map(|dir| dir.join("service-bay"));
    match log_dir {
        Some(dir) if to_file => {
            std::fs::create_dir_all(&dir)?;
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(dir.join("service-bay.log"))?;
            builder
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None if to_file => builder.with_writer(std::io::sink).init(),
        _ => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}
