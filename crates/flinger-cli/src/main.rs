//! Flinger CLI - command-line front end for the VNC server supervisor.
//!
//! Each invocation builds a supervisor over the on-device layout, runs one
//! command and exits. The server itself detaches, so `start` and `stop`
//! can be issued from separate invocations.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, error, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "flingerctl")]
#[command(about = "Start, stop and inspect the vncflinger server")]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// JSON file describing binary and state locations
    #[arg(long, global = true)]
    layout: Option<PathBuf>,

    /// Directory containing vncflinger and vncpasswd
    #[arg(long, global = true)]
    root_dir: Option<PathBuf>,

    /// Directory for the PID and credential files
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the server and wait until it is listening
    Start(commands::StartArgs),
    /// Stop the running server
    Stop,
    /// Show whether the server is running and where to connect
    Status {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start the server if the device is connected and it is not running
    Autostart(commands::StartArgs),
    /// Start the server, report events until Ctrl-C, then stop it
    Serve(commands::StartArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(commands::exit_code(&e))
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let layout = commands::resolve_layout(
        args.layout.as_deref(),
        args.root_dir.as_deref(),
        args.state_dir.as_deref(),
    )?;
    debug!("Server layout: {:?}", layout);

    let read_only = matches!(args.command, Command::Status { .. });
    let supervisor = commands::build_supervisor(layout, commands::device_hold(), read_only);

    match args.command {
        Command::Start(start) => commands::start(&supervisor, start).await,
        Command::Stop => commands::stop(&supervisor).await,
        Command::Status { json } => commands::status(&supervisor, json),
        Command::Autostart(start) => commands::autostart(&supervisor, start).await,
        Command::Serve(start) => commands::serve(&supervisor, start).await,
    }
}
