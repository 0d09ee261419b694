use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use surface_pilot::surface::SurfaceKind;
use surface_pilot::RunOptions;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SurfaceArg {
    Vnc,
    Adb,
}

impl From<SurfaceArg> for SurfaceKind {
    fn from(arg: SurfaceArg) -> Self {
        match arg {
            SurfaceArg::Vnc => SurfaceKind::Vnc,
            SurfaceArg::Adb => SurfaceKind::Adb,
        }
    }
}

/// Autonomous agent driving a remote desktop or Android device.
#[derive(Debug, Parser)]
#[command(name = "surface-pilot", version)]
struct Cli {
    /// Path to config.toml (defaults to next to the binary, then the working directory).
    #[arg(long)]
    config: Option<PathBuf>,

    /// HTTP listen address, e.g. 0.0.0.0:3000.
    #[arg(long)]
    listen: Option<String>,

    /// Remote surface to drive.
    #[arg(long, value_enum)]
    surface: Option<SurfaceArg>,

    /// Do not start the agent loop automatically.
    #[arg(long)]
    no_autostart: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let options = RunOptions {
        config_path: cli.config,
        listen: cli.listen,
        surface: cli.surface.map(SurfaceKind::from),
        no_autostart: cli.no_autostart,
    };
    if let Err(e) = surface_pilot::run(options).await {
        eprintln!("surface-pilot: {e}");
        std::process::exit(1);
    }
}
