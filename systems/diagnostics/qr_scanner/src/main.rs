//! QR scanner binary, polls a networked camera and previews what it finds.
use beacon::{components::prelude::*, devices::prelude::*};
use clap::Parser;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Arguments required for starting the program from the command line.
#[derive(Parser, Debug)]
struct Args {
    /// Path to the config file for the scanner. Built in defaults are used
    /// when omitted.
    #[arg(short, long)]
    filepath: Option<String>,
    /// Address of the camera, overrides the config file.
    #[arg(short, long)]
    camera_host: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let mut config = match &args.filepath {
        Some(filepath) => ScannerConfig::from_file(filepath)?,
        None => ScannerConfig::default(),
    };
    if let Some(host) = args.camera_host {
        config.camera.host = host;
    }

    let stop_signal = Arc::new(AtomicBool::new(false));
    let handler_signal = stop_signal.clone();
    ctrlc::set_handler(move || handler_signal.store(true, Ordering::Relaxed))?;

    let mut window = PreviewWindow::new(config.window.clone())?;
    let scanner = Scanner::new(config)?;
    ScannerController::start(&scanner, &mut window, stop_signal);
    info!("Shutting down");
    Ok(())
}
