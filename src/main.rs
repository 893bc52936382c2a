#![windows_subsystem = "windows"]

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
#[allow(unused_imports)]
use log::{info, warn, error};

use arhud::app::{self, LaunchOptions, APP_NAME};
use arhud::build_info::BuildInfo;
use arhud::config::{SETTINGS_PATH, USER_SETTINGS};
use arhud::logging;
use arhud::render::ThemeMode;

#[derive(Parser, Debug)]
#[command(name = "arhud", about = "Augmented-reality HUD that keeps detector annotations locked to the scene")]
#[command(disable_version_flag = true)]
struct Args {
    /// Settings file to use instead of the per-user settings.yaml
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Replay detections from a JSON script instead of the synthetic scene
    #[arg(long)]
    script: Option<PathBuf>,

    /// JSON list of external markers to show alongside detections
    #[arg(long)]
    markers: Option<PathBuf>,

    /// Start in side-by-side stereo mode
    #[arg(long)]
    stereo: bool,

    /// Colour mode: normal, night, thermal, machine or wireframe
    #[arg(long)]
    theme: Option<String>,

    /// Feed a slow synthetic head sweep as the orientation sensor
    #[arg(long)]
    simulate_orientation: bool,

    /// Print build information and exit
    #[arg(short = 'V', long)]
    version: bool,
}

fn main() {
    let args = Args::parse();
    if args.version {
        println!("arhud {}\n{}", BuildInfo::display_version(), BuildInfo::detailed_info());
        return;
    }

    // Set up logging and the panic hook before anything else can fail
    let shared_log_buffer = logging::setup_logger(APP_NAME);
    logging::setup_panic_hook(APP_NAME, Arc::clone(&shared_log_buffer));
    info!("ARHud {} starting", BuildInfo::display_version());

    if let Some(path) = &args.settings {
        // Must happen before the settings are first read
        let _ = SETTINGS_PATH.set(path.to_string_lossy().into_owned());
    }
    let mut settings = USER_SETTINGS.clone();
    if args.stereo {
        settings.stereo = true;
    }
    if let Some(theme) = args.theme {
        match ThemeMode::from_name(&theme) {
            Some(mode) => settings.theme = mode.name().to_string(),
            None => warn!("Unknown theme '{}', keeping '{}'", theme, settings.theme),
        }
    }

    let options = LaunchOptions {
        settings,
        script: args.script,
        markers: args.markers,
        simulate_orientation: args.simulate_orientation,
        log_buffer: shared_log_buffer,
    };

    if let Err(e) = app::run(options) {
        error!("HUD exited with an error: {}", e);
        std::process::exit(1);
    }
}
