// refpin - A transparent always-on-top reference board for Wayland
// Pins any number of images in an overlay window where they can be moved, scaled and saved

mod board;
mod cli;
mod config;
mod cpu_renderer;
mod dnd;
mod error;
mod hit_test;
mod image_loader;
mod interaction;
mod render;
mod session;
mod shape;
mod shortcuts;
mod store;
mod view;
mod wayland;
mod wgpu_renderer;

use anyhow::Result;
use log::info;

fn main() -> Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Parse command line arguments
    let args = cli::parse_args();

    let config = match &args.config_path {
        Some(path) => config::load_from_path(path)?,
        None => config::load()?,
    };

    info!(
        "Starting refpin with {} image(s), session: {:?}",
        args.requests.len(),
        args.session_file
    );

    // Run with layer-shell (GPU rendering by default, CPU as fallback)
    info!("Using layer-shell overlay mode (GPU: {})", args.use_gpu);
    wayland::run(args, config)
}
