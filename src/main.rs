// seethru - A see-through, always-on-top image frame for Wayland
// Shows one image in a borderless overlay whose geometry and opacity persist

mod app;
mod canvas;
mod cli;
mod config;
mod image_loader;
mod wayland;
mod wgpu_renderer;

use anyhow::Result;
use log::info;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = cli::parse_args();

    if !args.image_path.exists() {
        println!("File {} not found", args.image_path.display());
        std::process::exit(1);
    }

    let image = image_loader::load_image(&args.image_path)?;
    info!(
        "Image loaded: {} ({}x{} pixels)",
        args.image_path.display(),
        image.width,
        image.height
    );

    let config = args.config_file();
    info!("Using settings file {}", config.path().display());
    let settings = config.load();

    wayland::run(image, config, settings, !args.cpu)
}
