// Command line interface module

use crate::config::ConfigFile;
use clap::Parser;
use std::path::PathBuf;

/// seethru - A see-through, always-on-top image frame for Wayland
///
/// Drag to move. Arrows move (Shift: x10), Alt+arrows resize,
/// Ctrl/Super+arrows change opacity, H hides/shows, Esc or Q quits.
#[derive(Parser, Debug)]
#[command(name = "seethru")]
#[command(author, version, about)]
pub struct Args {
    /// Path to the image file
    #[arg(value_name = "IMAGE", default_value = "1.png")]
    pub image_path: PathBuf,

    /// Settings file (defaults to ~/.transparent-frame.conf)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Disable GPU rendering and use CPU rendering only
    #[arg(long, default_value = "false")]
    pub cpu: bool,
}

impl Args {
    /// Settings file location, resolved once
    pub fn config_file(&self) -> ConfigFile {
        match &self.config {
            Some(path) => ConfigFile::new(path),
            None => ConfigFile::in_home_dir(),
        }
    }
}

pub fn parse_args() -> Args {
    Args::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_image_path() {
        let args = Args::try_parse_from(["seethru"]).expect("Failed to parse");
        assert_eq!(args.image_path, PathBuf::from("1.png"));
        assert!(!args.cpu);
        assert!(args.config.is_none());
    }

    #[test]
    fn test_explicit_arguments() {
        let args = Args::try_parse_from(["seethru", "photo.png", "--cpu", "--config", "/tmp/f.conf"])
            .expect("Failed to parse");
        assert_eq!(args.image_path, PathBuf::from("photo.png"));
        assert!(args.cpu);
        assert_eq!(args.config_file().path(), PathBuf::from("/tmp/f.conf").as_path());
    }

    #[test]
    fn test_home_config_file_name() {
        let args = Args::try_parse_from(["seethru"]).expect("Failed to parse");
        assert!(args
            .config_file()
            .path()
            .ends_with(crate::config::CONFIG_FILE_NAME));
    }
}
