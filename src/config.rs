// Configuration module
// Persists window geometry and opacity as `key = value` lines

use log::{debug, info, warn};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use toml::{Table, Value};

/// Name of the settings file inside the user's home directory
pub const CONFIG_FILE_NAME: &str = ".transparent-frame.conf";

/// Comment line written at the top of every saved file
const HEADER: &str = "#transparent frame";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unreadable line {line}: {source}")]
    Syntax {
        line: usize,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value {value} for key {key:?}")]
    InvalidValue { key: &'static str, value: String },
    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Window state mirrored on disk
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settings {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    /// Window opacity (0.0 - 1.0)
    pub opacity: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            x: 100,
            y: 100,
            width: 720,
            height: 1000,
            opacity: 0.55,
        }
    }
}

impl Settings {
    /// Build settings from the file contents.
    ///
    /// Each line is parsed as its own TOML document, so one bad line never
    /// discards the rest, and every key falls back to its default on its own.
    /// The failures are returned for logging.
    pub fn from_text(text: &str) -> (Self, Vec<ConfigError>) {
        let mut table = Table::new();
        let mut errors = Vec::new();

        for (idx, line) in text.lines().enumerate() {
            match line.parse::<Table>() {
                Ok(entries) => table.extend(entries),
                Err(source) => errors.push(ConfigError::Syntax {
                    line: idx + 1,
                    source,
                }),
            }
        }

        let defaults = Self::default();
        let settings = Self {
            x: integer(&table, "x", defaults.x, &mut errors),
            y: integer(&table, "y", defaults.y, &mut errors),
            width: integer(&table, "width", defaults.width, &mut errors),
            height: integer(&table, "height", defaults.height, &mut errors),
            opacity: float(&table, "opacity", defaults.opacity, &mut errors),
        };

        (settings, errors)
    }

    /// Render settings as file contents
    pub fn to_text(&self) -> Result<String, ConfigError> {
        let mut table = Table::new();
        table.insert("x".into(), Value::Integer(self.x.into()));
        table.insert("y".into(), Value::Integer(self.y.into()));
        table.insert("width".into(), Value::Integer(self.width.into()));
        table.insert("height".into(), Value::Integer(self.height.into()));
        // Widen through the shortest decimal form so 0.55 is written as 0.55
        let opacity = self
            .opacity
            .to_string()
            .parse()
            .unwrap_or(f64::from(self.opacity));
        table.insert("opacity".into(), Value::Float(opacity));

        Ok(format!("{HEADER}\n{}", toml::to_string(&table)?))
    }
}

/// Location of the settings file, resolved once at startup
#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
}

impl ConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<home>/.transparent-frame.conf`, or the working directory when no
    /// home directory can be determined
    pub fn in_home_dir() -> Self {
        let dir = dirs::home_dir().unwrap_or_else(|| {
            warn!("Could not determine home directory, using current directory");
            PathBuf::from(".")
        });
        Self::new(dir.join(CONFIG_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read settings, never failing: a missing or unreadable file yields the
    /// defaults and each malformed key falls back individually
    pub fn load(&self) -> Settings {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No config at {}, using defaults", self.path.display());
                return Settings::default();
            }
            Err(source) => {
                let err = ConfigError::Io {
                    path: self.path.clone(),
                    source,
                };
                warn!("{err}, using defaults");
                return Settings::default();
            }
        };

        let (settings, errors) = Settings::from_text(&text);
        for err in &errors {
            warn!("{err} in {}, using default", self.path.display());
        }
        debug!("Loaded settings: {:?}", settings);
        settings
    }

    /// Write settings, replacing the previous file contents
    pub fn save(&self, settings: &Settings) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: self.path.clone(),
            source,
        };

        let file = File::create(&self.path).map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(settings.to_text()?.as_bytes())
            .map_err(io_err)?;
        writer.flush().map_err(io_err)?;
        Ok(())
    }

    /// Save and log instead of propagating; used from input handlers
    pub fn save_or_warn(&self, settings: &Settings) {
        match self.save(settings) {
            Ok(()) => debug!("Saved settings to {}", self.path.display()),
            Err(e) => warn!("Failed to save settings: {e}"),
        }
    }
}

fn integer<T: TryFrom<i64>>(
    table: &Table,
    key: &'static str,
    default: T,
    errors: &mut Vec<ConfigError>,
) -> T {
    let Some(value) = table.get(key) else {
        return default;
    };

    match value.as_integer().and_then(|i| T::try_from(i).ok()) {
        Some(parsed) => parsed,
        None => {
            errors.push(ConfigError::InvalidValue {
                key,
                value: value.to_string(),
            });
            default
        }
    }
}

fn float(table: &Table, key: &'static str, default: f32, errors: &mut Vec<ConfigError>) -> f32 {
    let Some(value) = table.get(key) else {
        return default;
    };

    match value {
        Value::Float(f) => *f as f32,
        Value::Integer(i) => *i as f32,
        _ => {
            errors.push(ConfigError::InvalidValue {
                key,
                value: value.to_string(),
            });
            default
        }
    }
}
