use crate::error::LivedirError;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
};

/// Lowest port a caller may ask the port finder to start from.
pub const MIN_STARTING_PORT: u16 = 1024;

pub const DEFAULT_STARTING_PORT: u16 = 8080;

/// What the filesystem watcher registers interest in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchGranularity {
    /// Every `.html`, `.css` and `.js` file below the served root.
    #[default]
    Files,
    /// Every directory below the served root, any write inside triggers a reload.
    Directories,
}

impl fmt::Display for WatchGranularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchGranularity::Files => write!(f, "files"),
            WatchGranularity::Directories => write!(f, "directories"),
        }
    }
}

impl FromStr for WatchGranularity {
    type Err = LivedirError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "files" | "file" => Ok(WatchGranularity::Files),
            "directories" | "dirs" | "dir" => Ok(WatchGranularity::Directories),
            other => Err(LivedirError::Config(format!(
                "unknown watch granularity '{other}', expected 'files' or 'directories'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub starting_port: u16,
    pub dir: PathBuf,
    pub granularity: WatchGranularity,
    pub open_browser: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            starting_port: DEFAULT_STARTING_PORT,
            dir: PathBuf::from("./"),
            granularity: WatchGranularity::default(),
            open_browser: true,
        }
    }
}

impl Config {
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, LivedirError> {
        tracing::debug!("Reading config from {:?}", path.as_ref());
        let content = read_to_string(path.as_ref()).map_err(|e| {
            LivedirError::Config(format!("could not read {:?}: {e}", path.as_ref()))
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Checks the startup invariants: the starting port is not privileged and the served
    /// root is an existing directory.
    pub fn validate(&self) -> Result<(), LivedirError> {
        if self.starting_port < MIN_STARTING_PORT {
            return Err(LivedirError::InvalidArgument(format!(
                "port must be greater than or equal to {MIN_STARTING_PORT}, got {}",
                self.starting_port
            )));
        }
        match self.dir.metadata() {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(LivedirError::Config(format!(
                "{} is not a directory",
                self.dir.display()
            ))),
            Err(e) => Err(LivedirError::Config(format!(
                "cannot serve {}: {e}",
                self.dir.display()
            ))),
        }
    }
}
