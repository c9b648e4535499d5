use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::error::FfxError;
use crate::core::export::default_library_dir;
use crate::core::transcode::TranscodeSettings;

pub const FFMPEG_ENV: &str = "FFBUILDER_FFMPEG";
pub const FFPROBE_ENV: &str = "FFBUILDER_FFPROBE";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub transcode: TranscodeSettings,
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub ffmpeg: String,
    pub ffprobe: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Where transcodes land when no `--output` is given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library_dir: Option<PathBuf>,
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("ffbuilder").join("config.toml"))
}

impl AppConfig {
    /// Load `explicit`, or the default location when it exists.
    ///
    /// An explicit path must exist; a missing default file means defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, FfxError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match default_config_path() {
                Some(path) if path.exists() => path,
                _ => return Ok(Self::default()),
            },
        };

        debug!(path = %path.display(), "loading config");
        let content = fs::read_to_string(&path).map_err(|e| FfxError::Config {
            message: format!("{}: {e}", path.display()),
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            FfxError::Config { message } => FfxError::Config {
                message: format!("{}: {message}", path.display()),
            },
            other => other,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, FfxError> {
        toml::from_str(content).map_err(|e| FfxError::Config {
            message: e.to_string(),
        })
    }

    pub fn to_toml_string(&self) -> Result<String, FfxError> {
        toml::to_string_pretty(self).map_err(|e| FfxError::Config {
            message: e.to_string(),
        })
    }

    /// Environment variables take precedence over the file for the engine
    /// binaries.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| env::var(key).ok());
    }

    fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ffmpeg) = lookup(FFMPEG_ENV).filter(|v| !v.trim().is_empty()) {
            self.engine.ffmpeg = ffmpeg;
        }
        if let Some(ffprobe) = lookup(FFPROBE_ENV).filter(|v| !v.trim().is_empty()) {
            self.engine.ffprobe = ffprobe;
        }
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.paths
            .cache_dir
            .clone()
            .or_else(|| dirs::cache_dir().map(|dir| dir.join("ffbuilder")))
            .unwrap_or_else(|| env::temp_dir().join("ffbuilder"))
    }

    pub fn library_dir(&self) -> Result<PathBuf, FfxError> {
        self.paths
            .library_dir
            .clone()
            .or_else(default_library_dir)
            .ok_or_else(|| FfxError::Config {
                message: "no video library directory; set paths.library_dir".to_string(),
            })
    }
}
