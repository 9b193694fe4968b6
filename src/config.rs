use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::ai::AspectRatio;

/// Largest number of images that may be requested per task.
pub const MAX_IMAGES_PER_TASK: u8 = 4;

/// Default archive written by batch export.
pub const DEFAULT_ARCHIVE_NAME: &str = "gemini_batch_output.zip";

/// Default Gemini image model.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-image";

/// Top-level configuration.
///
/// Holds the Gemini credentials, the default generation settings, and where
/// results are written.
///
/// # Loading
///
/// ```rust,no_run
/// use gemini_batch::config::Config;
///
/// // From a JSON file
/// let config = Config::load(Some("config.json".as_ref())).unwrap();
///
/// // Or use defaults and customize
/// let mut config = Config::default();
/// config.gemini.api_key = "AIza...".into();
/// config.generation.images_per_task = 2;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub gemini: GeminiConfig,
    pub generation: GenerationSettings,
    pub output: OutputConfig,
}

/// Google Gemini service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// Empty means: read `GEMINI_API_KEY`, then `API_KEY`, from the environment.
    pub api_key: String,
    pub model: String,
}

/// The user-facing generation knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationSettings {
    pub aspect_ratio: AspectRatio,
    /// Images requested per task, 1 to [`MAX_IMAGES_PER_TASK`].
    pub images_per_task: u8,
}

/// Output behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// File name of the zip archive.
    pub archive_name: String,
    /// If set, every image is also saved individually into this directory.
    pub save_dir: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gemini: GeminiConfig {
                api_key: String::new(),
                model: DEFAULT_MODEL.to_string(),
            },
            generation: GenerationSettings::default(),
            output: OutputConfig {
                archive_name: DEFAULT_ARCHIVE_NAME.to_string(),
                save_dir: None,
            },
        }
    }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            aspect_ratio: AspectRatio::Portrait9x16,
            images_per_task: 1,
        }
    }
}

impl GenerationSettings {
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_IMAGES_PER_TASK).contains(&self.images_per_task) {
            anyhow::bail!(
                "images_per_task must be between 1 and {MAX_IMAGES_PER_TASK}, got {}",
                self.images_per_task
            );
        }
        Ok(())
    }
}

impl GeminiConfig {
    /// The configured key, or the first non-empty key from the environment.
    pub fn resolved_api_key(&self) -> Option<String> {
        if !self.api_key.trim().is_empty() {
            return Some(self.api_key.trim().to_string());
        }
        ["GEMINI_API_KEY", "API_KEY"]
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .map(|key| key.trim().to_string())
            .find(|key| !key.is_empty())
    }
}

impl Config {
    /// Resolve the config file path — same directory as the executable.
    pub fn config_path() -> Result<PathBuf> {
        let exe_path = std::env::current_exe().context("Failed to get executable path")?;
        let exe_dir = exe_path
            .parent()
            .context("Failed to get executable directory")?;
        Ok(exe_dir.join("config.json"))
    }

    /// Load config from the given path, or from the default location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if !config_path.exists() {
            log::warn!(
                "Config file not found at {}. Using defaults.",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config file")?;
        config
            .generation
            .validate()
            .context("Invalid generation settings in config file")?;
        Ok(config)
    }

    /// Save config to the given path, or to the default location.
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, contents).context("Failed to write config file")?;
        log::info!("Config saved to {}", config_path.display());
        Ok(())
    }
}
