use anyhow::{anyhow, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;

/// The structure of our configuration file (config.toml)
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Directory holding session temp files, named `{sessionId}.{ext}`.
    pub temp_directory: String,
    pub yt_dlp_path: String,
    /// Optional cookies file passed through to yt-dlp.
    pub cookies_file: Option<String>,
    /// How long a session lives before the periodic sweep evicts it.
    pub retention_secs: u64,
    pub sweep_interval_secs: u64,
    /// Delay between serving a file and removing it, so the client can
    /// finish its transfer.
    pub delivery_grace_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 3000,
            temp_directory: std::env::temp_dir().to_string_lossy().to_string(),
            yt_dlp_path: "yt-dlp".to_string(),
            cookies_file: None,
            retention_secs: 600,
            sweep_interval_secs: 300,
            delivery_grace_secs: 60,
        }
    }
}

/// Returns the cross-platform path to the configuration file, creating the
/// directory if needed.
async fn get_config_path() -> Result<PathBuf> {
    let project_dirs = ProjectDirs::from("com", "TubeDl", "Tube-DL-Backend")
        .ok_or_else(|| anyhow!("Could not find a valid home directory to store config"))?;

    let config_dir = project_dirs.config_dir();
    fs::create_dir_all(config_dir).await?;

    Ok(config_dir.join("config.toml"))
}

/// Loads the configuration from the file, or creates a default one if it
/// doesn't exist.
pub async fn load_config() -> Result<Config> {
    let config_path = get_config_path().await?;

    if !config_path.exists() {
        tracing::info!(
            "No config file found. Creating a default one at: {}",
            config_path.display()
        );
        let default_config = Config::default();
        save_config(&default_config).await?;
        return Ok(default_config);
    }

    let config_content = fs::read_to_string(&config_path).await?;
    let config: Config = toml::from_str(&config_content)
        .map_err(|e| anyhow!("Failed to parse config file at {}: {}", config_path.display(), e))?;

    Ok(config)
}

/// Saves the provided configuration object to the file.
pub async fn save_config(config: &Config) -> Result<()> {
    let config_path = get_config_path().await?;
    let toml_string = toml::to_string_pretty(config)?;
    fs::write(config_path, toml_string).await?;
    Ok(())
}
