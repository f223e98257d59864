use error::ConfigError;
use log::Level;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub mod error;

const CONFIG_FILE_NAME: &str = "citrine.toml";

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub transfer: TransferConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TransferConfig {
    /// File streamed by the sender binaries.
    pub data_file: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            data_file: "data.txt".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn log_level(&self) -> Level {
        Level::from_str(&self.logging.level).unwrap_or(Level::Info)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.transfer.data_file.trim().is_empty() {
            return Err(ConfigError::Validation(
                "transfer.data_file cannot be empty".to_string(),
            ));
        }
        if Level::from_str(&self.logging.level).is_err() {
            return Err(ConfigError::Validation(format!(
                "unknown logging.level '{}'",
                self.logging.level
            )));
        }
        Ok(())
    }
}

/// Loads `citrine.toml` from the working directory, writing the defaults out
/// first if the file does not exist yet.
pub fn handle() -> Result<Config, ConfigError> {
    let config_path = PathBuf::from(CONFIG_FILE_NAME);
    if config_path.exists() {
        let content = fs::read_to_string(&config_path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    } else {
        let config = Config::default();
        save(&config, &config_path)?;
        Ok(config)
    }
}

fn save(config: &Config, path: &Path) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;
    let mut file = fs::File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}
