use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File name of the settings record inside the home directory.
pub const SETTINGS_FILE_NAME: &str = ".mail_gui_config.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Failed to create config directory: {0}")]
    CreateDirError(#[source] std::io::Error),

    #[error("Port rakam olmalı")]
    InvalidPort(String),
}

/// SMTP connection settings, stored as a flat JSON record.
///
/// The password is kept in clear text, matching the on-disk format users
/// already have.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpSettings {
    pub smtp_server: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            smtp_server: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            username: String::new(),
            password: String::new(),
        }
    }
}

impl SmtpSettings {
    /// `~/.mail_gui_config.json`, or `None` when there is no home directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(SETTINGS_FILE_NAME))
    }

    /// Reads the settings file. `Ok(None)` when it does not exist.
    pub fn try_load(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&content)?;

        Ok(Some(settings))
    }

    /// Loads settings, falling back to defaults when the file is missing or
    /// unreadable.
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(Some(settings)) => settings,
            Ok(None) => Self::default(),
            Err(e) => {
                log::warn!("Ignoring settings file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Overwrites the settings file with the current values.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(ConfigError::CreateDirError)?;
            }
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;

        log::debug!("Settings written to {}", path.display());
        Ok(())
    }

    pub fn parse_port(text: &str) -> Result<u16, ConfigError> {
        match text.trim().parse::<u16>() {
            Ok(port) if port > 0 => Ok(port),
            _ => Err(ConfigError::InvalidPort(text.to_string())),
        }
    }

    /// Builds the settings for a send from raw form fields. A blank server
    /// field falls back to the saved server.
    pub fn resolve_form(
        &self,
        server: &str,
        port: &str,
        username: &str,
        password: &str,
    ) -> Result<Self, ConfigError> {
        let server = server.trim();
        Ok(Self {
            smtp_server: if server.is_empty() {
                self.smtp_server.clone()
            } else {
                server.to_string()
            },
            smtp_port: Self::parse_port(port)?,
            username: username.trim().to_string(),
            password: password.trim().to_string(),
        })
    }

    pub fn masked_password(&self) -> String {
        "*".repeat(self.password.chars().count())
    }
}
