use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Failed to create config directory")]
    CreateDirError,

    #[error("Unknown IMAP security setting: {0}")]
    InvalidSecurity(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImapSecurity {
    None,
    StartTLS,
    SSL,
}

impl ImapSecurity {
    pub fn default_port(&self) -> u16 {
        match self {
            ImapSecurity::SSL => 993,
            ImapSecurity::StartTLS | ImapSecurity::None => 143,
        }
    }
}

impl FromStr for ImapSecurity {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "plain" => Ok(ImapSecurity::None),
            "starttls" => Ok(ImapSecurity::StartTLS),
            "ssl" | "tls" => Ok(ImapSecurity::SSL),
            other => Err(ConfigError::InvalidSecurity(other.to_string())),
        }
    }
}

impl fmt::Display for ImapSecurity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImapSecurity::None => "None",
            ImapSecurity::StartTLS => "StartTLS",
            ImapSecurity::SSL => "SSL",
        };
        f.write_str(name)
    }
}

/// Connection settings and file locations. The password is never stored here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub folder: Option<String>,
    pub security: ImapSecurity,
    pub cache_file: String,
    pub output_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            username: None,
            folder: None,
            security: ImapSecurity::SSL,
            cache_file: "headers.json".to_string(),
            output_dir: ".".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let path = Path::new(path);

        // If the file doesn't exist, return default config
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;

        Ok(config)
    }

    pub fn save(&self, path: &str) -> Result<(), ConfigError> {
        let path = Path::new(path);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|_| ConfigError::CreateDirError)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;

        Ok(())
    }

    /// Explicit port if one was given, otherwise the usual one for the security mode.
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.security.default_port())
    }

    pub fn cache_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.cache_file).into_owned())
    }

    pub fn output_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.output_dir).into_owned())
    }
}

/// `~/.config/imap-count/config.json`, or a relative fallback when no config dir exists.
pub fn default_config_path() -> String {
    dirs::config_dir()
        .map(|dir| dir.join("imap-count").join("config.json"))
        .unwrap_or_else(|| PathBuf::from("imap-count.json"))
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.json");
        let config = Config::load(path.to_str().unwrap()).unwrap();

        assert!(config.host.is_none());
        assert_eq!(config.security, ImapSecurity::SSL);
        assert_eq!(config.effective_port(), 993);
        assert_eq!(config.cache_file, "headers.json");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("config.json");
        let path = path.to_str().unwrap();

        let config = Config {
            host: Some("imap.example.com".to_string()),
            username: Some("me".to_string()),
            folder: Some("Archive".to_string()),
            security: ImapSecurity::StartTLS,
            ..Config::default()
        };
        config.save(path).unwrap();

        let loaded = Config::load(path).unwrap();
        assert_eq!(loaded.host.as_deref(), Some("imap.example.com"));
        assert_eq!(loaded.folder.as_deref(), Some("Archive"));
        assert_eq!(loaded.security, ImapSecurity::StartTLS);
        assert_eq!(loaded.effective_port(), 143);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "host": "mail.example.org", "port": 10993 }"#).unwrap();

        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.host.as_deref(), Some("mail.example.org"));
        assert_eq!(config.effective_port(), 10993);
        assert_eq!(config.output_dir, ".");
    }

    #[test]
    fn test_security_parsing() {
        assert_eq!("ssl".parse::<ImapSecurity>().unwrap(), ImapSecurity::SSL);
        assert_eq!("StartTLS".parse::<ImapSecurity>().unwrap(), ImapSecurity::StartTLS);
        assert_eq!("NONE".parse::<ImapSecurity>().unwrap(), ImapSecurity::None);
        assert!("carrier-pigeon".parse::<ImapSecurity>().is_err());
    }
}
