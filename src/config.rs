use crate::{
    error::{ConfigError, StdIoError, TomlDeError},
    user_manager::DEFAULT_MIN_PASSWORD_LENGTH,
};
use axum::http::Uri;
use directories::ProjectDirs;
use serde::Deserialize;
use std::{
    fs,
    net::{Ipv6Addr, SocketAddr},
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::Level;

pub const CONFIG_FILE_NAME: &str = "config.toml";

pub fn default_listen_address() -> SocketAddr {
    SocketAddr::from((Ipv6Addr::LOCALHOST, 8886))
}

fn default_min_password_length() -> usize {
    DEFAULT_MIN_PASSWORD_LENGTH
}

pub fn default_invitation_path() -> String {
    "/invitation".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Expected `iss` of every invitation token.
    pub issuer_url: String,
    #[serde(default = "default_listen_address")]
    pub listen_address: SocketAddr,
    /// TOML file of trusted public keys, re-read per request.
    pub keys_path: PathBuf,
    /// TOML file of accounts. Without it the store starts empty and nothing is persisted.
    #[serde(default)]
    pub users_path: Option<PathBuf>,
    #[serde(default = "default_min_password_length")]
    pub min_password_length: usize,
    #[serde(default = "default_invitation_path")]
    pub invitation_path: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_directory: Option<PathBuf>,
}

impl Config {
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        match ProjectDirs::from("com", "invitation", "invitation") {
            Some(project_dirs) => Ok(project_dirs.config_dir().join(CONFIG_FILE_NAME)),
            None => Err(ConfigError::NoConfigDirectory),
        }
    }

    /// Loads from `path`, or from the platform config directory when absent.
    pub fn load(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path,
            None => Self::default_path()?,
        };
        Self::from_file(&path)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let toml_string = match fs::read_to_string(path) {
            Ok(toml_string) => toml_string,
            Err(err) => return Err(ConfigError::ReadConfigFile(path.to_owned(), StdIoError(err))),
        };
        let config: Config = match toml::from_str(&toml_string) {
            Ok(config) => config,
            Err(err) => {
                return Err(ConfigError::ParseConfigFile(
                    path.to_owned(),
                    TomlDeError(err),
                ))
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match Uri::from_str(&self.issuer_url) {
            Ok(uri) if uri.scheme().is_some() && uri.host().is_some() => {}
            _ => return Err(ConfigError::InvalidIssuerUrl(self.issuer_url.to_owned())),
        }
        if !self.invitation_path.starts_with('/') {
            return Err(ConfigError::InvalidInvitationPath(
                self.invitation_path.to_owned(),
            ));
        }
        if self.min_password_length == 0 {
            return Err(ConfigError::MinPasswordLengthIsZero);
        }
        self.get_log_level()?;
        Ok(())
    }

    pub fn get_log_level(&self) -> Result<Level, ConfigError> {
        match Level::from_str(&self.log_level) {
            Ok(level) => Ok(level),
            Err(_) => Err(ConfigError::InvalidLogLevel(self.log_level.to_owned())),
        }
    }
}
