//! Credentials file loading.
//!
//! The archive uses HTTP Basic authentication. Credentials live in a small
//! YAML file with a `user` section:
//!
//! ```yaml
//! user:
//!     login: userone
//!     password: blah
//! ```
//!
//! Both entries must be YAML strings. A value that YAML would read as a
//! number or boolean (`1234`, `1.10`, `0x1F`, `true`) is rejected rather than
//! reformatted; quote it (`password: "1.10"`).

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Environment variable that overrides the default credentials path.
pub const CONFIG_ENV_VAR: &str = "BOA_CONFIG";

/// File name of the default credentials file inside `$HOME`.
pub const DEFAULT_CONFIG_NAME: &str = ".boa_tap.yml";

/// Errors raised while loading credentials.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file does not exist.
    #[error("config file {} not found", .0.display())]
    NotFound(PathBuf),

    /// The file exists but could not be read.
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid YAML, or has the wrong shape.
    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A required entry is absent.
    #[error("config file {} has no {field} entry", path.display())]
    MissingField { path: PathBuf, field: &'static str },

    /// An entry is a number, boolean or collection instead of a string.
    #[error("config file {}: {field} is not a string, quote the value", path.display())]
    NotText { path: PathBuf, field: &'static str },

    /// No default location could be derived.
    #[error("no home directory found and BOA_CONFIG not given")]
    NoHome,
}

/// Login and password for the archive.
///
/// Immutable once created. The password is never shown by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    login: String,
    password: String,
}

impl Credentials {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
        }
    }

    /// Load credentials from a YAML file with `user.login` and `user.password`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        Self::from_yaml(&text, path)
    }

    fn from_yaml(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let file: ConfigFile = serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let user = file.user.ok_or_else(|| ConfigError::MissingField {
            path: path.to_path_buf(),
            field: "user",
        })?;
        let login = text_field(user.login, path, "user.login")?;
        let password = text_field(user.password, path, "user.password")?;

        Ok(Self::new(login, password))
    }

    pub fn login(&self) -> &str {
        &self.login
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Default credentials path: `$BOA_CONFIG`, else `.boa_tap.yml` in the
/// user's home directory.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    resolve_config_path(std::env::var_os(CONFIG_ENV_VAR), home::home_dir())
}

fn resolve_config_path(
    override_path: Option<OsString>,
    home: Option<PathBuf>,
) -> Result<PathBuf, ConfigError> {
    if let Some(path) = override_path.filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    match home.filter(|h| !h.as_os_str().is_empty()) {
        Some(home) => Ok(home.join(DEFAULT_CONFIG_NAME)),
        None => Err(ConfigError::NoHome),
    }
}

/// The string value of a `user` entry.
fn text_field(
    value: Option<serde_yaml::Value>,
    path: &Path,
    field: &'static str,
) -> Result<String, ConfigError> {
    match value {
        Some(serde_yaml::Value::String(s)) => Ok(s),
        None | Some(serde_yaml::Value::Null) => Err(ConfigError::MissingField {
            path: path.to_path_buf(),
            field,
        }),
        Some(_) => Err(ConfigError::NotText {
            path: path.to_path_buf(),
            field,
        }),
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    user: Option<UserSection>,
}

#[derive(Deserialize)]
struct UserSection {
    login: Option<serde_yaml::Value>,
    password: Option<serde_yaml::Value>,
}
