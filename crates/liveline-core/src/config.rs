//! Backend configuration.

use std::env;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::EnvFile;

/// The error type returned when configuration cannot be loaded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The endpoint is empty or whitespace.
    #[error("backend endpoint is empty, set it to the connection string of your deployment")]
    EmptyEndpoint,
    /// The environment variable holding the endpoint is not set.
    #[error("environment variable `{0}` is not set, it should contain the backend endpoint")]
    MissingVar(String),
}

/// The result type returned by configuration methods.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// The connection string used to open a backend channel.
///
/// The value is treated as an opaque credential. It is never validated beyond being non-empty
/// and it is never printed by its [`Debug`](fmt::Debug) implementation.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint {
    inner: Arc<str>,
}

impl Endpoint {
    /// Creates an endpoint from a connection string.
    pub fn new<S>(s: S) -> ConfigResult<Self>
    where
        S: Into<String>,
    {
        let s = s.into();
        if s.trim().is_empty() {
            return Err(ConfigError::EmptyEndpoint);
        }

        Ok(Self { inner: s.into() })
    }

    /// Returns the connection string.
    pub fn as_str(&self) -> &str {
        &self.inner
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint").finish_non_exhaustive()
    }
}

impl FromStr for Endpoint {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Endpoint {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Endpoint> for String {
    fn from(value: Endpoint) -> Self {
        value.inner.as_ref().to_owned()
    }
}

/// Configuration of the backend an application talks to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    endpoint: Endpoint,
}

impl BackendConfig {
    /// The environment variable read by [`BackendConfig::from_default_env`].
    pub const ENV_NAME: &'static str = "LIVELINE_URL";

    /// Creates a configuration with an endpoint.
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }

    /// Returns the backend endpoint.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Reads the endpoint from [`BackendConfig::ENV_NAME`].
    pub fn from_default_env() -> ConfigResult<Self> {
        Self::from_env(Self::ENV_NAME)
    }

    /// Reads the endpoint from an environment variable of the current process.
    pub fn from_env<S>(var_name: S) -> ConfigResult<Self>
    where
        S: AsRef<str>,
    {
        let var_name = var_name.as_ref();
        let value = env::var(var_name).map_err(|_| ConfigError::MissingVar(var_name.to_owned()))?;

        Endpoint::new(value).map(Self::new)
    }

    /// Reads the endpoint from the process environment, falling back to the env files of
    /// `profile` in `dir`.
    pub fn from_env_files<P, S>(dir: P, profile: &str, var_name: S) -> ConfigResult<Self>
    where
        P: AsRef<Path>,
        S: AsRef<str>,
    {
        let var_name = var_name.as_ref();
        if let Ok(m) = env::var(var_name) {
            return Endpoint::new(m).map(Self::new);
        }

        let mut envs = EnvFile::new(profile).load(dir);
        let value = envs
            .remove(var_name)
            .ok_or_else(|| ConfigError::MissingVar(var_name.to_owned()))?;

        tracing::debug!(var = var_name, profile, "backend endpoint loaded from env file");

        Endpoint::new(value).map(Self::new)
    }
}
