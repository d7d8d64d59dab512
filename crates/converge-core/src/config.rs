//! Layered configuration
//!
//! Defaults, then an optional TOML file, then environment variables. The
//! command line applies its own overrides last through the `with_*` builders.

use crate::error::{ConvergeError, ConvergeResult};
use converge_api::ClientConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "converge.toml";

/// Environment variable overriding [`ConvergeConfig::base_url`]
pub const ENV_BASE_URL: &str = "CONVERGE_BASE_URL";
/// Environment variable overriding [`ConvergeConfig::workspace_id`]
pub const ENV_WORKSPACE_ID: &str = "CONVERGE_WORKSPACE_ID";
/// Environment variable overriding [`ConvergeConfig::api_token`]
pub const ENV_API_TOKEN: &str = "CONVERGE_API_TOKEN";

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ConvergeConfig {
    /// Service root, without the `/v1` prefix
    pub base_url: String,
    /// Workspace all calls are scoped to
    pub workspace_id: Option<String>,
    /// Opaque bearer token
    pub api_token: Option<String>,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Human-readable prefix of opened change sets
    pub change_set_prefix: String,
    /// Root of the schema tree
    pub schemas_root: PathBuf,
    /// Root of the overlay tree
    pub overlays_root: PathBuf,
    /// Allow updating fields of builtin schemas
    pub builtin_override: bool,
}

impl Default for ConvergeConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5380".to_string(),
            workspace_id: None,
            api_token: None,
            timeout_secs: 30,
            change_set_prefix: "converge".to_string(),
            schemas_root: PathBuf::from("schemas"),
            overlays_root: PathBuf::from("overlays"),
            builtin_override: false,
        }
    }
}

impl ConvergeConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load file and environment layers
    ///
    /// With `path` the file must exist. Without it, `converge.toml` in the
    /// working directory is read if present.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> ConvergeResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    Self::from_file(default)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env_from(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse a TOML config file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not valid TOML.
    pub fn from_file(path: &Path) -> ConvergeResult<Self> {
        let raw =
            std::fs::read_to_string(path).map_err(|e| ConvergeError::io_error(path, e))?;
        let config: Self = toml::from_str(&raw)
            .map_err(|e| ConvergeError::Config(format!("{}: {e}", path.display())))?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Override fields from environment-style lookups
    ///
    /// Empty values are ignored.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key| lookup(key).filter(|v: &String| !v.trim().is_empty());
        if let Some(base_url) = get(ENV_BASE_URL) {
            self.base_url = base_url;
        }
        if let Some(workspace_id) = get(ENV_WORKSPACE_ID) {
            self.workspace_id = Some(workspace_id);
        }
        if let Some(api_token) = get(ENV_API_TOKEN) {
            self.api_token = Some(api_token);
        }
    }

    /// With base URL
    #[inline]
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// With workspace id
    #[inline]
    #[must_use]
    pub fn with_workspace_id(mut self, workspace_id: impl Into<String>) -> Self {
        self.workspace_id = Some(workspace_id.into());
        self
    }

    /// With API token
    #[inline]
    #[must_use]
    pub fn with_api_token(mut self, api_token: impl Into<String>) -> Self {
        self.api_token = Some(api_token.into());
        self
    }

    /// With schema tree root
    #[inline]
    #[must_use]
    pub fn with_schemas_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.schemas_root = root.into();
        self
    }

    /// With overlay tree root
    #[inline]
    #[must_use]
    pub fn with_overlays_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.overlays_root = root.into();
        self
    }

    /// With builtin override
    #[inline]
    #[must_use]
    pub fn with_builtin_override(mut self, builtin_override: bool) -> Self {
        self.builtin_override = builtin_override;
        self
    }

    /// Check that a remote client can be built
    ///
    /// # Errors
    /// Returns [`ConvergeError::Config`] naming the first missing setting.
    pub fn validate(&self) -> ConvergeResult<()> {
        if self.base_url.trim().is_empty() {
            return Err(ConvergeError::Config("base_url is empty".to_string()));
        }
        if self.workspace_id.as_deref().map_or(true, |w| w.trim().is_empty()) {
            return Err(ConvergeError::Config(format!(
                "workspace id is not set (use --workspace-id or {ENV_WORKSPACE_ID})"
            )));
        }
        if self.api_token.as_deref().map_or(true, |t| t.trim().is_empty()) {
            return Err(ConvergeError::Config(format!(
                "api token is not set (use --api-token or {ENV_API_TOKEN})"
            )));
        }
        if self.timeout_secs == 0 {
            return Err(ConvergeError::Config("timeout_secs must be positive".to_string()));
        }
        Ok(())
    }

    /// Connection settings for the HTTP client
    ///
    /// # Errors
    /// Returns an error if the configuration is incomplete.
    pub fn client_config(&self) -> ConvergeResult<ClientConfig> {
        self.validate()?;
        Ok(ClientConfig {
            base_url: self.base_url.clone(),
            workspace_id: self.workspace_id.clone().unwrap_or_default(),
            api_token: self.api_token.clone().unwrap_or_default(),
            timeout: Duration::from_secs(self.timeout_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults() {
        let config = ConvergeConfig::default();
        assert_eq!(config.base_url, "http://localhost:5380");
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.change_set_prefix, "converge");
        assert!(!config.builtin_override);
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config: ConvergeConfig =
            toml::from_str("base_url = \"http://file\"\nworkspace_id = \"ws-file\"").unwrap();
        let env: HashMap<&str, &str> = [
            (ENV_WORKSPACE_ID, "ws-env"),
            (ENV_API_TOKEN, "token"),
            (ENV_BASE_URL, "  "),
        ]
        .into_iter()
        .collect();
        config.apply_env_from(|key| env.get(key).map(|v| (*v).to_string()));

        assert_eq!(config.base_url, "http://file");
        assert_eq!(config.workspace_id.as_deref(), Some("ws-env"));
        assert_eq!(config.api_token.as_deref(), Some("token"));
    }

    #[test]
    fn validate_requires_workspace_and_token() {
        let config = ConvergeConfig::new();
        assert!(matches!(config.validate(), Err(ConvergeError::Config(_))));

        let config = config.with_workspace_id("ws");
        assert!(config.validate().is_err());

        let config = config.with_api_token("t");
        assert!(config.validate().is_ok());
        assert_eq!(config.client_config().unwrap().timeout, Duration::from_secs(30));
    }
}
