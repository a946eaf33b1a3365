//! Gateway configuration.
//!
//! Every field has a default, so an empty TOML document is a valid config:
//!
//! ```toml
//! bind = "0.0.0.0:8080"
//! prefix = "grains"
//! id_token = "grainId"
//! key_separator = "+"
//! default_policy = "route"
//! request_timeout_ms = 30000
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Settings consumed while building the route table and while serving.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// `host:port` the server listens on.
    pub bind: String,
    /// Global URL prefix every generated template starts with.
    pub prefix: String,
    /// Route token holding the primary grain key.
    pub id_token: String,
    /// Route token holding the key extension of compound-key grains.
    pub id_extension_token: String,
    /// Separator splitting a compound key carried in a single `id` segment.
    pub key_separator: String,
    /// Resolver policy applied to routes that do not name one.
    pub default_policy: String,
    /// Media type used when a request carries neither `Accept` nor `Content-Type`.
    pub default_media_type: String,
    /// Per-request deadline. `None` disables it.
    pub request_timeout_ms: Option<u64>,
    /// Where the route table snapshot is served. `None` disables it.
    pub diagnostics_path: Option<String>,
    pub health_path: Option<String>,
    pub readiness_path: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_owned(),
            prefix: String::new(),
            id_token: "id".to_owned(),
            id_extension_token: "idExtension".to_owned(),
            key_separator: "+".to_owned(),
            default_policy: crate::resolver::ROUTE_POLICY.to_owned(),
            default_media_type: crate::media::JSON.to_owned(),
            request_timeout_ms: None,
            diagnostics_path: Some("/_routes".to_owned()),
            health_path: Some("/healthz".to_owned()),
            readiness_path: Some("/readyz".to_owned()),
        }
    }
}

impl GatewayConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    /// The prefix as templates consume it: `"grains"` becomes `"grains/"`,
    /// an empty prefix becomes `"/"`.
    pub(crate) fn normalized_prefix(&self) -> String {
        let prefix = self.prefix.trim();
        if prefix.is_empty() {
            "/".to_owned()
        } else if prefix.ends_with('/') {
            prefix.to_owned()
        } else {
            format!("{prefix}/")
        }
    }
}
