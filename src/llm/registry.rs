//! Model tags and the clients built from them.
//!
//! Debate configurations reference panelist models by a short tag
//! ("OpenAI", "tsuzumi", ...). `models.yml` maps each tag to connection
//! settings:
//!
//! ```yaml
//! OpenAI:
//!   version: gpt-4o-2024-05-13
//!   api_key: ${OPENAI_API_KEY}
//! local:
//!   version: tsuzumi-7b
//!   base_url: http://localhost:8000/v1
//!   api_key: ${LOCAL_KEY:EMPTY}
//!   timeout: 300
//! ```

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use super::client::{ChatClient, LlmProvider, DEFAULT_TIMEOUT_SECS};
use crate::error::ConfigError;

/// API base used when a model entry has no `base_url`.
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Connection settings for one model tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Model name and version sent to the API, e.g. `gpt-4o-2024-05-13`.
    pub version: String,
    /// May embed `${VAR}` or `${VAR:default}` references.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Request timeout in seconds.
    #[serde(default)]
    pub timeout: Option<f64>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub default_headers: BTreeMap<String, String>,
}

impl ModelSettings {
    /// Build a chat client for these settings.
    pub fn build_client(&self) -> Result<ChatClient, ConfigError> {
        let api_base = self
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let api_key = self.api_key.as_deref().map(expand_env_vars);
        let timeout = match self.timeout {
            Some(secs) if secs.is_finite() && secs > 0.0 => Duration::from_secs_f64(secs),
            Some(secs) => {
                return Err(ConfigError::InvalidValue {
                    key: "timeout".to_string(),
                    message: format!("must be a positive number of seconds, got {}", secs),
                })
            }
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        let mut client = ChatClient::with_timeout(api_base, api_key, &self.version, timeout)
            .map_err(|e| ConfigError::InvalidValue {
                key: "base_url".to_string(),
                message: e.to_string(),
            })?
            .with_organization(self.organization.clone())
            .with_default_headers(self.default_headers.clone());
        if let Some(retries) = self.max_retries {
            client = client.with_max_retries(retries);
        }
        Ok(client)
    }
}

/// Builds LLM clients from model tags.
pub trait ClientFactory: Send + Sync {
    /// Create a client for `tag`.
    fn create(&self, tag: &str) -> Result<Arc<dyn LlmProvider>, ConfigError>;
}

/// Parsed `models.yml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelsConfig {
    pub models: BTreeMap<String, ModelSettings>,
}

impl ModelsConfig {
    /// Load a models file. A missing file is a configuration error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw).map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(raw).map_err(|e| ConfigError::Parse {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })
    }

    pub fn get(&self, tag: &str) -> Option<&ModelSettings> {
        self.models.get(tag)
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }
}

impl ClientFactory for ModelsConfig {
    fn create(&self, tag: &str) -> Result<Arc<dyn LlmProvider>, ConfigError> {
        let settings = self
            .get(tag)
            .ok_or_else(|| ConfigError::UnknownModel(tag.to_string()))?;
        tracing::debug!(tag = tag, version = %settings.version, "Creating LLM client");
        Ok(Arc::new(settings.build_client()?))
    }
}

/// Resolve one client per distinct tag, always including `default_tag`.
///
/// Tags are resolved in first-appearance order; the default tag is appended
/// last when no panelist uses it.
pub fn resolve_clients<'a>(
    tags: impl IntoIterator<Item = &'a str>,
    default_tag: &'a str,
    factory: &dyn ClientFactory,
) -> Result<HashMap<String, Arc<dyn LlmProvider>>, ConfigError> {
    let mut clients: HashMap<String, Arc<dyn LlmProvider>> = HashMap::new();
    for tag in tags.into_iter().chain(std::iter::once(default_tag)) {
        if clients.contains_key(tag) {
            continue;
        }
        clients.insert(tag.to_string(), factory.create(tag)?);
    }
    Ok(clients)
}

fn env_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([^}]*)\}").expect("valid env pattern"))
}

/// Expand `${VAR}` and `${VAR:default}` from the process environment.
///
/// Unknown variables without a default are left verbatim.
pub fn expand_env_vars(text: &str) -> String {
    env_pattern()
        .replace_all(text, |caps: &Captures<'_>| {
            let inner = &caps[1];
            match inner.split_once(':') {
                Some((name, default)) => {
                    std::env::var(name).unwrap_or_else(|_| default.to_string())
                }
                None => std::env::var(inner).unwrap_or_else(|_| caps[0].to_string()),
            }
        })
        .into_owned()
}
