//! `strategist_config.yml` loading.
//!
//! ```yaml
//! tail_prompts:
//!   - " Push back on the previous speaker."
//!   - " Propose a compromise."
//! legal_prompts_dict:
//!   escalating: [1]
//!   converging: [0, 1]
//! state_names: [escalating, converging]
//! state_judge_prompt: |
//!   Comments:
//!   ${__comments__}
//!   Which state best describes the discussion?
//!   ${__options__}
//! embedding_model_name: text-embedding-3-small
//! torch_device: cpu
//! embedding_api_base: https://api.openai.com/v1
//! embedding_api_key: ${OPENAI_API_KEY}
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::embedding::{Embedder, HashEmbedder, HttpEmbedder};
use crate::error::ConfigError;
use crate::llm::expand_env_vars;
use crate::template::PromptTemplate;

fn default_device() -> String {
    "cpu".to_string()
}

/// Settings for the discussion strategist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategistConfig {
    /// Intervention phrases appended to a panelist's base prompt.
    pub tail_prompts: Vec<String>,
    /// Discussion state -> indices into `tail_prompts` legal in that state.
    #[serde(default)]
    pub legal_prompts_dict: BTreeMap<String, Vec<usize>>,
    /// Empty or absent disables state judging: every tail is always legal.
    #[serde(default)]
    pub state_names: Option<Vec<String>>,
    #[serde(default)]
    pub state_judge_prompt: PromptTemplate,
    pub embedding_model_name: String,
    /// Compute-device hint for local embedding backends.
    #[serde(default = "default_device")]
    pub torch_device: String,
    /// OpenAI-compatible endpoint serving `embedding_model_name`.
    #[serde(default)]
    pub embedding_api_base: Option<String>,
    #[serde(default)]
    pub embedding_api_key: Option<String>,
    #[serde(default)]
    pub embedding_dimension: Option<usize>,
    /// Inputs longer than this keep only their trailing characters.
    #[serde(default)]
    pub max_embedding_chars: Option<usize>,
    /// Generate candidate continuations concurrently.
    #[serde(default)]
    pub parallel_candidates: bool,
}

impl StrategistConfig {
    /// Load and validate a strategist file. A missing file is a configuration error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn state_names(&self) -> &[String] {
        self.state_names.as_deref().unwrap_or(&[])
    }

    /// Check that every legal index points at a tail prompt and that every
    /// judged state has at least one legal prompt.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tail_prompts.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "tail_prompts".to_string(),
                message: "at least one tail prompt is required".to_string(),
            });
        }
        for (state, indices) in &self.legal_prompts_dict {
            if let Some(bad) = indices.iter().find(|i| **i >= self.tail_prompts.len()) {
                return Err(ConfigError::InvalidValue {
                    key: format!("legal_prompts_dict.{}", state),
                    message: format!(
                        "index {} out of range for {} tail prompts",
                        bad,
                        self.tail_prompts.len()
                    ),
                });
            }
        }
        for state in self.state_names() {
            let legal = self.legal_prompts_dict.get(state).map_or(0, Vec::len);
            if legal == 0 {
                return Err(ConfigError::InvalidValue {
                    key: format!("legal_prompts_dict.{}", state),
                    message: format!("state {} has no legal tail prompts", state),
                });
            }
        }
        Ok(())
    }

    /// Build the embedder described by this config.
    ///
    /// Without `embedding_api_base` the offline hashed embedder is used.
    pub fn build_embedder(&self) -> Result<Arc<dyn Embedder>, ConfigError> {
        tracing::info!(
            model = %self.embedding_model_name,
            device = %self.torch_device,
            "Configuring strategist embeddings"
        );
        match &self.embedding_api_base {
            Some(api_base) => {
                let api_key = self.embedding_api_key.as_deref().map(expand_env_vars);
                let embedder = HttpEmbedder::new(api_base, api_key, &self.embedding_model_name)
                    .map_err(|e| ConfigError::InvalidValue {
                        key: "embedding_api_base".to_string(),
                        message: e.to_string(),
                    })?
                    .with_max_chars(self.max_embedding_chars)
                    .with_dimensions(self.embedding_dimension);
                Ok(Arc::new(embedder))
            }
            None => {
                tracing::warn!(
                    model = %self.embedding_model_name,
                    "No embedding endpoint configured; using hashed n-gram embeddings"
                );
                let dimension = self
                    .embedding_dimension
                    .unwrap_or(crate::embedding::hashed::DEFAULT_DIMENSION);
                Ok(Arc::new(HashEmbedder::new(dimension)))
            }
        }
    }
}

/// Strategist settings paired with the embedder they share across debates.
#[derive(Clone)]
pub struct StrategySetup {
    pub config: StrategistConfig,
    pub embedder: Arc<dyn Embedder>,
}

impl StrategySetup {
    pub fn new(config: StrategistConfig, embedder: Arc<dyn Embedder>) -> Self {
        Self { config, embedder }
    }

    /// Load `strategist_config.yml` and build its embedder once.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = StrategistConfig::load(path)?;
        let embedder = config.build_embedder()?;
        Ok(Self { config, embedder })
    }
}

impl std::fmt::Debug for StrategySetup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategySetup")
            .field("config", &self.config)
            .field("embedder", &self.embedder.model_name())
            .finish()
    }
}
