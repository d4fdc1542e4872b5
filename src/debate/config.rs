//! Per-debate configuration files (`<name>_ja.yml`, `<name>_en.yml`).

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;
use crate::template::PromptTemplate;

fn default_turns() -> u32 {
    1
}

/// Display and voice metadata shared by the user and the panelists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParticipantConfig {
    pub name: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub voice_id: serde_json::Value,
    #[serde(default)]
    pub voice_pitch: serde_json::Value,
}

/// One panelist entry of a debate file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelistSpec {
    pub name: String,
    pub persona: String,
    #[serde(default)]
    pub characteristics: String,
    /// Model tag looked up in `models.yml`.
    pub model: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub voice_id: serde_json::Value,
    #[serde(default)]
    pub voice_pitch: serde_json::Value,
}

impl PanelistSpec {
    pub fn participant(&self) -> ParticipantConfig {
        ParticipantConfig {
            name: self.name.clone(),
            image: self.image.clone(),
            voice_id: self.voice_id.clone(),
            voice_pitch: self.voice_pitch.clone(),
        }
    }
}

/// The system prompt and the five turn prompts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplates {
    /// Placeholders: `__persona__`, `__characteristics__`.
    #[serde(default)]
    pub system_prompt: PromptTemplate,
    #[serde(default)]
    pub first_user_prompt: PromptTemplate,
    #[serde(default)]
    pub subsequent_user_prompt: PromptTemplate,
    #[serde(default)]
    pub additional_first_user_prompt: PromptTemplate,
    #[serde(default)]
    pub additional_subsequent_user_prompt: PromptTemplate,
    #[serde(default)]
    pub additional_last_user_prompt: PromptTemplate,
}

/// A complete debate setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateSpec {
    #[serde(default)]
    pub label: String,
    pub user: ParticipantConfig,
    pub panelists: Vec<PanelistSpec>,
    #[serde(flatten)]
    pub prompts: PromptTemplates,
    #[serde(default = "default_turns")]
    pub num_discussion_turn: u32,
}

impl DebateSpec {
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
        let spec: Self = serde_yaml::from_str(raw).map_err(|e| ConfigError::Parse {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })?;
        if spec.panelists.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "panelists".to_string(),
                message: "at least one panelist is required".to_string(),
            });
        }
        Ok(spec)
    }

    /// The user followed by every panelist, as shown to viewers.
    pub fn participants(&self) -> Vec<ParticipantConfig> {
        std::iter::once(self.user.clone())
            .chain(self.panelists.iter().map(PanelistSpec::participant))
            .collect()
    }

    /// Distinct model tags in panelist order.
    pub fn model_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = Vec::new();
        for panelist in &self.panelists {
            if !tags.contains(&panelist.model) {
                tags.push(panelist.model.clone());
            }
        }
        tags
    }
}
