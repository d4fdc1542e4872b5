//! Prompt templates with `$name` placeholders.
//!
//! Prompt files written for the debate use the `$name` / `${name}` syntax
//! with `$$` as a literal dollar. Substitution is always "safe": a
//! placeholder with no value, or a stray `$`, is left in the output
//! untouched, so prompts can mention prices or shell variables freely.
//!
//! ```
//! use debate_forge::template::PromptTemplate;
//!
//! let template = PromptTemplate::new("議題: ${__current_agenda__} ($$0, $unknown)");
//! let prompt = template.safe_substitute(&[("__current_agenda__", "AIと教育")]);
//! assert_eq!(prompt, "議題: AIと教育 ($0, $unknown)");
//! ```

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$(?:(\$)|([_A-Za-z][_A-Za-z0-9]*)|\{([_A-Za-z][_A-Za-z0-9]*)\})")
            .expect("valid placeholder pattern")
    })
}

/// A prompt template string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptTemplate(String);

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the braced form `${name}` appears literally in the template.
    pub fn references(&self, name: &str) -> bool {
        self.0.contains(&format!("${{{}}}", name))
    }

    /// Substitute known placeholders, leaving everything else verbatim.
    pub fn safe_substitute(&self, mapping: &[(&str, &str)]) -> String {
        let lookup = |name: &str| {
            mapping
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| *value)
        };

        placeholder_pattern()
            .replace_all(&self.0, |caps: &Captures<'_>| {
                if caps.get(1).is_some() {
                    return "$".to_string();
                }
                let name = caps
                    .get(2)
                    .or_else(|| caps.get(3))
                    .map(|m| m.as_str())
                    .unwrap_or_default();
                match lookup(name) {
                    Some(value) => value.to_string(),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}

impl From<&str> for PromptTemplate {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for PromptTemplate {
    fn from(value: String) -> Self {
        Self(value)
    }
}
