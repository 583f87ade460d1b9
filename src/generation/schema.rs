use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::generation::guardrails::{validate_script, validate_tags, validate_titles};

pub const MAX_KEYWORDS: usize = 10;
pub const MIN_TITLES: usize = 3;
pub const MAX_TITLES: usize = 5;

fn default_style() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("tone".to_string(), "info".to_string()),
        ("language".to_string(), "ko".to_string()),
        ("length_sec".to_string(), "20".to_string()),
    ])
}

/// Input to idea generation: trend keywords plus the velocity signal behind them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdeaRequest {
    #[serde(default)]
    pub video_id: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Numeric trend signals, e.g. `views_per_min`.
    #[serde(default)]
    pub signals: BTreeMap<String, f64>,
    #[serde(default = "default_style")]
    pub style: BTreeMap<String, String>,
}

impl Default for IdeaRequest {
    fn default() -> Self {
        Self {
            video_id: None,
            keywords: Vec::new(),
            signals: BTreeMap::new(),
            style: default_style(),
        }
    }
}

impl IdeaRequest {
    pub fn validate(&self) -> Result<()> {
        if self.keywords.len() > MAX_KEYWORDS {
            return Err(AppError::Validation(format!(
                "At most {MAX_KEYWORDS} keywords allowed, got {}",
                self.keywords.len()
            )));
        }
        Ok(())
    }
}

/// Three-beat short-form script: hook, body, call to action. Beats are optional at
/// the type level so a model reply missing one is reported as a violation rather
/// than a parse error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptBeats {
    #[serde(default)]
    pub hook: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub cta: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationMetadata {
    pub model: String,
    #[serde(default)]
    pub safety_flags: Vec<String>,
    /// Wall time of the successful attempt, seconds.
    #[serde(default)]
    pub generation_time: f64,
    #[serde(default)]
    pub retry_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdeaResponse {
    pub titles: Vec<String>,
    pub tags: Vec<String>,
    pub script_beats: ScriptBeats,
    #[serde(default)]
    pub metadata: GenerationMetadata,
}

impl IdeaResponse {
    /// Every schema and guardrail violation, in title, tag, script order.
    pub fn violations(&self) -> Vec<String> {
        let mut out = Vec::new();
        if !(MIN_TITLES..=MAX_TITLES).contains(&self.titles.len()) {
            out.push(format!(
                "Title count {} not in range {MIN_TITLES}-{MAX_TITLES}",
                self.titles.len()
            ));
        }
        out.extend(validate_titles(&self.titles));
        out.extend(validate_tags(&self.tags));
        out.extend(validate_script(&self.script_beats));
        out
    }

    /// `Err(Validation)` listing all violations, if any.
    pub fn check(&self) -> Result<()> {
        let violations = self.violations();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(violations.join("; ")))
        }
    }
}
