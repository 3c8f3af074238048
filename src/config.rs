//! Engine configuration, persisted as TOML.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::agenda::AgendaPriority;
use crate::error::{ConfigError, ConfigResult};

/// Which answer commits a popped candidate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InferenceMode {
    /// The decision functions.
    #[default]
    Decoder,
    /// The gold labels: commit exactly the gold candidates.
    Oracle,
}

/// Driver configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UbertsConfig {
    /// Threshold of the fallback decision: commit iff `score > threshold`.
    #[serde(default)]
    pub default_threshold: f64,
    /// Score of rule conclusions when a rule has no scorer of its own.
    #[serde(default = "default_rule_score")]
    pub default_rule_score: f64,
    /// Agenda priority, e.g. `"easyfirst-linear"` or `"1*easyfirst + 0.5*leftright"`.
    #[serde(default = "default_priority")]
    pub priority: String,
    /// Relation ranks for the `dfs`/`bfs` priorities.
    #[serde(default)]
    pub relation_order: Vec<String>,
    /// Seed for the `random` priority.
    #[serde(default = "default_random_seed")]
    pub random_seed: u64,
    /// Stop a run after this many pops.
    #[serde(default)]
    pub max_pops: Option<usize>,
    /// Group constraints such as `AT_LEAST_ONE:ner3(i,t,b):i`.
    #[serde(default)]
    pub decisions: Vec<String>,
    /// Commit loaded `x` facts without matching rules against them.
    #[serde(default)]
    pub no_match_on_load: bool,
    /// How [`crate::engine::Uberts::run`] decides commits.
    #[serde(default)]
    pub mode: InferenceMode,
}

fn default_rule_score() -> f64 {
    1.0
}
fn default_priority() -> String {
    "easyfirst-linear".into()
}
fn default_random_seed() -> u64 {
    9001
}

impl Default for UbertsConfig {
    fn default() -> Self {
        Self {
            default_threshold: 0.0,
            default_rule_score: default_rule_score(),
            priority: default_priority(),
            relation_order: Vec::new(),
            random_seed: default_random_seed(),
            max_pops: None,
            decisions: Vec::new(),
            no_match_on_load: false,
            mode: InferenceMode::Decoder,
        }
    }
}

impl UbertsConfig {
    /// The agenda priority described by this config.
    pub fn agenda_priority(&self) -> ConfigResult<AgendaPriority> {
        Ok(AgendaPriority::parse(&self.priority)?
            .with_relation_order(&self.relation_order)
            .with_seed(self.random_seed))
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }
}
