use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_logging_dir() -> PathBuf {
    PathBuf::from("./logs/valley")
}

fn default_logging_filter() -> String {
    "info".to_string()
}

fn default_logging_rotation() -> LoggingRotation {
    LoggingRotation::Daily
}

fn default_logging_retention_days() -> usize {
    14
}

fn default_enabled_true() -> bool {
    true
}

fn default_retention_max_age_days() -> u64 {
    30
}

fn default_retention_interval_secs() -> u64 {
    3600
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LoggingRotation {
    Daily,
    Hourly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_logging_filter")]
    pub filter: String,
    #[serde(default = "default_logging_rotation")]
    pub rotation: LoggingRotation,
    #[serde(default = "default_logging_retention_days")]
    pub retention_days: usize,
    #[serde(default = "default_enabled_true")]
    pub stderr_warn_enabled: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_logging_dir(),
            filter: default_logging_filter(),
            rotation: default_logging_rotation(),
            retention_days: default_logging_retention_days(),
            stderr_warn_enabled: true,
        }
    }
}

/// One pipeline step. Order within `CampfireConfig::steps` is significant
/// and fixed at configuration time; steps are addressed by position.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Step {
    pub name: String,
    pub uses: String,
    #[serde(default)]
    pub with: BTreeMap<String, Value>,
    #[serde(default, rename = "if")]
    pub condition: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CampfireConfig {
    pub name: String,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Periodic party-box retention sweep owned by the valley.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_retention_max_age_days")]
    pub max_age_days: u64,
    #[serde(default = "default_retention_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_age_days: default_retention_max_age_days(),
            sweep_interval_secs: default_retention_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartyBoxConfig {
    /// Storage root; defaults to `./party_box_<valley name>`.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValleyConfig {
    pub name: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default = "default_enabled_true")]
    pub auto_create_dock: bool,
    #[serde(default)]
    pub party_box: PartyBoxConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Campfires provisioned right after the valley starts.
    #[serde(default)]
    pub campfires: Vec<CampfireConfig>,
}

impl ValleyConfig {
    pub fn default_for(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            env: BTreeMap::new(),
            auto_create_dock: true,
            party_box: PartyBoxConfig::default(),
            logging: LoggingConfig::default(),
            campfires: Vec::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest {}", path.display()))?;
        json5::from_str(&content)
            .with_context(|| format!("failed to parse manifest {}", path.display()))
    }

    /// Loads the manifest, falling back to a generated default when the
    /// file does not exist. Parse failures still propagate.
    pub fn load_or_default(path: &Path, name: &str) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::warn!(
                target: "config",
                path = %path.display(),
                "manifest_missing_using_default_config"
            );
            Ok(Self::default_for(name))
        }
    }
}
