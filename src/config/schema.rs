use anyhow::Result;
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ── Top-level config ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Workspace directory - computed from home, not serialized
    #[serde(skip)]
    pub workspace_dir: PathBuf,
    /// Path to config.toml - computed from home, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub decision: DecisionConfig,

    #[serde(default)]
    pub confirmation: ConfirmationConfig,

    #[serde(default)]
    pub reality_first: RealityFirstConfig,

    #[serde(default)]
    pub extractor: ExtractorConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

// ── Decision policy ──────────────────────────────────────────────

/// Risk-aversion policy. The relative magnitudes of these defaults encode
/// product policy; change them together, never one at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionConfig {
    /// Minimum score for `direct_execute` (default: 0.0)
    #[serde(default)]
    pub safe_threshold: f64,
    /// Weight of `(1 - analysis_confidence)` in the score (default: 0.4)
    #[serde(default = "default_uncertainty_k")]
    pub uncertainty_k: f64,
    /// Similarity at which a layer-4 memory forces confirmation (default: 0.85)
    #[serde(default = "default_l4_similarity_gate")]
    pub l4_similarity_gate: f64,
    /// Penalty multiplier per memory layer 1..=4 (default: 1, 5, 30, 120)
    #[serde(default = "default_layer_multipliers")]
    pub layer_multipliers: [f64; 4],
    /// Fixed penalty added to risk on a gate hit (default: 120.0)
    #[serde(default = "default_gate_floor_penalty")]
    pub gate_floor_penalty: f64,
    /// Score forced on a gate hit (default: -999.0)
    #[serde(default = "default_gated_score")]
    pub gated_score: f64,
}

fn default_uncertainty_k() -> f64 {
    0.4
}

fn default_l4_similarity_gate() -> f64 {
    0.85
}

fn default_layer_multipliers() -> [f64; 4] {
    [1.0, 5.0, 30.0, 120.0]
}

fn default_gate_floor_penalty() -> f64 {
    120.0
}

fn default_gated_score() -> f64 {
    -999.0
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            safe_threshold: 0.0,
            uncertainty_k: default_uncertainty_k(),
            l4_similarity_gate: default_l4_similarity_gate(),
            layer_multipliers: default_layer_multipliers(),
            gate_floor_penalty: default_gate_floor_penalty(),
            gated_score: default_gated_score(),
        }
    }
}

impl DecisionConfig {
    pub fn validate(&self) -> Result<()> {
        let scalars = [
            ("decision.safe_threshold", self.safe_threshold),
            ("decision.uncertainty_k", self.uncertainty_k),
            ("decision.gate_floor_penalty", self.gate_floor_penalty),
            ("decision.gated_score", self.gated_score),
        ];
        for (name, value) in scalars {
            if !value.is_finite() {
                anyhow::bail!("{name} must be a finite number");
            }
        }
        if !(self.l4_similarity_gate > 0.0 && self.l4_similarity_gate <= 1.0) {
            anyhow::bail!("decision.l4_similarity_gate must be in (0, 1]");
        }
        if self.uncertainty_k < 0.0 {
            anyhow::bail!("decision.uncertainty_k must be >= 0");
        }
        if self.layer_multipliers.iter().any(|m| !m.is_finite() || *m <= 0.0) {
            anyhow::bail!("decision.layer_multipliers must be positive");
        }
        if self.layer_multipliers.windows(2).any(|w| w[0] >= w[1]) {
            anyhow::bail!("decision.layer_multipliers must be strictly increasing");
        }
        Ok(())
    }
}

// ── High-risk confirmation ───────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    /// Lifetime of a confirmation token in minutes (default: 30)
    #[serde(default = "default_token_ttl_minutes")]
    pub token_ttl_minutes: i64,
}

fn default_token_ttl_minutes() -> i64 {
    30
}

/// Upper bound on `confirmation.token_ttl_minutes` (one week).
pub const MAX_TOKEN_TTL_MINUTES: i64 = 7 * 24 * 60;

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            token_ttl_minutes: default_token_ttl_minutes(),
        }
    }
}

// ── Reality-first intervention ───────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RealityFirstMode {
    Off,
    #[default]
    LowIntervention,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RealityFirstConfig {
    /// "off" disables reality-check questions (default: "low_intervention")
    #[serde(default)]
    pub mode: RealityFirstMode,
}

// ── Impact extractor ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ExtractorProvider {
    /// Use the LLM endpoint when an API key is present, keywords otherwise
    #[default]
    Auto,
    Openai,
    /// Keyword extraction only
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    #[serde(default)]
    pub provider: ExtractorProvider,
    /// OpenAI-compatible base URL (default: <https://api.openai.com/v1>)
    #[serde(default = "default_extractor_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_extractor_model")]
    pub model: String,
    /// Hard upper bound on one extraction call (default: 20)
    #[serde(default = "default_extractor_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_extractor_max_tokens")]
    pub max_tokens: u32,
}

fn default_extractor_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_extractor_model() -> String {
    "gpt-4o-mini".into()
}

fn default_extractor_timeout_secs() -> u64 {
    20
}

fn default_extractor_max_tokens() -> u32 {
    1200
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            provider: ExtractorProvider::default(),
            base_url: default_extractor_base_url(),
            api_key: None,
            model: default_extractor_model(),
            timeout_secs: default_extractor_timeout_secs(),
            max_tokens: default_extractor_max_tokens(),
        }
    }
}

// ── Storage ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database file name inside the workspace (default: continuity.db)
    #[serde(default = "default_db_file")]
    pub db_file: String,
    /// Pool size. SQLite serializes writers; 1 keeps units of work strictly ordered.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_file() -> String {
    "continuity.db".into()
}

fn default_max_connections() -> u32 {
    1
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_file: default_db_file(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let home =
            UserDirs::new().map_or_else(|| PathBuf::from("."), |u| u.home_dir().to_path_buf());
        let continuity_dir = home.join(".continuity");

        Self {
            workspace_dir: continuity_dir.join("workspace"),
            config_path: continuity_dir.join("config.toml"),
            decision: DecisionConfig::default(),
            confirmation: ConfirmationConfig::default(),
            reality_first: RealityFirstConfig::default(),
            extractor: ExtractorConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        self.decision.validate()?;
        if !(0..=MAX_TOKEN_TTL_MINUTES).contains(&self.confirmation.token_ttl_minutes) {
            anyhow::bail!(
                "confirmation.token_ttl_minutes must be in [0, {MAX_TOKEN_TTL_MINUTES}]"
            );
        }
        if self.storage.max_connections == 0 {
            anyhow::bail!("storage.max_connections must be >= 1");
        }
        if self.extractor.timeout_secs == 0 {
            anyhow::bail!("extractor.timeout_secs must be >= 1");
        }
        Ok(())
    }

    pub fn db_path(&self) -> PathBuf {
        self.workspace_dir.join(&self.storage.db_file)
    }
}
