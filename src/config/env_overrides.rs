use super::schema::MAX_TOKEN_TTL_MINUTES;
use super::{Config, ExtractorProvider, RealityFirstMode};
use std::path::PathBuf;

impl Config {
    pub fn apply_env_overrides(&mut self) {
        if let Ok(workspace) = std::env::var("CONTINUITY_WORKSPACE")
            && !workspace.is_empty()
        {
            self.workspace_dir = PathBuf::from(workspace);
        }

        if let Ok(key) =
            std::env::var("CONTINUITY_API_KEY").or_else(|_| std::env::var("OPENAI_API_KEY"))
            && !key.is_empty()
        {
            self.extractor.api_key = Some(key);
        }

        if let Ok(provider) = std::env::var("CONTINUITY_EXTRACTOR_PROVIDER") {
            match provider.to_ascii_lowercase().as_str() {
                "auto" => self.extractor.provider = ExtractorProvider::Auto,
                "openai" => self.extractor.provider = ExtractorProvider::Openai,
                "none" => self.extractor.provider = ExtractorProvider::None,
                _ => {}
            }
        }

        if let Ok(model) = std::env::var("CONTINUITY_EXTRACTOR_MODEL")
            && !model.is_empty()
        {
            self.extractor.model = model;
        }

        if let Ok(raw) = std::env::var("CONTINUITY_SAFE_THRESHOLD")
            && let Ok(value) = raw.parse::<f64>()
            && value.is_finite()
        {
            self.decision.safe_threshold = value;
        }

        if let Ok(raw) = std::env::var("CONTINUITY_L4_SIMILARITY_GATE")
            && let Ok(value) = raw.parse::<f64>()
            && value > 0.0
            && value <= 1.0
        {
            self.decision.l4_similarity_gate = value;
        }

        if let Ok(raw) = std::env::var("CONTINUITY_CONFIRM_TOKEN_TTL_MINUTES")
            && let Ok(value) = raw.parse::<i64>()
            && (0..=MAX_TOKEN_TTL_MINUTES).contains(&value)
        {
            self.confirmation.token_ttl_minutes = value;
        }

        if let Ok(mode) = std::env::var("CONTINUITY_REALITY_FIRST_MODE") {
            match mode.to_ascii_lowercase().as_str() {
                "off" => self.reality_first.mode = RealityFirstMode::Off,
                "low_intervention" => self.reality_first.mode = RealityFirstMode::LowIntervention,
                _ => {}
            }
        }
    }
}
