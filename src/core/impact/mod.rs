//! Impact extraction: turning a free-text message into a structured
//! [`EventImpactResult`].
//!
//! The model behind the primary extractor is out of this crate's hands; all
//! the pipeline relies on is the [`ImpactExtractor`] contract plus the
//! deterministic [`KeywordImpactExtractor`] that takes over whenever the
//! primary fails, times out, or returns something unparseable.

mod fallback;
mod llm;

pub use fallback::KeywordImpactExtractor;
pub use llm::LlmImpactExtractor;

use std::ops::{Index, IndexMut};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{ExtractorConfig, ExtractorProvider};
use crate::core::state::{Axis, AxisMap, UserState};
use crate::error::ExtractorError;

pub const EVENT_IMPACT_SCHEMA_VERSION: &str = "event_impact_v2.1";

/// Six signed, unitless deltas. Magnitudes are untrusted.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "WireImpactVector", into = "WireImpactVector")]
pub struct ImpactVector(AxisMap<f64>);

impl ImpactVector {
    pub fn zero() -> Self {
        Self(AxisMap::splat(0.0))
    }

    pub fn as_map(&self) -> &AxisMap<f64> {
        &self.0
    }
}

impl Index<Axis> for ImpactVector {
    type Output = f64;

    fn index(&self, axis: Axis) -> &f64 {
        &self.0[axis]
    }
}

impl IndexMut<Axis> for ImpactVector {
    fn index_mut(&mut self, axis: Axis) -> &mut f64 {
        &mut self.0[axis]
    }
}

/// Field names used by extractors on the wire.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
struct WireImpactVector {
    #[serde(default)]
    delta_money: f64,
    #[serde(default)]
    delta_time: f64,
    #[serde(default)]
    delta_energy: f64,
    #[serde(default)]
    delta_asset: f64,
    #[serde(default)]
    delta_reliability: f64,
    #[serde(default)]
    delta_identity: f64,
}

impl From<WireImpactVector> for ImpactVector {
    fn from(w: WireImpactVector) -> Self {
        let mut v = Self::zero();
        v[Axis::Money] = w.delta_money;
        v[Axis::Time] = w.delta_time;
        v[Axis::Energy] = w.delta_energy;
        v[Axis::Asset] = w.delta_asset;
        v[Axis::Reliability] = w.delta_reliability;
        v[Axis::Identity] = w.delta_identity;
        v
    }
}

impl From<ImpactVector> for WireImpactVector {
    fn from(v: ImpactVector) -> Self {
        Self {
            delta_money: v[Axis::Money],
            delta_time: v[Axis::Time],
            delta_energy: v[Axis::Energy],
            delta_asset: v[Axis::Asset],
            delta_reliability: v[Axis::Reliability],
            delta_identity: v[Axis::Identity],
        }
    }
}

fn default_schema_version() -> String {
    EVENT_IMPACT_SCHEMA_VERSION.into()
}

/// Structured impact of one message. Immutable once it reaches the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventImpactResult {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub event_summary: String,
    pub event_class: String,
    pub impact_vector: ImpactVector,
    pub axis_confidence: AxisMap<f64>,
    #[serde(default)]
    pub missing_axes: Vec<Axis>,
    #[serde(default)]
    pub irreversible: bool,
    #[serde(default)]
    pub system_caused: bool,
    #[serde(default)]
    pub analysis_confidence: f64,
}

impl EventImpactResult {
    /// A zero-impact result with no confidence in any axis.
    pub fn neutral(summary: impl Into<String>) -> Self {
        Self {
            schema_version: default_schema_version(),
            event_summary: summary.into(),
            event_class: "generic_event".into(),
            impact_vector: ImpactVector::zero(),
            axis_confidence: AxisMap::splat(0.0),
            missing_axes: Vec::new(),
            irreversible: false,
            system_caused: false,
            analysis_confidence: 0.0,
        }
    }

    /// Make an untrusted result safe for arithmetic: non-finite deltas become
    /// zero, confidences are clamped to `[0, 1]`.
    pub fn sanitized(mut self) -> Self {
        for axis in Axis::ALL {
            if !self.impact_vector[axis].is_finite() {
                self.impact_vector[axis] = 0.0;
            }
            self.axis_confidence[axis] = clamp_unit(self.axis_confidence[axis]);
        }
        self.analysis_confidence = clamp_unit(self.analysis_confidence);
        self
    }
}

fn clamp_unit(x: f64) -> f64 {
    if x.is_nan() { 0.0 } else { x.clamp(0.0, 1.0) }
}

/// Producer of structured impact from a message and the user's current state.
#[async_trait]
pub trait ImpactExtractor: Send + Sync {
    fn name(&self) -> &str;

    async fn extract(
        &self,
        message: &str,
        state: &UserState,
    ) -> Result<EventImpactResult, ExtractorError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExtractionSource {
    Llm,
    Fallback,
}

/// Result of [`extract_with_fallback`], always usable.
#[derive(Debug, Clone)]
pub struct ImpactExtraction {
    pub impact: EventImpactResult,
    pub source: ExtractionSource,
    pub fallback_reason: Option<String>,
}

/// Build the primary extractor selected by config, if any.
pub fn primary_extractor(config: &ExtractorConfig) -> Option<Box<dyn ImpactExtractor>> {
    match config.provider {
        ExtractorProvider::None => None,
        ExtractorProvider::Openai => Some(Box::new(LlmImpactExtractor::new(config))),
        ExtractorProvider::Auto => config
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .map(|_| Box::new(LlmImpactExtractor::new(config)) as Box<dyn ImpactExtractor>),
    }
}

/// Run the primary extractor under a hard time bound, falling back to the
/// keyword extractor on any failure. Never fails and never blocks past
/// `timeout`.
pub async fn extract_with_fallback(
    primary: Option<&dyn ImpactExtractor>,
    message: &str,
    state: &UserState,
    timeout: Duration,
) -> ImpactExtraction {
    let Some(extractor) = primary else {
        return fallback(message, &ExtractorError::Unavailable("no_provider_or_key".into()));
    };

    let err = match tokio::time::timeout(timeout, extractor.extract(message, state)).await {
        Ok(Ok(impact)) => {
            return ImpactExtraction {
                impact: impact.sanitized(),
                source: ExtractionSource::Llm,
                fallback_reason: None,
            };
        }
        Ok(Err(e)) => e,
        Err(_) => ExtractorError::Timeout(timeout.as_secs()),
    };

    warn!(extractor = extractor.name(), reason = %err, "impact extractor failed, using keyword fallback");
    fallback(message, &err)
}

fn fallback(message: &str, reason: &ExtractorError) -> ImpactExtraction {
    ImpactExtraction {
        impact: KeywordImpactExtractor.extract_now(message),
        source: ExtractionSource::Fallback,
        fallback_reason: Some(reason.to_string()),
    }
}

/// Pull a JSON object out of model output that may wrap it in prose or fences.
pub fn extract_json_block(raw: &str) -> Option<serde_json::Value> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(v) = serde_json::from_str(s) {
        return Some(v);
    }
    let start = s.find('{')?;
    let end = s.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&s[start..=end]).ok()
}
