use async_trait::async_trait;

use super::{EventImpactResult, ImpactExtractor};
use crate::core::state::{Axis, UserState};
use crate::error::ExtractorError;

const FALLBACK_ANALYSIS_CONFIDENCE: f64 = 0.65;

/// (axis, delta, keywords). A keyword hit anywhere in the lowercased message
/// applies the delta once.
const AXIS_RULES: &[(Axis, f64, &[&str])] = &[
    (Axis::Money, -0.2, &["亏", "损失", "缺钱"]),
    (Axis::Time, -0.1, &["浪费", "重复", "重来", "waste"]),
    (Axis::Energy, -0.2, &["累", "烦", "挫败", "frustrat"]),
    (Axis::Asset, -1.0, &["删库", "删除数据", "data loss"]),
    (Axis::Reliability, -0.5, &["又", "again", "忘", "不靠谱"]),
    (Axis::Identity, 0.3, &["符合", "自主", "价值观"]),
];

const SYSTEM_CAUSED_MARKERS: &[&str] = &["系统", "assistant", "你又"];

/// Deterministic keyword extractor. Low confidence, but always available.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordImpactExtractor;

impl KeywordImpactExtractor {
    pub fn extract_now(self, message: &str) -> EventImpactResult {
        let lower = message.to_lowercase();
        let mut impact = EventImpactResult::neutral("auto-extracted impact from user message");

        for (axis, delta, keywords) in AXIS_RULES {
            if keywords.iter().any(|k| lower.contains(k)) {
                impact.impact_vector[*axis] = *delta;
            }
        }

        let money_conf = if impact.impact_vector[Axis::Money].abs() < f64::EPSILON {
            0.2
        } else {
            0.7
        };
        impact.axis_confidence[Axis::Money] = money_conf;
        impact.axis_confidence[Axis::Time] = 0.7;
        impact.axis_confidence[Axis::Energy] = 0.7;
        impact.axis_confidence[Axis::Asset] = 0.8;
        impact.axis_confidence[Axis::Reliability] = 0.8;
        impact.axis_confidence[Axis::Identity] = 0.6;
        if money_conf <= 0.25 {
            impact.missing_axes.push(Axis::Money);
        }

        impact.irreversible = impact.impact_vector[Axis::Asset] <= -1.0;
        impact.system_caused = SYSTEM_CAUSED_MARKERS.iter().any(|k| lower.contains(k));
        impact.analysis_confidence = FALLBACK_ANALYSIS_CONFIDENCE;
        impact
    }
}

#[async_trait]
impl ImpactExtractor for KeywordImpactExtractor {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn extract(
        &self,
        message: &str,
        _state: &UserState,
    ) -> Result<EventImpactResult, ExtractorError> {
        Ok(self.extract_now(message))
    }
}
