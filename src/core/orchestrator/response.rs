//! User-facing response text.

use crate::core::scoring::ActionKind;

pub const CLARIFY_FIRST: &str = "在执行前需要补齐关键槽位。";
const OVER_THRESHOLD: &str = "当前风险超过安全阈值，建议先补充关键信息后再执行。";
const IRREVERSIBLE: &str = "可执行，但存在不可逆风险，执行前建议先做备份或回滚点。";
const NEGATIVE_SCORE: &str = "可执行，但预估收益低于风险，建议先走低成本验证。";
const DEFAULT_ACTION: &str = "已完成风险评估，建议执行最小可行动作并保留结果回写。";

pub struct ResponseContext<'a> {
    pub selected: ActionKind,
    pub score: f64,
    pub irreversible: bool,
    pub decision_id: i64,
    pub gate_similarity: Option<f64>,
    pub best_success_path: Option<&'a str>,
    pub reality_hint: Option<&'a str>,
}

pub fn build(ctx: &ResponseContext<'_>) -> String {
    if ctx.selected == ActionKind::ConfirmHighRisk {
        let similarity = ctx
            .gate_similarity
            .map_or_else(|| "n/a".to_string(), |s| format!("{s:.4}"));
        return format!(
            "检测到高风险历史相似事件（L4门控命中，similarity={similarity}）。\
             若确认继续，请提交决策 {} 的确认令牌。",
            ctx.decision_id
        );
    }

    let base = match (ctx.selected, ctx.best_success_path) {
        (ActionKind::Clarify, _) => OVER_THRESHOLD.to_string(),
        (_, Some(name)) => format!("建议优先复用已验证成功路径：{name}，并记录实际结果回写。"),
        _ if ctx.irreversible => IRREVERSIBLE.to_string(),
        _ if ctx.score < 0.0 => NEGATIVE_SCORE.to_string(),
        _ => DEFAULT_ACTION.to_string(),
    };
    with_hint(base, ctx.reality_hint)
}

fn with_hint(base: String, hint: Option<&str>) -> String {
    match hint {
        Some(q) => format!("{base} 现实校验问题：{q}"),
        None => base,
    }
}

/// Assistant turn logged for a clarify-first reply.
pub fn clarify_transcript(questions: &[String]) -> String {
    format!("{CLARIFY_FIRST} {}", questions.join(" | "))
}
