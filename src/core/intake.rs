//! Constraint intake: classify the request, work out which input slots it
//! needs, and flag "shell bias" (habit offered as justification with no
//! quantified resource signal behind it).

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub const MAX_QUESTIONS: usize = 3;

const EXECUTION_MARKERS: &[&str] = &["run", "command", "exec", "notes", "osascript", "执行", "命令"];
const COMPLEX_DECISION_MARKERS: &[&str] = &["赚钱", "项目", "预算", "收益", "半年", "一年", "计划"];

const SHELL_MARKERS: &[&str] = &[
    "我就是这样",
    "我们一直这样",
    "一直都是",
    "过去成功",
    "历史经验",
    "按老办法",
    "we always",
    "this is how we do things",
];

const DECISION_MARKERS: &[&str] = &[
    "要不要", "是否", "选择", "决策", "继续", "转向", "方案", "计划", "should", "decide", "choose",
];

const REALITY_MARKERS: &[&str] = &[
    "预算",
    "现金",
    "成本",
    "收益",
    "期限",
    "截止",
    "底线",
    "每天",
    "每周",
    "小时",
    "资源",
    "上限",
    "money",
    "budget",
    "deadline",
    "hours",
    "resources",
];

const REALITY_CHECK_QUESTIONS: [&str; 2] = [
    "基于当前现实，你最多可投入的钱、时间、精力上限分别是多少？",
    "最晚什么时候必须看到可验证结果？",
];

static NUMBER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\d+(\.\d+)?\s*(元|万|小时|h|hr|天|周|月|%|k|w)?")
        .expect("valid number regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskType {
    Execution,
    ComplexDecision,
    ConceptExploration,
}

impl TaskType {
    /// Whether missing slots must be filled before the pipeline may act.
    pub fn requires_slots_first(self) -> bool {
        matches!(self, Self::Execution | Self::ComplexDecision)
    }

    pub fn required_slots(self) -> &'static [&'static str] {
        match self {
            Self::Execution => &["environment", "target", "success_criteria"],
            Self::ComplexDecision => &[
                "done_definition",
                "money_budget",
                "money_deadline",
                "time_budget",
                "energy_budget",
                "bottom_line",
                "resources",
            ],
            Self::ConceptExploration => &["done_definition", "purpose"],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellBias {
    pub hit: bool,
    pub shell_evidence: Vec<String>,
    pub decision_evidence: Vec<String>,
    pub has_reality_signal: bool,
    pub questions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakeResult {
    pub task_type: TaskType,
    pub required_slots: Vec<String>,
    pub missing_slots: Vec<String>,
    pub questions: Vec<String>,
    pub shell_bias: ShellBias,
}

pub fn detect_task_type(message: &str) -> TaskType {
    let text = message.to_lowercase();
    if EXECUTION_MARKERS.iter().any(|k| text.contains(k)) {
        TaskType::Execution
    } else if COMPLEX_DECISION_MARKERS.iter().any(|k| text.contains(k)) {
        TaskType::ComplexDecision
    } else {
        TaskType::ConceptExploration
    }
}

fn slot_question(slot: &str) -> Option<&'static str> {
    Some(match slot {
        "done_definition" => "做成什么算 done？（一句话）",
        "money_budget" => "钱：你最多可投入多少？",
        "money_deadline" => "钱：最晚多久必须见到收益？",
        "time_budget" => "时间：每天/每周最多可投入多少？",
        "energy_budget" => "精力：每天高质量工作上限多少小时？",
        "bottom_line" => "底线：绝对不能发生什么？",
        "resources" => "已有资源是什么？（技能/渠道/资产）",
        "environment" => "运行环境是什么？（系统/权限/工具）",
        "target" => "目标对象是什么？（标题/路径/名称）",
        "success_criteria" => "验收标准是什么？",
        "purpose" => "这次讨论要产出什么？",
        _ => return None,
    })
}

/// Clarifying questions for the first missing slots, at most [`MAX_QUESTIONS`].
pub fn make_questions(missing_slots: &[String]) -> Vec<String> {
    missing_slots
        .iter()
        .filter_map(|s| slot_question(s))
        .take(MAX_QUESTIONS)
        .map(String::from)
        .collect()
}

fn collect_hits(text: &str, markers: &[&str]) -> Vec<String> {
    markers
        .iter()
        .filter(|m| text.contains(*m))
        .map(|m| (*m).to_string())
        .collect()
}

fn has_number(text: &str) -> bool {
    NUMBER_PATTERN.is_match(text)
}

pub fn detect_shell_bias(message: &str) -> ShellBias {
    let text = message.trim().to_lowercase();
    let shell_evidence = collect_hits(&text, SHELL_MARKERS);
    let decision_evidence = collect_hits(&text, DECISION_MARKERS);
    let has_reality_signal =
        REALITY_MARKERS.iter().any(|m| text.contains(m)) || has_number(&text);

    let hit = !shell_evidence.is_empty() && !decision_evidence.is_empty() && !has_reality_signal;
    let questions = if hit {
        REALITY_CHECK_QUESTIONS.iter().map(|q| (*q).to_string()).collect()
    } else {
        Vec::new()
    };

    ShellBias {
        hit,
        shell_evidence,
        decision_evidence,
        has_reality_signal,
        questions,
    }
}

/// Run intake for one message. A known slot counts only when its value is
/// non-blank.
pub fn run(message: &str, known_slots: &BTreeMap<String, String>) -> IntakeResult {
    let task_type = detect_task_type(message);
    let required_slots: Vec<String> = task_type
        .required_slots()
        .iter()
        .map(|s| (*s).to_string())
        .collect();
    let missing_slots: Vec<String> = required_slots
        .iter()
        .filter(|s| known_slots.get(*s).is_none_or(|v| v.trim().is_empty()))
        .cloned()
        .collect();
    let questions = make_questions(&missing_slots);

    IntakeResult {
        task_type,
        required_slots,
        missing_slots,
        questions,
        shell_bias: detect_shell_bias(message),
    }
}
