//! Post-decision continuity audit. Findings are reported in the trace only
//! and never change the decision.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ContinuityFailure {
    SuccessPathNotReused,
    AskedShouldHaveAsked,
    LostContext,
    HallucinatedContinuity,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AuditInputs {
    pub had_success_path: bool,
    pub used_success_path: bool,
    pub asked_before_try: bool,
    pub user_repeated_context: bool,
    pub hallucinated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuditReport {
    pub continuity_failures: Vec<ContinuityFailure>,
    pub should_clarify_first: bool,
}

pub fn run(inputs: AuditInputs) -> AuditReport {
    let checks = [
        (
            inputs.had_success_path && !inputs.used_success_path,
            ContinuityFailure::SuccessPathNotReused,
        ),
        (!inputs.asked_before_try, ContinuityFailure::AskedShouldHaveAsked),
        (inputs.user_repeated_context, ContinuityFailure::LostContext),
        (inputs.hallucinated, ContinuityFailure::HallucinatedContinuity),
    ];
    let continuity_failures: Vec<ContinuityFailure> = checks
        .into_iter()
        .filter_map(|(failed, kind)| failed.then_some(kind))
        .collect();
    AuditReport {
        should_clarify_first: !continuity_failures.is_empty(),
        continuity_failures,
    }
}
