//! Continuity cost: how expensive an event is to the user's resource
//! continuity, plus the derived memory layer, memory weight and risk vector.

use serde::{Deserialize, Serialize};

use crate::core::impact::EventImpactResult;
use crate::core::state::{Axis, AxisMap, UserState, scarcity_weights};

pub const MAX_COST: f64 = 10.0;
const IRREVERSIBLE_MULTIPLIER: f64 = 5.0;

/// Length of the risk embedding. Element order is part of the storage
/// contract: six `|delta|` in [`Axis`] order, then cost, then irreversibility.
pub const RISK_VECTOR_DIM: usize = 8;
pub type RiskVector = [f64; RISK_VECTOR_DIM];

/// Severity tier derived from continuity cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum MemoryLayer {
    L1 = 1,
    L2 = 2,
    L3 = 3,
    L4 = 4,
}

impl MemoryLayer {
    pub fn from_cost(cost: f64) -> Self {
        if cost < 0.3 {
            Self::L1
        } else if cost < 0.7 {
            Self::L2
        } else if cost < 0.9 {
            Self::L3
        } else {
            Self::L4
        }
    }

    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Penalty multiplier for this layer from the configured 4-step ladder.
    pub fn multiplier(self, ladder: &[f64; 4]) -> f64 {
        ladder[usize::from(self.as_u8() - 1)]
    }
}

impl From<MemoryLayer> for u8 {
    fn from(layer: MemoryLayer) -> Self {
        layer.as_u8()
    }
}

impl TryFrom<u8> for MemoryLayer {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(Self::L1),
            2 => Ok(Self::L2),
            3 => Ok(Self::L3),
            4 => Ok(Self::L4),
            other => Err(format!("memory layer out of range: {other}")),
        }
    }
}

/// Cross-axis spillover multipliers, all starting at 1.0.
pub fn transfer_amplifiers(impact: &EventImpactResult, state: &UserState) -> AxisMap<f64> {
    let mut amps = AxisMap::splat(1.0_f64);
    let delta = &impact.impact_vector;

    if delta[Axis::Asset] <= -0.6 && state.value(Axis::Time) <= 0.4 {
        amps[Axis::Energy] = amps[Axis::Energy].max(1.4);
    }
    if delta[Axis::Money] <= -0.4 && state.value(Axis::Identity) <= 0.5 {
        amps[Axis::Identity] = amps[Axis::Identity].max(1.3);
    }
    if impact.system_caused && delta[Axis::Reliability] < 0.0 {
        amps[Axis::Reliability] = amps[Axis::Reliability].max(1.5);
    }
    amps
}

/// `Σ |delta| · weight · amplifier`, ×5 when irreversible, clamped to `[0, 10]`.
pub fn calculate(impact: &EventImpactResult, weights: &AxisMap<f64>, state: &UserState) -> f64 {
    let amps = transfer_amplifiers(impact, state);
    let mut cost: f64 = Axis::ALL
        .iter()
        .map(|&axis| impact.impact_vector[axis].abs() * weights[axis] * amps[axis])
        .sum();

    if impact.irreversible {
        cost *= IRREVERSIBLE_MULTIPLIER;
    }
    if cost.is_nan() {
        return 0.0;
    }
    cost.clamp(0.0, MAX_COST)
}

pub fn memory_layer(cost: f64) -> MemoryLayer {
    MemoryLayer::from_cost(cost)
}

pub fn memory_weight(cost: f64, irreversible: bool) -> f64 {
    let factor = if irreversible { 1.5 } else { 1.0 };
    (cost * factor).clamp(0.0, 1.0)
}

pub fn risk_vector(impact: &EventImpactResult, cost: f64) -> RiskVector {
    let mut v = [0.0; RISK_VECTOR_DIM];
    for axis in Axis::ALL {
        v[axis.index()] = impact.impact_vector[axis].abs();
    }
    v[6] = cost;
    v[7] = if impact.irreversible { 1.0 } else { 0.0 };
    v
}

/// Everything the pipeline derives from one impact against one state.
#[derive(Debug, Clone, PartialEq)]
pub struct CostAssessment {
    pub cost: f64,
    pub layer: MemoryLayer,
    pub weight: f64,
    pub risk_vector: RiskVector,
}

impl CostAssessment {
    pub fn assess(impact: &EventImpactResult, state: &UserState) -> Self {
        let weights = scarcity_weights(state);
        let cost = calculate(impact, &weights, state);
        Self {
            cost,
            layer: memory_layer(cost),
            weight: memory_weight(cost, impact.irreversible),
            risk_vector: risk_vector(impact, cost),
        }
    }
}
