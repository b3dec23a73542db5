//! Per-user resource model: six axes, each a value and a confidence in `[0, 1]`.
//!
//! Everything here is pure. Persistence lives in [`crate::store`]; the
//! orchestrator is the only caller that mutates a [`UserState`] during a request.

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::core::impact::EventImpactResult;

/// One of the six tracked resource dimensions.
///
/// Declaration order is load-bearing: it is the tie-break priority for
/// [`identify_main_constraint`] and the element order of every risk vector.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Axis {
    #[serde(alias = "delta_money")]
    Money,
    #[serde(alias = "delta_time")]
    Time,
    #[serde(alias = "delta_energy")]
    Energy,
    #[serde(alias = "delta_asset")]
    Asset,
    #[serde(alias = "delta_reliability")]
    Reliability,
    #[serde(alias = "delta_identity")]
    Identity,
}

impl Axis {
    pub const ALL: [Axis; 6] = [
        Axis::Money,
        Axis::Time,
        Axis::Energy,
        Axis::Asset,
        Axis::Reliability,
        Axis::Identity,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// Fixed-size map keyed by [`Axis`]. Serializes as a JSON object keyed by the
/// snake_case axis name; missing keys deserialize to `T::default()`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AxisMap<T>([T; 6]);

impl<T> AxisMap<T> {
    pub fn from_fn(mut f: impl FnMut(Axis) -> T) -> Self {
        Self(Axis::ALL.map(&mut f))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Axis, &T)> {
        Axis::ALL.into_iter().zip(self.0.iter())
    }

    pub fn map<U>(&self, mut f: impl FnMut(Axis, &T) -> U) -> AxisMap<U> {
        AxisMap::from_fn(|axis| f(axis, &self[axis]))
    }

    pub fn values(&self) -> &[T; 6] {
        &self.0
    }
}

impl<T: Copy> AxisMap<T> {
    pub const fn splat(value: T) -> Self {
        Self([value; 6])
    }
}

impl<T> Index<Axis> for AxisMap<T> {
    type Output = T;

    fn index(&self, axis: Axis) -> &T {
        &self.0[axis.index()]
    }
}

impl<T> IndexMut<Axis> for AxisMap<T> {
    fn index_mut(&mut self, axis: Axis) -> &mut T {
        &mut self.0[axis.index()]
    }
}

impl<T: Serialize> Serialize for AxisMap<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(6))?;
        for (axis, value) in self.iter() {
            map.serialize_entry(axis.as_str(), value)?;
        }
        map.end()
    }
}

impl<'de, T> Deserialize<'de> for AxisMap<T>
where
    T: Deserialize<'de> + Default,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AxisMapVisitor<T>(PhantomData<T>);

        impl<'de, T> Visitor<'de> for AxisMapVisitor<T>
        where
            T: Deserialize<'de> + Default,
        {
            type Value = AxisMap<T>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map keyed by resource axis")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut out: AxisMap<T> = AxisMap::from_fn(|_| T::default());
                while let Some((axis, value)) = access.next_entry::<Axis, T>()? {
                    out[axis] = value;
                }
                Ok(out)
            }
        }

        deserializer.deserialize_map(AxisMapVisitor(PhantomData))
    }
}

impl From<AxisMap<f64>> for BTreeMap<Axis, f64> {
    fn from(map: AxisMap<f64>) -> Self {
        map.iter().map(|(axis, v)| (axis, *v)).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AxisReading {
    pub value: f64,
    pub confidence: f64,
}

impl AxisReading {
    const fn new(value: f64, confidence: f64) -> Self {
        Self { value, confidence }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserState {
    pub user_id: String,
    pub axes: AxisMap<AxisReading>,
    pub main_constraint: Option<Axis>,
    pub uncertainty_meta: f64,
    pub update_count: i64,
    pub last_updated: Option<DateTime<Utc>>,
}

impl UserState {
    /// Fresh state for a user seen for the first time.
    pub fn new(user_id: impl Into<String>) -> Self {
        let mut axes = AxisMap::splat(AxisReading::new(0.5, 0.3));
        axes[Axis::Reliability] = AxisReading::new(0.8, 0.5);
        Self {
            user_id: user_id.into(),
            axes,
            main_constraint: None,
            uncertainty_meta: 0.0,
            update_count: 0,
            last_updated: None,
        }
    }

    pub fn value(&self, axis: Axis) -> f64 {
        self.axes[axis].value
    }

    /// Fold one extracted impact into the state. Returns the per-axis
    /// before/after readings so the caller can log evidence.
    pub fn apply_impact(
        &mut self,
        impact: &EventImpactResult,
        now: DateTime<Utc>,
    ) -> AxisMap<AxisTransition> {
        let transitions = AxisMap::from_fn(|axis| {
            let before = self.axes[axis];
            let (value, confidence) = update_axis(self, impact, axis);
            AxisTransition {
                before,
                after: AxisReading { value, confidence },
            }
        });
        for (axis, t) in transitions.iter() {
            self.axes[axis] = t.after;
        }

        self.main_constraint = Some(identify_main_constraint(self));
        self.uncertainty_meta = (1.0 - impact.analysis_confidence).clamp(0.0, 1.0);
        self.update_count += 1;
        self.last_updated = Some(now);
        transitions
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisTransition {
    pub before: AxisReading,
    pub after: AxisReading,
}

/// Conservative update of one axis: the step is at most `0.25 · |delta|`.
pub fn update_axis(state: &UserState, impact: &EventImpactResult, axis: Axis) -> (f64, f64) {
    let reading = state.axes[axis];
    let delta = impact.impact_vector[axis];
    let evidence_conf = impact.axis_confidence[axis];

    let alpha = 0.25 * evidence_conf.clamp(0.1, 1.0);
    let value = (reading.value + alpha * delta).clamp(0.0, 1.0);
    let confidence = f64::midpoint(reading.confidence, evidence_conf).clamp(0.0, 1.0);
    (value, confidence)
}

/// Scarcer resource, higher weight. Piecewise-linear in `x = 1 - value`,
/// strictly increasing, bounded to `[0, 1.2]`.
pub fn scarcity_weight(value: f64) -> f64 {
    let x = (1.0 - value).clamp(0.0, 1.0);
    let w = if x < 0.25 {
        0.15 + x * 0.8
    } else if x < 0.5 {
        0.35 + (x - 0.25) * 1.2
    } else if x < 0.75 {
        0.65 + (x - 0.5) * 1.2
    } else {
        0.95 + (x - 0.75) * 0.2
    };
    w.clamp(0.0, 1.2)
}

pub fn scarcity_weights(state: &UserState) -> AxisMap<f64> {
    state.axes.map(|_, reading| scarcity_weight(reading.value))
}

/// Axis with the highest scarcity weight; ties go to the earlier axis.
pub fn identify_main_constraint(state: &UserState) -> Axis {
    let weights = scarcity_weights(state);
    let mut best = Axis::Money;
    for axis in Axis::ALL {
        if weights[axis] > weights[best] {
            best = axis;
        }
    }
    best
}
