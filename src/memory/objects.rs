//! Long-lived memory objects: the user's current shell and reusable success
//! paths. Rows are append-only; for reads the newest `updated_at` wins.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{ContinuityError, Result};

pub const OBJECT_SCHEMA_VERSION: &str = "om_object_v1";

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConfidenceLevel {
    #[default]
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn rank(self) -> f64 {
        match self {
            Self::High => 1.0,
            Self::Medium => 0.6,
            Self::Low => 0.3,
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Validity {
    #[default]
    Long,
    Medium,
    Short,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ObjectType {
    Shell,
    SuccessPath,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShellSource {
    #[default]
    User,
    Inferred,
}

/// Inferred social-interface and narrative context for a user.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ShellPayload {
    #[serde(default)]
    pub social_interface: Map<String, Value>,
    #[serde(default)]
    pub narratives: Map<String, Value>,
    #[serde(default)]
    pub source: ShellSource,
}

/// A named procedure known to satisfy an intent.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SuccessPathPayload {
    pub name: String,
    pub intent: String,
    #[serde(default)]
    pub required_slots: Vec<String>,
    #[serde(default)]
    pub slot_definitions: BTreeMap<String, String>,
    pub procedure: String,
    pub success_criteria: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl SuccessPathPayload {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ContinuityError::Validation(
                "success path name must not be empty".into(),
            ));
        }
        let missing: Vec<&str> = self
            .required_slots
            .iter()
            .filter(|s| !self.slot_definitions.contains_key(*s))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(ContinuityError::Validation(format!(
                "missing slot_definitions for: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MemoryObjectKind {
    Shell(ShellPayload),
    SuccessPath(SuccessPathPayload),
}

impl MemoryObjectKind {
    pub fn object_type(&self) -> ObjectType {
        match self {
            Self::Shell(_) => ObjectType::Shell,
            Self::SuccessPath(_) => ObjectType::SuccessPath,
        }
    }
}

/// Versioned on-disk form of an object's payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPayload {
    pub schema_version: String,
    #[serde(flatten)]
    pub kind: MemoryObjectKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryObject {
    pub object_id: Uuid,
    pub user_id: String,
    pub confidence: ConfidenceLevel,
    pub validity: Validity,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: MemoryObjectKind,
}

impl MemoryObject {
    pub fn new(
        user_id: impl Into<String>,
        kind: MemoryObjectKind,
        confidence: ConfidenceLevel,
        validity: Validity,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            object_id: Uuid::new_v4(),
            user_id: user_id.into(),
            confidence,
            validity,
            updated_at: now,
            kind,
        }
    }

    pub fn object_type(&self) -> ObjectType {
        self.kind.object_type()
    }

    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            MemoryObjectKind::Shell(_) => None,
            MemoryObjectKind::SuccessPath(sp) => Some(&sp.name),
        }
    }

    pub fn as_success_path(&self) -> Option<&SuccessPathPayload> {
        match &self.kind {
            MemoryObjectKind::SuccessPath(sp) => Some(sp),
            MemoryObjectKind::Shell(_) => None,
        }
    }

    pub fn stored_payload(&self) -> StoredPayload {
        StoredPayload {
            schema_version: OBJECT_SCHEMA_VERSION.into(),
            kind: self.kind.clone(),
        }
    }

    /// Line-oriented lexical index, independent of the structured payload.
    pub fn text_index(&self, updated_at: &str) -> String {
        let (name, intent, slots, tags) = match &self.kind {
            MemoryObjectKind::Shell(_) => ("", "", String::new(), String::new()),
            MemoryObjectKind::SuccessPath(sp) => (
                sp.name.as_str(),
                sp.intent.as_str(),
                sp.required_slots.join(","),
                sp.tags.join(","),
            ),
        };
        [
            "[OM-OBJECT v1]".to_string(),
            format!("type:{}", self.object_type()),
            format!("name:{name}"),
            format!("intent:{intent}"),
            format!("slots:{slots}"),
            format!("tags:{tags}"),
            format!("updated_at:{updated_at}"),
        ]
        .join("\n")
    }
}

/// Caller-supplied shell write.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShellWrite {
    #[serde(default)]
    pub social_interface: Map<String, Value>,
    #[serde(default)]
    pub narratives: Map<String, Value>,
    #[serde(default)]
    pub confidence: ConfidenceLevel,
    #[serde(default)]
    pub validity: Validity,
    #[serde(default)]
    pub source: ShellSource,
}

impl ShellWrite {
    pub fn into_object(self, user_id: &str, now: DateTime<Utc>) -> MemoryObject {
        MemoryObject::new(
            user_id,
            MemoryObjectKind::Shell(ShellPayload {
                social_interface: self.social_interface,
                narratives: self.narratives,
                source: self.source,
            }),
            self.confidence,
            self.validity,
            now,
        )
    }
}

/// Caller-supplied success path write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessPathWrite {
    #[serde(flatten)]
    pub path: SuccessPathPayload,
    #[serde(default)]
    pub confidence: ConfidenceLevel,
    #[serde(default)]
    pub validity: Validity,
}

impl SuccessPathWrite {
    pub fn into_object(self, user_id: &str, now: DateTime<Utc>) -> Result<MemoryObject> {
        self.path.validate()?;
        Ok(MemoryObject::new(
            user_id,
            MemoryObjectKind::SuccessPath(self.path),
            self.confidence,
            self.validity,
            now,
        ))
    }
}
