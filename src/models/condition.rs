use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name of a condition within a [`Conditions`] set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConditionType(String);

impl ConditionType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConditionType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ConditionType {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Overall readiness of an object. Every object reporting conditions sets this one.
pub const READY: &str = "Ready";

/// Parent-facing condition that tracks the readiness of the node's external compute.
pub const NOVA_COMPUTE_READY: &str = "NovaComputeReady";

/// Observed state of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl ConditionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::True => "True",
            Self::False => "False",
            Self::Unknown => "Unknown",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "True" => Some(Self::True),
            "False" => Some(Self::False),
            "Unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How bad a non-True condition is.
///
/// - `Error`: the object cannot make progress without intervention
/// - `Warning`: degraded but progressing
/// - `Info`: still converging, e.g. waiting on a dependency
/// - `None`: no classification (True and Unknown conditions)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Info,
    #[default]
    #[serde(rename = "")]
    None,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "Error",
            Self::Warning => "Warning",
            Self::Info => "Info",
            Self::None => "",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Error" => Some(Self::Error),
            "Warning" => Some(Self::Warning),
            "Info" => Some(Self::Info),
            "" => Some(Self::None),
            _ => None,
        }
    }
}

/// A named status entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    pub status: ConditionStatus,
    #[serde(default, skip_serializing_if = "is_unclassified")]
    pub severity: Severity,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
}

fn is_unclassified(severity: &Severity) -> bool {
    *severity == Severity::None
}

impl Condition {
    pub fn true_(
        condition_type: impl Into<ConditionType>,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            condition_type: condition_type.into(),
            status: ConditionStatus::True,
            severity: Severity::None,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }

    pub fn false_(
        condition_type: impl Into<ConditionType>,
        severity: Severity,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            condition_type: condition_type.into(),
            status: ConditionStatus::False,
            severity,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }

    pub fn unknown(
        condition_type: impl Into<ConditionType>,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            condition_type: condition_type.into(),
            status: ConditionStatus::Unknown,
            severity: Severity::None,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }

    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }
}

/// Ordered set of conditions, at most one per [`ConditionType`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conditions(Vec<Condition>);

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, condition_type: &ConditionType) -> Option<&Condition> {
        self.0.iter().find(|c| &c.condition_type == condition_type)
    }

    /// Insert `condition`, replacing any entry of the same type in place.
    pub fn set(&mut self, condition: Condition) {
        match self
            .0
            .iter_mut()
            .find(|c| c.condition_type == condition.condition_type)
        {
            Some(existing) => *existing = condition,
            None => self.0.push(condition),
        }
    }

    /// Copy this set's `Ready` condition under `target`.
    ///
    /// Status, severity, reason and message are kept; the transition time is
    /// the time of the copy. Returns `None` when `Ready` has not been reported.
    pub fn mirror(&self, target: impl Into<ConditionType>) -> Option<Condition> {
        let ready = self.get(&ConditionType::from(READY))?;
        Some(Condition {
            condition_type: target.into(),
            last_transition_time: Utc::now(),
            ..ready.clone()
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Condition> for Conditions {
    fn from_iter<I: IntoIterator<Item = Condition>>(iter: I) -> Self {
        let mut conditions = Conditions::new();
        for condition in iter {
            conditions.set(condition);
        }
        conditions
    }
}

/// Whether `condition` reports an explicit error.
///
/// Only `False` with [`Severity::Error`] counts. `Unknown`, or `False` with a
/// lower severity, means the object is still converging.
pub fn is_error(condition: Option<&Condition>) -> bool {
    matches!(
        condition,
        Some(Condition {
            status: ConditionStatus::False,
            severity: Severity::Error,
            ..
        })
    )
}
