//! Status conditions.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Condition type reporting whether a source's labels reached the namespace.
pub const LABELS_APPLIED: &str = "LabelsApplied";

/// Tri-state status of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl ConditionStatus {
    /// The wire representation (`"True"`, `"False"`, `"Unknown"`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::True => "True",
            Self::False => "False",
            Self::Unknown => "Unknown",
        }
    }

    /// Parse the wire representation. Anything unrecognised is `Unknown`.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "True" => Self::True,
            "False" => Self::False,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed, timestamped outcome entry on a source's status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub type_: String,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a new condition stamped with `now`.
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: now,
        }
    }
}

/// Upsert `condition` into `conditions` by type.
///
/// An existing condition of the same type is updated in place and keeps its
/// position; its transition time only moves when the status changes. A new
/// type is appended. Returns `true` if anything changed.
pub fn upsert(conditions: &mut Vec<Condition>, condition: Condition) -> bool {
    let Some(existing) = conditions.iter_mut().find(|c| c.type_ == condition.type_) else {
        conditions.push(condition);
        return true;
    };

    let mut changed = false;
    if existing.status != condition.status {
        existing.status = condition.status;
        existing.last_transition_time = condition.last_transition_time;
        changed = true;
    }
    if existing.reason != condition.reason {
        existing.reason = condition.reason;
        changed = true;
    }
    if existing.message != condition.message {
        existing.message = condition.message;
        changed = true;
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
    }

    #[test]
    fn test_upsert_appends_new_type() {
        let mut conditions = Vec::new();
        let changed = upsert(
            &mut conditions,
            Condition::new(LABELS_APPLIED, ConditionStatus::True, "Success", "ok", at(1)),
        );
        assert!(changed);
        assert_eq!(conditions.len(), 1);
    }

    #[test]
    fn test_upsert_keeps_one_condition_per_type() {
        let mut conditions = vec![
            Condition::new("Other", ConditionStatus::True, "X", "x", at(1)),
            Condition::new(LABELS_APPLIED, ConditionStatus::True, "Success", "ok", at(1)),
        ];
        upsert(
            &mut conditions,
            Condition::new(LABELS_APPLIED, ConditionStatus::False, "Conflict", "boom", at(5)),
        );

        assert_eq!(conditions.len(), 2);
        let applied = conditions.get(1);
        assert_eq!(applied.map(|c| c.status), Some(ConditionStatus::False));
        assert_eq!(applied.map(|c| c.last_transition_time), Some(at(5)));
        assert_eq!(conditions.first().map(|c| c.type_.as_str()), Some("Other"));
    }

    #[test]
    fn test_upsert_same_status_keeps_transition_time() {
        let mut conditions = vec![Condition::new(
            LABELS_APPLIED,
            ConditionStatus::True,
            "Success",
            "ok",
            at(1),
        )];
        let changed = upsert(
            &mut conditions,
            Condition::new(LABELS_APPLIED, ConditionStatus::True, "Success", "ok", at(9)),
        );
        assert!(!changed);
        assert_eq!(conditions.first().map(|c| c.last_transition_time), Some(at(1)));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(ConditionStatus::parse("True"), ConditionStatus::True);
        assert_eq!(ConditionStatus::parse("False"), ConditionStatus::False);
        assert_eq!(ConditionStatus::parse("maybe"), ConditionStatus::Unknown);
        assert_eq!(ConditionStatus::False.to_string(), "False");
    }
}
