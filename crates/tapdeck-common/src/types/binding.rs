//! Bindings and scan results
//!
//! A [`Binding`] associates a tag with an [`Action`]. The persisted form is
//! the flat [`BindingRecord`]; converting a record back into a binding
//! re-runs every validation rule.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::action::{Action, ActionKind};
use super::tag_uid::TagUid;
use crate::error::ValidationError;

/// A tag bound to an action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Binding {
    /// Registry key
    pub uid: TagUid,

    /// Free-text display label
    pub alias: Option<String>,

    /// Action triggered when the tag is scanned
    #[serde(flatten)]
    pub action: Action,

    /// Last time the event loop resolved this tag. Not persisted.
    pub last_scanned: Option<DateTime<Utc>>,
}

impl Binding {
    pub fn new(uid: TagUid, action: Action) -> Self {
        Self {
            uid,
            alias: None,
            action,
            last_scanned: None,
        }
    }

    /// Set the alias; blank aliases are dropped
    pub fn with_alias(mut self, alias: Option<impl Into<String>>) -> Self {
        self.alias = alias
            .map(Into::into)
            .map(|a: String| a.trim().to_string())
            .filter(|a| !a.is_empty());
        self
    }

    pub fn kind(&self) -> ActionKind {
        self.action.kind()
    }

    pub fn parameter(&self) -> Option<String> {
        self.action.parameter()
    }

    /// Alias when set, uid otherwise
    pub fn label(&self) -> &str {
        self.alias.as_deref().unwrap_or(self.uid.as_str())
    }

}

impl std::fmt::Display for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.uid, self.action)?;
        if let Some(alias) = &self.alias {
            write!(f, " ({alias})")?;
        }
        Ok(())
    }
}

/// On-disk form of a binding
///
/// Accepts `action_class` and `type` as names for `action_kind`, and empty
/// strings for absent alias or parameter, so older snapshots load. Entries
/// of a keyed snapshot may leave `uid` out; the key supplies it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingRecord {
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(alias = "action_class", alias = "type")]
    pub action_kind: String,
    #[serde(default)]
    pub parameter: Option<String>,
}

impl From<&Binding> for BindingRecord {
    fn from(binding: &Binding) -> Self {
        Self {
            uid: binding.uid.to_string(),
            alias: binding.alias.clone(),
            action_kind: binding.kind().name().to_string(),
            parameter: binding.parameter(),
        }
    }
}

impl TryFrom<BindingRecord> for Binding {
    type Error = ValidationError;

    fn try_from(record: BindingRecord) -> Result<Self, Self::Error> {
        let uid = TagUid::parse(&record.uid)?;
        let action = Action::from_parts(&record.action_kind, record.parameter.as_deref())?;
        Ok(Binding::new(uid, action).with_alias(record.alias))
    }
}

/// Outcome of the most recent accepted scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LatestResult {
    pub uid: TagUid,
    /// The binding the scan resolved to, `None` for unknown tags
    pub resolved: Option<Binding>,
    pub scanned_at: DateTime<Utc>,
}

impl LatestResult {
    pub fn is_registered(&self) -> bool {
        self.resolved.is_some()
    }
}
