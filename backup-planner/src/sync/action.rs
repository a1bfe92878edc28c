//! Planned filesystem mutations.
//!
//! The serialized form is what ends up in `actions.json`:
//! `{"type": "copy", "params": {"name": "dir/file.txt", "reason": "new"}}`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kind of a planned action
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    /// Source to target
    Copy,
    /// Remove from target
    Delete,
    /// Link target to the comparison snapshot's copy
    Hardlink,
    /// Reserved for move detection: rename inside target (`name` to `to`)
    Rename,
    /// Reserved for move detection: link comparison `name` to target `to`
    Hardlink2,
    /// Anything this build does not know; skipped on execution
    #[serde(other)]
    Unknown,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Copy => "copy",
            ActionKind::Delete => "delete",
            ActionKind::Hardlink => "hardlink",
            ActionKind::Rename => "rename",
            ActionKind::Hardlink2 => "hardlink2",
            ActionKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the planner emitted an action; only used by reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    New,
    Changed,
    Unchanged,
    Removed,
    EmptyDir,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::New => "new",
            Reason::Changed => "changed",
            Reason::Unchanged => "unchanged",
            Reason::Removed => "removed",
            Reason::EmptyDir => "empty-dir",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionParams {
    /// Relative path the action applies to
    pub name: String,

    /// Second path of the reserved two-path kinds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,

    /// Presentation hints; ignored by the executor
    #[serde(flatten)]
    pub hints: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub params: ActionParams,
}

impl Action {
    pub fn new(kind: ActionKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            params: ActionParams {
                name: name.into(),
                to: None,
                hints: BTreeMap::new(),
            },
        }
    }

    pub fn copy(name: impl Into<String>) -> Self {
        Self::new(ActionKind::Copy, name)
    }

    pub fn delete(name: impl Into<String>) -> Self {
        Self::new(ActionKind::Delete, name)
    }

    pub fn hardlink(name: impl Into<String>) -> Self {
        Self::new(ActionKind::Hardlink, name)
    }

    /// Attach a `reason` hint
    pub fn because(mut self, reason: Reason) -> Self {
        self.params
            .hints
            .insert("reason".to_string(), serde_json::Value::from(reason.as_str()));
        self
    }

    pub fn name(&self) -> &str {
        &self.params.name
    }

    pub fn reason(&self) -> Option<&str> {
        self.params.hints.get("reason").and_then(|v| v.as_str())
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.params.name)?;
        if let Some(to) = &self.params.to {
            write!(f, " -> {}", to)?;
        }
        Ok(())
    }
}

/// Number of actions per kind, for reports
pub fn count_by_kind(actions: &[Action]) -> BTreeMap<ActionKind, usize> {
    let mut counts = BTreeMap::new();
    for action in actions {
        *counts.entry(action.kind).or_insert(0) += 1;
    }
    counts
}
