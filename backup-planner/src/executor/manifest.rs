//! The `actions.json` file: the planned action list of one snapshot.
//!
//! Stored as a bare JSON array next to `metadata.json`, so a saved plan can be
//! inspected or replayed later.

use crate::sync::action::Action;
use crate::utils::errors::Result;
use std::fs;
use std::path::Path;

/// File name of the persisted plan
pub const ACTIONS_FILENAME: &str = "actions.json";

/// Save `actions` into `snapshot_dir`
pub fn write_actions(snapshot_dir: &Path, actions: &[Action]) -> Result<()> {
    let content = serde_json::to_string_pretty(actions)?;
    fs::write(snapshot_dir.join(ACTIONS_FILENAME), content)?;
    Ok(())
}

/// Load the plan saved in `snapshot_dir`
pub fn read_actions(snapshot_dir: &Path) -> Result<Vec<Action>> {
    let content = fs::read_to_string(snapshot_dir.join(ACTIONS_FILENAME))?;
    Ok(serde_json::from_str(&content)?)
}
