//! World configuration snapshot
//!
//! Loaded once from TOML at startup and passed by reference into the engine.
//! Nothing in the quest core reads ambient global state.

use std::path::Path;

use serde::Deserialize;

use crate::error::QuestError;

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Maximum number of quest log slots per player.
    pub quest_log_capacity: usize,
    /// Maximum distance at which a quest giver can be used.
    pub interaction_distance: f32,
    /// Maximum distance at which party members share quest offers and credit.
    pub group_reward_distance: f32,
    /// Whether game objects report quest markers on status query.
    pub object_quest_markers: bool,
    /// Whether completions/abandons are recorded in the quest tracker.
    pub quest_tracker_enabled: bool,
    /// Disallow quest sharing while the sharer is inside a battleground.
    pub disable_quest_share_in_bg: bool,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            quest_log_capacity: 25,
            interaction_distance: 5.5,
            group_reward_distance: 75.0,
            object_quest_markers: false,
            quest_tracker_enabled: false,
            disable_quest_share_in_bg: false,
        }
    }
}

impl WorldConfig {
    pub fn load(path: &Path) -> Result<Self, QuestError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| QuestError::Config(format!("failed to read {:?}: {}", path, e)))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, QuestError> {
        toml::from_str(content).map_err(|e| QuestError::Config(e.to_string()))
    }
}
