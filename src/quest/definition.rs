//! Quest Definition Structures
//!
//! Static quest data, deserialized from TOML quest files at startup and
//! immutable afterwards. Raw structs mirror the TOML layout; `QuestDefinition`
//! is the validated, resolved form shared by reference across all sessions.

use serde::{Deserialize, Serialize};

pub type QuestId = u32;
pub type ItemId = u32;
pub type FactionId = u32;

/// A quest file on disk
#[derive(Debug, Clone, Deserialize)]
pub struct RawQuestFile {
    pub quest: RawQuest,
}

/// Raw quest data as it appears in TOML
#[derive(Debug, Clone, Deserialize)]
pub struct RawQuest {
    pub id: QuestId,
    pub title: String,
    #[serde(default)]
    pub min_level: u32,
    /// All of these must be rewarded before the quest can be taken
    #[serde(default)]
    pub required_quests: Vec<QuestId>,
    /// None of these may be active or rewarded
    #[serde(default)]
    pub exclusive_with: Vec<QuestId>,
    /// Minimum standing with a faction required to take the quest
    #[serde(default)]
    pub required_reputation: Option<ReputationGate>,
    #[serde(default)]
    pub objectives: Vec<RawObjective>,
    /// Standings that must be reached before the quest can complete, at most
    /// two factions
    #[serde(default)]
    pub reputation_objectives: Vec<ReputationGate>,
    /// Items that must be turned in on completion
    #[serde(default)]
    pub required_items: Vec<ItemAmount>,
    /// Item handed to the player when the quest is accepted
    #[serde(default)]
    pub source_item: Option<SourceItem>,
    /// Player picks exactly one of these on turn-in
    #[serde(default)]
    pub reward_choices: Vec<ItemAmount>,
    /// Always granted on turn-in
    #[serde(default)]
    pub reward_items: Vec<ItemAmount>,
    /// Negative values charge the player instead of paying them
    #[serde(default)]
    pub reward_money: i64,
    /// Standing floors applied on turn-in, at most two factions
    #[serde(default)]
    pub reputation_rewards: Vec<ReputationGate>,
    /// Follow-on quest offered after this one is rewarded
    #[serde(default)]
    pub next_quest: Option<QuestId>,
    /// Effect fired once when the quest is first accepted
    #[serde(default)]
    pub start_effect: Option<u32>,
    /// Timed quests fail when this runs out
    #[serde(default)]
    pub time_limit_secs: Option<u64>,
    #[serde(default)]
    pub flags: QuestFlags,
}

/// Raw objective as it appears in TOML
#[derive(Debug, Clone, Deserialize)]
pub struct RawObjective {
    #[serde(rename = "type")]
    pub kind: String,
    pub target: u32,
    #[serde(default = "default_count")]
    pub count: u32,
}

fn default_count() -> u32 {
    1
}

// ============================================================================
// Resolved Quest Structures (after parsing)
// ============================================================================

/// Objective kinds supported by the quest engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveKind {
    /// Kill N creatures of a template
    Kill,
    /// Hold N of an item
    Collect,
    /// Enter an area
    Explore,
    /// Cast a spell on a target N times
    CastSpell,
}

impl ObjectiveKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "kill" => Some(ObjectiveKind::Kill),
            "collect" => Some(ObjectiveKind::Collect),
            "explore" => Some(ObjectiveKind::Explore),
            "cast_spell" | "cast" => Some(ObjectiveKind::CastSpell),
            _ => None,
        }
    }
}

/// A resolved quest objective
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Objective {
    pub kind: ObjectiveKind,
    /// Creature template / item id / area id / spell id, by kind
    pub target: u32,
    pub required: u32,
}

impl Objective {
    pub fn from_raw(raw: &RawObjective) -> Option<Self> {
        let kind = ObjectiveKind::from_str(&raw.kind)?;
        Some(Self {
            kind,
            target: raw.target,
            required: raw.count.max(1),
        })
    }
}

/// An item id with a stack count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemAmount {
    pub item_id: ItemId,
    #[serde(default = "default_count")]
    pub count: u32,
}

/// A faction standing threshold, used both as a take-gate and as a
/// turn-in floor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReputationGate {
    pub faction: FactionId,
    pub min: i32,
}

/// The item granted on accept. The sell price matters: quests whose source
/// item can be sold are never player-shareable.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct SourceItem {
    pub item_id: ItemId,
    #[serde(default = "default_count")]
    pub count: u32,
    #[serde(default)]
    pub sell_price: u32,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct QuestFlags {
    /// Can be turned in again after being rewarded
    pub repeatable: bool,
    /// Enters the log without an explicit accept step
    pub auto_accept: bool,
    /// Turn-in needs no prior Complete status
    pub auto_complete: bool,
    /// May be pushed to party members
    pub shareable: bool,
    /// Sharing requires an explicit confirm-accept from each member
    pub party_accept: bool,
    /// Completed purely by entering an area
    pub exploration: bool,
    /// Holding the quest forces the PvP flag on
    pub pvp: bool,
}

/// A fully resolved quest definition
#[derive(Debug, Clone)]
pub struct QuestDefinition {
    pub id: QuestId,
    pub title: String,
    pub min_level: u32,
    pub required_quests: Vec<QuestId>,
    pub exclusive_with: Vec<QuestId>,
    pub required_reputation: Option<ReputationGate>,
    pub objectives: Vec<Objective>,
    pub reputation_objectives: Vec<ReputationGate>,
    pub required_items: Vec<ItemAmount>,
    pub source_item: Option<SourceItem>,
    pub reward_choices: Vec<ItemAmount>,
    pub reward_items: Vec<ItemAmount>,
    pub reward_money: i64,
    pub reputation_rewards: Vec<ReputationGate>,
    pub next_quest: Option<QuestId>,
    pub start_effect: Option<u32>,
    pub time_limit_secs: Option<u64>,
    pub flags: QuestFlags,
}

impl QuestDefinition {
    /// Create a definition from raw TOML data
    pub fn from_raw(raw: &RawQuest) -> Result<Self, String> {
        if raw.id == 0 {
            return Err("quest id 0 is reserved".to_string());
        }

        let objectives: Vec<Objective> = raw
            .objectives
            .iter()
            .enumerate()
            .map(|(i, o)| {
                Objective::from_raw(o)
                    .ok_or_else(|| format!("invalid objective type '{}' at index {}", o.kind, i))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if raw.reputation_rewards.len() > 2 {
            return Err(format!(
                "quest {} declares {} reputation rewards, at most 2 allowed",
                raw.id,
                raw.reputation_rewards.len()
            ));
        }

        if raw.reputation_objectives.len() > 2 {
            return Err(format!(
                "quest {} declares {} reputation objectives, at most 2 allowed",
                raw.id,
                raw.reputation_objectives.len()
            ));
        }

        if raw.exclusive_with.contains(&raw.id) || raw.required_quests.contains(&raw.id) {
            return Err(format!("quest {} references itself", raw.id));
        }

        if raw.next_quest == Some(raw.id) {
            return Err(format!("quest {} chains to itself", raw.id));
        }

        Ok(Self {
            id: raw.id,
            title: raw.title.clone(),
            min_level: raw.min_level,
            required_quests: raw.required_quests.clone(),
            exclusive_with: raw.exclusive_with.clone(),
            required_reputation: raw.required_reputation,
            objectives,
            reputation_objectives: raw.reputation_objectives.clone(),
            required_items: raw.required_items.clone(),
            source_item: raw.source_item,
            reward_choices: raw.reward_choices.clone(),
            reward_items: raw.reward_items.clone(),
            reward_money: raw.reward_money,
            reputation_rewards: raw.reputation_rewards.clone(),
            next_quest: raw.next_quest,
            start_effect: raw.start_effect,
            time_limit_secs: raw.time_limit_secs,
            flags: raw.flags,
        })
    }

    pub fn is_repeatable(&self) -> bool {
        self.flags.repeatable
    }

    pub fn is_auto_accept(&self) -> bool {
        self.flags.auto_accept
    }

    pub fn is_auto_complete(&self) -> bool {
        self.flags.auto_complete
    }

    pub fn is_timed(&self) -> bool {
        self.time_limit_secs.is_some()
    }

    /// A quest with nothing to do before turn-in. These skip the detail
    /// dialog and go straight to the request-items view.
    pub fn is_no_method(&self) -> bool {
        self.objectives.is_empty()
            && self.reputation_objectives.is_empty()
            && self.required_items.is_empty()
            && !self.flags.exploration
    }

    /// Money the player must pay at turn-in, if any.
    pub fn required_money(&self) -> i64 {
        if self.reward_money < 0 {
            -self.reward_money
        } else {
            0
        }
    }

    /// The source item sells for money, so player-sharing it would mint gold.
    pub fn has_sellable_source_item(&self) -> bool {
        self.source_item.map_or(false, |s| s.sell_price > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(id: QuestId) -> RawQuest {
        RawQuest {
            id,
            title: "Test".to_string(),
            min_level: 0,
            required_quests: vec![],
            exclusive_with: vec![],
            required_reputation: None,
            objectives: vec![],
            reputation_objectives: vec![],
            required_items: vec![],
            source_item: None,
            reward_choices: vec![],
            reward_items: vec![],
            reward_money: 0,
            reputation_rewards: vec![],
            next_quest: None,
            start_effect: None,
            time_limit_secs: None,
            flags: QuestFlags::default(),
        }
    }

    #[test]
    fn test_objective_kind_parsing() {
        assert_eq!(ObjectiveKind::from_str("kill"), Some(ObjectiveKind::Kill));
        assert_eq!(ObjectiveKind::from_str("collect"), Some(ObjectiveKind::Collect));
        assert_eq!(ObjectiveKind::from_str("cast_spell"), Some(ObjectiveKind::CastSpell));
        assert_eq!(ObjectiveKind::from_str("dance"), None);
    }

    #[test]
    fn test_rejects_zero_id() {
        assert!(QuestDefinition::from_raw(&raw(0)).is_err());
    }

    #[test]
    fn test_rejects_self_references() {
        let mut r = raw(5);
        r.exclusive_with = vec![5];
        assert!(QuestDefinition::from_raw(&r).is_err());

        let mut r = raw(5);
        r.next_quest = Some(5);
        assert!(QuestDefinition::from_raw(&r).is_err());
    }

    #[test]
    fn test_rejects_three_reputation_rewards() {
        let mut r = raw(7);
        r.reputation_rewards = vec![
            ReputationGate { faction: 1, min: 100 },
            ReputationGate { faction: 2, min: 100 },
            ReputationGate { faction: 3, min: 100 },
        ];
        assert!(QuestDefinition::from_raw(&r).is_err());
    }

    #[test]
    fn test_no_method_detection() {
        let def = QuestDefinition::from_raw(&raw(9)).unwrap();
        assert!(def.is_no_method());

        let mut r = raw(10);
        r.objectives = vec![RawObjective {
            kind: "kill".to_string(),
            target: 100,
            count: 3,
        }];
        let def = QuestDefinition::from_raw(&r).unwrap();
        assert!(!def.is_no_method());
    }

    #[test]
    fn test_required_money() {
        let mut r = raw(11);
        r.reward_money = -250;
        let def = QuestDefinition::from_raw(&r).unwrap();
        assert_eq!(def.required_money(), 250);

        let mut r = raw(12);
        r.reward_money = 100;
        let def = QuestDefinition::from_raw(&r).unwrap();
        assert_eq!(def.required_money(), 0);
    }
}
