//! Quest Progress Events
//!
//! Gameplay events that advance objective counters. The engine matches each
//! event against the incomplete entries of the player it belongs to.

use serde::{Deserialize, Serialize};

use super::definition::{ItemId, Objective, ObjectiveKind};

/// Events that can advance quest progress
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestEvent {
    /// A creature of this template died to the player's credit
    KillCredit { target: u32, count: u32 },
    /// Items entered the player's bags
    ItemCollected { item_id: ItemId, count: u32 },
    /// The player entered an area
    AreaExplored { area: u32 },
    /// The player cast a quest-relevant spell
    SpellCast { spell: u32, target: u32 },
}

impl QuestEvent {
    /// How much this event advances the given objective, if at all.
    pub fn progress_for(&self, objective: &Objective) -> u32 {
        match (self, objective.kind) {
            (QuestEvent::KillCredit { target, count }, ObjectiveKind::Kill)
                if *target == objective.target =>
            {
                *count
            }
            (QuestEvent::ItemCollected { item_id, count }, ObjectiveKind::Collect)
                if *item_id == objective.target =>
            {
                *count
            }
            (QuestEvent::AreaExplored { area }, ObjectiveKind::Explore)
                if *area == objective.target =>
            {
                1
            }
            (QuestEvent::SpellCast { spell, .. }, ObjectiveKind::CastSpell)
                if *spell == objective.target =>
            {
                1
            }
            _ => 0,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            QuestEvent::KillCredit { .. } => "kill_credit",
            QuestEvent::ItemCollected { .. } => "item_collected",
            QuestEvent::AreaExplored { .. } => "area_explored",
            QuestEvent::SpellCast { .. } => "spell_cast",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kill_credit_matches_target() {
        let obj = Objective {
            kind: ObjectiveKind::Kill,
            target: 100,
            required: 5,
        };
        let hit = QuestEvent::KillCredit { target: 100, count: 2 };
        let miss = QuestEvent::KillCredit { target: 101, count: 2 };
        assert_eq!(hit.progress_for(&obj), 2);
        assert_eq!(miss.progress_for(&obj), 0);
    }

    #[test]
    fn test_event_type_names() {
        assert_eq!(
            QuestEvent::KillCredit { target: 1, count: 1 }.event_type(),
            "kill_credit"
        );
        assert_eq!(
            QuestEvent::AreaExplored { area: 4 }.event_type(),
            "area_explored"
        );
    }

    #[test]
    fn test_kind_mismatch_gives_no_progress() {
        let obj = Objective {
            kind: ObjectiveKind::Collect,
            target: 100,
            required: 5,
        };
        let ev = QuestEvent::KillCredit { target: 100, count: 2 };
        assert_eq!(ev.progress_for(&obj), 0);
    }
}
