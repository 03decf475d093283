//! Quest Giver Objects
//!
//! Closed variant over the world object types a quest can be obtained from or
//! turned in to. Players acting as givers (quest sharing) are handled at the
//! dispatch layer, not here.

use uuid::Uuid;

use crate::config::WorldConfig;
use crate::player::Player;
use crate::quest::definition::QuestId;

pub type ObjectGuid = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GiverKind {
    Creature { hostile: bool },
    GameObject,
    /// Quest-starting item in the player's own bags; always in range.
    Item,
}

#[derive(Debug, Clone)]
pub struct WorldObject {
    pub guid: ObjectGuid,
    pub kind: GiverKind,
    pub position: (f32, f32),
    pub quests_offered: Vec<QuestId>,
    pub quests_involved: Vec<QuestId>,
}

impl WorldObject {
    pub fn new(guid: ObjectGuid, kind: GiverKind, position: (f32, f32)) -> Self {
        Self {
            guid,
            kind,
            position,
            quests_offered: Vec::new(),
            quests_involved: Vec::new(),
        }
    }

    pub fn offers(&self, quest_id: QuestId) -> bool {
        self.quests_offered.contains(&quest_id)
    }

    pub fn involves(&self, quest_id: QuestId) -> bool {
        self.quests_involved.contains(&quest_id)
    }

    pub fn is_hostile(&self) -> bool {
        matches!(self.kind, GiverKind::Creature { hostile: true })
    }
}

/// Range/hostility gate for using a giver. Hostile creatures and out-of-range
/// objects are not interactable; items in the player's bags always are.
pub fn can_interact(player: &Player, object: &WorldObject, config: &WorldConfig) -> bool {
    match object.kind {
        GiverKind::Item => true,
        GiverKind::Creature { hostile } => {
            !hostile && player.distance_to(object.position) <= config.interaction_distance
        }
        GiverKind::GameObject => {
            player.distance_to(object.position) <= config.interaction_distance
        }
    }
}
