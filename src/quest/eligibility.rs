//! Eligibility Evaluation
//!
//! Pure functions deciding whether a player may take, complete, reward, or
//! share a quest. All world state comes in through the arguments; nothing
//! here mutates anything.

use chrono::{DateTime, Utc};

use super::catalog::QuestCatalog;
use super::definition::{ObjectiveKind, QuestDefinition};
use super::log::{EntryStatus, QuestLogEntry, QuestStatus};
use crate::object::WorldObject;
use crate::player::Player;
use crate::protocol::DialogStatus;

pub fn satisfy_level(player: &Player, def: &QuestDefinition) -> bool {
    player.level >= def.min_level
}

pub fn satisfy_previous_quests(player: &Player, def: &QuestDefinition) -> bool {
    def.required_quests.iter().all(|q| player.rewarded.contains(*q))
}

pub fn satisfy_exclusive(player: &Player, def: &QuestDefinition) -> bool {
    def.exclusive_with
        .iter()
        .all(|q| player.quest_log.entry(*q).is_none() && !player.rewarded.contains(*q))
}

pub fn satisfy_reputation(player: &Player, def: &QuestDefinition) -> bool {
    def.required_reputation
        .map_or(true, |gate| player.reputation_with(gate.faction) >= gate.min)
}

/// The quest is not already in the log.
pub fn satisfy_status(player: &Player, def: &QuestDefinition) -> bool {
    player.quest_log.entry(def.id).is_none()
}

/// Once-only quests cannot be taken again after being rewarded.
pub fn satisfy_rewarded(player: &Player, def: &QuestDefinition) -> bool {
    def.is_repeatable() || !player.rewarded.contains(def.id)
}

pub fn satisfy_log_space(player: &Player) -> bool {
    !player.quest_log.is_full()
}

/// May the player take this quest at all (log space not considered)?
pub fn can_take_quest(player: &Player, def: &QuestDefinition) -> bool {
    satisfy_status(player, def)
        && satisfy_rewarded(player, def)
        && satisfy_level(player, def)
        && satisfy_previous_quests(player, def)
        && satisfy_exclusive(player, def)
        && satisfy_reputation(player, def)
}

/// Take-eligibility plus room in the log and bag space for the source item.
pub fn can_add_quest(player: &Player, def: &QuestDefinition) -> bool {
    can_take_quest(player, def)
        && satisfy_log_space(player)
        && def.source_item.map_or(true, |src| {
            player.inventory.can_store(&[super::definition::ItemAmount {
                item_id: src.item_id,
                count: src.count,
            }])
        })
}

/// Are the quest's objectives, items, reputation, and money requirements all
/// currently satisfied for this entry?
pub fn objectives_satisfied(
    player: &Player,
    def: &QuestDefinition,
    entry: &QuestLogEntry,
    now: DateTime<Utc>,
) -> bool {
    if entry.is_expired(now) {
        return false;
    }
    for (i, objective) in def.objectives.iter().enumerate() {
        let counted = entry.counters.get(i).copied().unwrap_or(0);
        let satisfied = match objective.kind {
            // Collected items can be dropped again, so count the bags, not
            // the counter.
            ObjectiveKind::Collect => player.inventory.count(objective.target) >= objective.required,
            _ => counted >= objective.required,
        };
        if !satisfied {
            return false;
        }
    }
    if def.flags.exploration && !entry.explored {
        return false;
    }
    if !def
        .required_items
        .iter()
        .all(|req| player.inventory.count(req.item_id) >= req.count)
    {
        return false;
    }
    if !def
        .reputation_objectives
        .iter()
        .all(|gate| player.reputation_with(gate.faction) >= gate.min)
    {
        return false;
    }
    if player.money < def.required_money() {
        return false;
    }
    true
}

/// Can the log entry flip (or stay) Complete right now?
pub fn can_complete_quest(player: &Player, def: &QuestDefinition, now: DateTime<Utc>) -> bool {
    match player.quest_log.entry(def.id) {
        Some(entry) => match entry.status {
            EntryStatus::Complete => true,
            EntryStatus::Failed => false,
            EntryStatus::Incomplete => objectives_satisfied(player, def, entry, now),
        },
        None => false,
    }
}

/// Repeatable turn-ins only need the items and the money, not a log entry.
pub fn can_complete_repeatable(player: &Player, def: &QuestDefinition) -> bool {
    def.is_repeatable()
        && def
            .required_items
            .iter()
            .all(|req| player.inventory.count(req.item_id) >= req.count)
        && player.money >= def.required_money()
}

/// May the quest be rewarded right now? The reward index is validated by the
/// caller as a protocol bound; this checks the gameplay side.
pub fn can_reward_quest(player: &Player, def: &QuestDefinition, now: DateTime<Utc>) -> bool {
    let status = player
        .quest_log
        .entry(def.id)
        .map(|e| e.status);

    let turn_in_ready = match status {
        Some(EntryStatus::Complete) => true,
        Some(EntryStatus::Failed) => false,
        Some(EntryStatus::Incomplete) => def.is_auto_complete() || def.is_no_method(),
        None => false,
    };
    if !turn_in_ready {
        return false;
    }

    // Required items must still be present at the moment of turn-in.
    def.required_items
        .iter()
        .all(|req| player.inventory.count(req.item_id) >= req.count)
        && player.money >= def.required_money()
        && objectives_still_hold(player, def, now)
}

fn objectives_still_hold(player: &Player, def: &QuestDefinition, now: DateTime<Utc>) -> bool {
    match player.quest_log.entry(def.id) {
        Some(entry) if entry.status == EntryStatus::Complete => !entry.is_expired(now),
        Some(entry) => objectives_satisfied(player, def, entry, now),
        None => false,
    }
}

/// May the player push this quest to the party?
pub fn can_share_quest(player: &Player, def: &QuestDefinition) -> bool {
    def.flags.shareable
        && player.quest_log.entry(def.id).is_some()
        && !def.has_sellable_source_item()
}

/// Overall player-to-quest relationship, for views and anti-cheat checks.
pub fn quest_status(player: &Player, quest_id: super::definition::QuestId) -> QuestStatus {
    if let Some(entry) = player.quest_log.entry(quest_id) {
        return match entry.status {
            EntryStatus::Incomplete => QuestStatus::Incomplete,
            EntryStatus::Complete => QuestStatus::Complete,
            EntryStatus::Failed => QuestStatus::Failed,
        };
    }
    if player.rewarded.contains(quest_id) {
        return QuestStatus::Rewarded;
    }
    QuestStatus::None
}

/// Dialog status of a giver relative to a player, over the union of quests
/// the giver offers and involves.
pub fn dialog_status(
    player: &Player,
    giver: &WorldObject,
    catalog: &QuestCatalog,
    now: DateTime<Utc>,
) -> DialogStatus {
    let mut status = DialogStatus::None;

    for quest_id in &giver.quests_involved {
        if let Some(entry) = player.quest_log.entry(*quest_id) {
            match entry.status {
                EntryStatus::Complete => return DialogStatus::Completable,
                EntryStatus::Incomplete => {
                    // Recheck: counters may have caught up since the last
                    // status poll.
                    if let Some(def) = catalog.definition(*quest_id) {
                        if objectives_satisfied(player, &def, entry, now) {
                            return DialogStatus::Completable;
                        }
                    }
                    status = DialogStatus::Incomplete;
                }
                EntryStatus::Failed => {}
            }
        }
    }

    for quest_id in &giver.quests_offered {
        let Some(def) = catalog.definition(*quest_id) else {
            continue;
        };
        if can_take_quest(player, &def) {
            if def.is_auto_complete() {
                return DialogStatus::Reward;
            }
            status = DialogStatus::Available;
        }
    }

    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quest::definition::{
        ItemAmount, ObjectiveKind as OK, QuestFlags, RawObjective, RawQuest, ReputationGate,
    };
    use tokio::sync::mpsc;
    use uuid::Uuid;

    fn base_raw(id: u32) -> RawQuest {
        RawQuest {
            id,
            title: "t".to_string(),
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

    fn player() -> Player {
        let (tx, _rx) = mpsc::unbounded_channel();
        Player::new(Uuid::new_v4(), "p", 10, 3, tx)
    }

    #[test]
    fn test_level_gate() {
        let mut raw = base_raw(1);
        raw.min_level = 20;
        let def = QuestDefinition::from_raw(&raw).unwrap();
        let p = player();
        assert!(!can_take_quest(&p, &def));
    }

    #[test]
    fn test_prerequisite_and_exclusive_gates() {
        let mut raw = base_raw(2);
        raw.required_quests = vec![1];
        raw.exclusive_with = vec![9];
        let def = QuestDefinition::from_raw(&raw).unwrap();

        let mut p = player();
        assert!(!can_take_quest(&p, &def));

        p.rewarded.insert(1);
        assert!(can_take_quest(&p, &def));

        p.rewarded.insert(9);
        assert!(!can_take_quest(&p, &def));
    }

    #[test]
    fn test_once_only_gate() {
        let def = QuestDefinition::from_raw(&base_raw(3)).unwrap();
        let mut p = player();
        assert!(can_take_quest(&p, &def));
        p.rewarded.insert(3);
        assert!(!can_take_quest(&p, &def));

        let mut raw = base_raw(4);
        raw.flags.repeatable = true;
        let rep = QuestDefinition::from_raw(&raw).unwrap();
        p.rewarded.insert(4);
        assert!(can_take_quest(&p, &rep));
    }

    #[test]
    fn test_collect_objective_counts_bags() {
        let mut raw = base_raw(5);
        raw.objectives = vec![RawObjective {
            kind: "collect".to_string(),
            target: 77,
            count: 3,
        }];
        let def = QuestDefinition::from_raw(&raw).unwrap();
        assert_eq!(def.objectives[0].kind, OK::Collect);

        let mut p = player();
        let entry = QuestLogEntry::new(&def, Utc::now());
        assert!(!objectives_satisfied(&p, &def, &entry, Utc::now()));

        p.inventory.store(&[ItemAmount { item_id: 77, count: 3 }]);
        assert!(objectives_satisfied(&p, &def, &entry, Utc::now()));
    }

    #[test]
    fn test_reputation_objective_gates_completion() {
        let mut raw = base_raw(6);
        raw.reputation_objectives = vec![ReputationGate { faction: 2, min: 300 }];
        let def = QuestDefinition::from_raw(&raw).unwrap();

        let mut p = player();
        let entry = QuestLogEntry::new(&def, Utc::now());
        assert!(!objectives_satisfied(&p, &def, &entry, Utc::now()));
        p.reputation.insert(2, 300);
        assert!(objectives_satisfied(&p, &def, &entry, Utc::now()));
    }

    #[test]
    fn test_required_money_gates_completion() {
        let mut raw = base_raw(7);
        raw.reward_money = -100;
        let def = QuestDefinition::from_raw(&raw).unwrap();

        let mut p = player();
        let entry = QuestLogEntry::new(&def, Utc::now());
        assert!(!objectives_satisfied(&p, &def, &entry, Utc::now()));
        p.money = 100;
        assert!(objectives_satisfied(&p, &def, &entry, Utc::now()));
    }

    #[test]
    fn test_share_requires_flag_log_and_clean_source_item() {
        let mut raw = base_raw(8);
        raw.flags.shareable = true;
        let def = QuestDefinition::from_raw(&raw).unwrap();

        let mut p = player();
        assert!(!can_share_quest(&p, &def));
        p.quest_log.insert(QuestLogEntry::new(&def, Utc::now())).unwrap();
        assert!(can_share_quest(&p, &def));

        let mut raw = base_raw(9);
        raw.flags.shareable = true;
        raw.source_item = Some(crate::quest::definition::SourceItem {
            item_id: 50,
            count: 1,
            sell_price: 10,
        });
        let sellable = QuestDefinition::from_raw(&raw).unwrap();
        p.quest_log
            .insert(QuestLogEntry::new(&sellable, Utc::now()))
            .unwrap();
        assert!(!can_share_quest(&p, &sellable));
    }
}
