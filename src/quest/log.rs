//! Quest Log
//!
//! Per-player bounded ordered set of active quest slots, plus the durable
//! record of quests ever rewarded. The slot index is the addressing unit for
//! the client's swap/remove operations, so insertion order is significant.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::definition::{QuestDefinition, QuestId};

/// Status of an entry while it sits in the log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Incomplete,
    Complete,
    Failed,
}

/// Overall relationship between a player and a quest id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestStatus {
    None,
    Incomplete,
    Complete,
    Failed,
    Rewarded,
}

/// One occupied quest log slot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestLogEntry {
    pub quest_id: QuestId,
    pub status: EntryStatus,
    /// One counter per definition objective, same order
    pub counters: Vec<u32>,
    /// Set once the quest's area has been entered (exploration quests)
    pub explored: bool,
    /// Timed quests fail past this instant
    pub expires_at: Option<DateTime<Utc>>,
}

impl QuestLogEntry {
    pub fn new(def: &QuestDefinition, now: DateTime<Utc>) -> Self {
        Self {
            quest_id: def.id,
            status: EntryStatus::Incomplete,
            counters: vec![0; def.objectives.len()],
            explored: false,
            expires_at: def
                .time_limit_secs
                .map(|secs| now + Duration::seconds(secs as i64)),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |t| now >= t)
    }

    /// Bump an objective counter, capped at the requirement. Returns the new
    /// value.
    pub fn add_count(&mut self, objective_index: usize, amount: u32, required: u32) -> u32 {
        if let Some(c) = self.counters.get_mut(objective_index) {
            *c = (*c + amount).min(required);
            *c
        } else {
            0
        }
    }
}

/// Fixed-capacity ordered quest slots
#[derive(Debug, Clone)]
pub struct QuestLog {
    slots: Vec<Option<QuestLogEntry>>,
}

impl QuestLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_full(&self) -> bool {
        self.slots.iter().all(|s| s.is_some())
    }

    pub fn slot(&self, index: usize) -> Option<&QuestLogEntry> {
        self.slots.get(index).and_then(|s| s.as_ref())
    }

    pub fn entry(&self, quest_id: QuestId) -> Option<&QuestLogEntry> {
        self.slots
            .iter()
            .flatten()
            .find(|e| e.quest_id == quest_id)
    }

    pub fn entry_mut(&mut self, quest_id: QuestId) -> Option<&mut QuestLogEntry> {
        self.slots
            .iter_mut()
            .flatten()
            .find(|e| e.quest_id == quest_id)
    }

    pub fn find(&self, quest_id: QuestId) -> Option<(usize, &QuestLogEntry)> {
        self.slots
            .iter()
            .enumerate()
            .find_map(|(i, s)| s.as_ref().filter(|e| e.quest_id == quest_id).map(|e| (i, e)))
    }

    /// Insert into the first free slot. A quest id occupies at most one slot.
    pub fn insert(&mut self, entry: QuestLogEntry) -> Result<usize, QuestLogFull> {
        if self.entry(entry.quest_id).is_some() {
            return Err(QuestLogFull::Duplicate);
        }
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(entry);
                return Ok(i);
            }
        }
        Err(QuestLogFull::Full)
    }

    pub fn clear_slot(&mut self, index: usize) -> Option<QuestLogEntry> {
        self.slots.get_mut(index).and_then(|s| s.take())
    }

    pub fn remove(&mut self, quest_id: QuestId) -> Option<(usize, QuestLogEntry)> {
        let index = self.find(quest_id).map(|(i, _)| i)?;
        self.clear_slot(index).map(|e| (index, e))
    }

    /// Pure reordering; both indices must be in range (caller validated).
    pub fn swap(&mut self, a: usize, b: usize) {
        if a < self.slots.len() && b < self.slots.len() {
            self.slots.swap(a, b);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &QuestLogEntry)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|e| (i, e)))
    }
}

/// Why an insert failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestLogFull {
    Full,
    Duplicate,
}

/// Unordered set of quest ids the player has ever turned in. Append-only
/// outside administrative resets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RewardedSet {
    quests: BTreeSet<QuestId>,
}

impl RewardedSet {
    pub fn insert(&mut self, id: QuestId) -> bool {
        self.quests.insert(id)
    }

    pub fn contains(&self, id: QuestId) -> bool {
        self.quests.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.quests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quests.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = QuestId> + '_ {
        self.quests.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quest::definition::{QuestFlags, RawQuest};

    fn def(id: QuestId) -> QuestDefinition {
        QuestDefinition::from_raw(&RawQuest {
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
        })
        .unwrap()
    }

    fn entry(id: QuestId) -> QuestLogEntry {
        QuestLogEntry::new(&def(id), Utc::now())
    }

    #[test]
    fn test_insert_fills_first_free_slot() {
        let mut log = QuestLog::new(3);
        assert_eq!(log.insert(entry(1)).unwrap(), 0);
        assert_eq!(log.insert(entry(2)).unwrap(), 1);
        log.clear_slot(0);
        assert_eq!(log.insert(entry(3)).unwrap(), 0);
    }

    #[test]
    fn test_duplicate_quest_rejected() {
        let mut log = QuestLog::new(3);
        log.insert(entry(1)).unwrap();
        assert_eq!(log.insert(entry(1)), Err(QuestLogFull::Duplicate));
        assert_eq!(log.occupied(), 1);
    }

    #[test]
    fn test_full_log_rejected() {
        let mut log = QuestLog::new(2);
        log.insert(entry(1)).unwrap();
        log.insert(entry(2)).unwrap();
        assert!(log.is_full());
        assert_eq!(log.insert(entry(3)), Err(QuestLogFull::Full));
    }

    #[test]
    fn test_swap_preserves_occupied_multiset() {
        let mut log = QuestLog::new(4);
        log.insert(entry(1)).unwrap();
        log.insert(entry(2)).unwrap();

        log.swap(0, 2);
        assert!(log.slot(0).is_none());
        assert_eq!(log.slot(2).unwrap().quest_id, 1);
        assert_eq!(log.slot(1).unwrap().quest_id, 2);
        assert_eq!(log.occupied(), 2);
    }

    #[test]
    fn test_counter_caps_at_requirement() {
        let mut e = entry(1);
        e.counters = vec![0];
        assert_eq!(e.add_count(0, 3, 5), 3);
        assert_eq!(e.add_count(0, 10, 5), 5);
        assert_eq!(e.add_count(1, 1, 5), 0);
    }

    #[test]
    fn test_timed_entry_expiry() {
        let mut d = def(1);
        d.time_limit_secs = Some(60);
        let now = Utc::now();
        let e = QuestLogEntry::new(&d, now);
        assert!(!e.is_expired(now));
        assert!(e.is_expired(now + Duration::seconds(61)));
    }

    #[test]
    fn test_rewarded_set() {
        let mut set = RewardedSet::default();
        assert!(set.insert(10));
        assert!(!set.insert(10));
        assert!(set.contains(10));
        assert_eq!(set.len(), 1);
    }
}
