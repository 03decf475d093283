//! Player State
//!
//! The per-session mutable state the quest engine acts on. Each player's
//! requests are processed strictly sequentially, so nothing here needs its
//! own locking; cross-player effects go through the engine.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::object::ObjectGuid;
use crate::protocol::ServerMessage;
use crate::quest::definition::{FactionId, ItemAmount, ItemId};
use crate::quest::log::{QuestLog, RewardedSet};
use crate::share::ShareOffer;

pub type GroupId = Uuid;

// ============================================================================
// Inventory
// ============================================================================

#[derive(Debug, Clone)]
pub struct ItemStack {
    pub item_id: ItemId,
    pub count: u32,
    /// Bags holding other items cannot be removed, which blocks abandoning
    /// the quest that granted them.
    pub equipped_bag: bool,
}

#[derive(Debug, Clone)]
pub struct Inventory {
    capacity: usize,
    stacks: Vec<ItemStack>,
}

impl Inventory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            stacks: Vec::new(),
        }
    }

    pub fn count(&self, item_id: ItemId) -> u32 {
        self.stacks
            .iter()
            .filter(|s| s.item_id == item_id)
            .map(|s| s.count)
            .sum()
    }

    pub fn free_slots(&self) -> usize {
        self.capacity.saturating_sub(self.stacks.len())
    }

    /// Whether all of `items` fit. Stacks merge by item id; each new id
    /// needs a free slot.
    pub fn can_store(&self, items: &[ItemAmount]) -> bool {
        let mut new_ids = 0;
        for item in items {
            if item.count == 0 {
                continue;
            }
            if !self.stacks.iter().any(|s| s.item_id == item.item_id) {
                new_ids += 1;
            }
        }
        new_ids <= self.free_slots()
    }

    /// Store items, merging into existing stacks. Returns false (and stores
    /// nothing) if they do not fit.
    pub fn store(&mut self, items: &[ItemAmount]) -> bool {
        if !self.can_store(items) {
            return false;
        }
        for item in items {
            if item.count == 0 {
                continue;
            }
            if let Some(stack) = self.stacks.iter_mut().find(|s| s.item_id == item.item_id) {
                stack.count += item.count;
            } else {
                self.stacks.push(ItemStack {
                    item_id: item.item_id,
                    count: item.count,
                    equipped_bag: false,
                });
            }
        }
        true
    }

    /// Remove up to `count` of an item, returning how many were removed.
    pub fn remove(&mut self, item_id: ItemId, count: u32) -> u32 {
        let mut remaining = count;
        for stack in self.stacks.iter_mut().filter(|s| s.item_id == item_id) {
            let take = stack.count.min(remaining);
            stack.count -= take;
            remaining -= take;
            if remaining == 0 {
                break;
            }
        }
        self.stacks.retain(|s| s.count > 0);
        count - remaining
    }

    /// Equipped bags cannot be taken away.
    pub fn can_remove(&self, item_id: ItemId) -> bool {
        !self
            .stacks
            .iter()
            .any(|s| s.item_id == item_id && s.equipped_bag)
    }

    pub fn mark_equipped_bag(&mut self, item_id: ItemId) {
        for stack in self.stacks.iter_mut().filter(|s| s.item_id == item_id) {
            stack.equipped_bag = true;
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// The outbound half of a player session plus its per-session quest markers.
#[derive(Debug)]
pub struct Session {
    sender: mpsc::UnboundedSender<ServerMessage>,
    /// Single-slot reservation for an unresolved incoming share offer.
    pub divider: Option<ShareOffer>,
    /// The giver whose gossip window is currently open, if any. Status
    /// queries against the same giver are skipped while it is open.
    pub open_gossip: Option<ObjectGuid>,
}

impl Session {
    pub fn new(sender: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self {
            sender,
            divider: None,
            open_gossip: None,
        }
    }

    pub fn send(&self, msg: ServerMessage) {
        if self.sender.send(msg).is_err() {
            debug!("dropping message for disconnecting session");
        }
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.sender.clone()
    }
}

// ============================================================================
// Player
// ============================================================================

#[derive(Debug)]
pub struct Player {
    pub guid: ObjectGuid,
    pub name: String,
    pub level: u32,
    pub money: i64,
    pub reputation: HashMap<FactionId, i32>,
    pub inventory: Inventory,
    pub position: (f32, f32),
    /// Spatial partition the player currently occupies; quest sharing only
    /// reaches members in the same partition.
    pub map: u32,
    pub in_battleground: bool,
    /// Forced on while the player holds a PvP-flagging quest.
    pub pvp_forced: bool,
    pub group: Option<GroupId>,
    pub quest_log: QuestLog,
    pub rewarded: RewardedSet,
    pub session: Session,
}

impl Player {
    pub fn new(
        guid: ObjectGuid,
        name: impl Into<String>,
        level: u32,
        log_capacity: usize,
        sender: mpsc::UnboundedSender<ServerMessage>,
    ) -> Self {
        Self {
            guid,
            name: name.into(),
            level,
            money: 0,
            reputation: HashMap::new(),
            inventory: Inventory::new(32),
            position: (0.0, 0.0),
            map: 0,
            in_battleground: false,
            pvp_forced: false,
            group: None,
            quest_log: QuestLog::new(log_capacity),
            rewarded: RewardedSet::default(),
            session: Session::new(sender),
        }
    }

    pub fn reputation_with(&self, faction: FactionId) -> i32 {
        self.reputation.get(&faction).copied().unwrap_or(0)
    }

    /// Raise standing with a faction to at least `min`. Never lowers it.
    pub fn raise_reputation_floor(&mut self, faction: FactionId, min: i32) {
        let current = self.reputation_with(faction);
        if current < min {
            self.reputation.insert(faction, min);
        }
    }

    pub fn distance_to(&self, pos: (f32, f32)) -> f32 {
        let dx = self.position.0 - pos.0;
        let dy = self.position.1 - pos.1;
        (dx * dx + dy * dy).sqrt()
    }
}
