//! Reward Transaction
//!
//! Turning in a quest bundles every effect into one commit unit: log removal,
//! rewarded-set insert, item grants (direct or by mail), reputation floors, a
//! signed money delta, and the optional follow-on quest. The unit is staged
//! in memory, written durably, and only applied to live state once the store
//! confirms the commit. A failed commit leaves the player exactly as before.

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::engine::{PendingReward, QuestEngine};
use crate::error::QuestError;
use crate::object::ObjectGuid;
use crate::player::Player;
use crate::protocol::ServerMessage;
use crate::quest::definition::{ItemAmount, QuestDefinition, QuestId, ReputationGate};
use crate::quest::eligibility as elig;
use crate::store::CommitId;

/// How a granted item reaches the player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemDelivery {
    /// Placed straight into the bags
    Direct,
    /// Bags are full; delivered out-of-band, exactly once
    Mail,
}

/// The staged, all-or-nothing effect set for one quest turn-in
#[derive(Debug, Clone, Serialize)]
pub struct RewardTransaction {
    pub quest_id: QuestId,
    /// Slot the log entry occupied when staged
    pub slot: usize,
    /// Required turn-in items and the source item, removed from the bags
    pub take_items: Vec<ItemAmount>,
    pub grant_items: Vec<(ItemAmount, ItemDelivery)>,
    /// Positive pays the player, negative charges them
    pub money_delta: i64,
    /// Factions whose standing is raised to the floor (only those below it)
    pub reputation_floors: Vec<ReputationGate>,
    pub follow_on: Option<QuestId>,
}

impl RewardTransaction {
    /// Build the commit unit from the player's current state. Purely
    /// observational; the player is not touched.
    pub fn stage(
        player: &Player,
        def: &QuestDefinition,
        reward_index: usize,
    ) -> Result<Self, QuestError> {
        let (slot, _) = player
            .quest_log
            .find(def.id)
            .ok_or(QuestError::ProtocolViolation("reward for quest not in log"))?;

        let mut take_items: Vec<ItemAmount> = def.required_items.clone();
        if let Some(src) = def.source_item {
            take_items.push(ItemAmount {
                item_id: src.item_id,
                count: src.count,
            });
        }

        let mut granted: Vec<ItemAmount> = Vec::new();
        if let Some(choice) = def.reward_choices.get(reward_index) {
            granted.push(*choice);
        }
        granted.extend(def.reward_items.iter().copied());

        // Conservative delivery decision: if the whole grant fits the bags it
        // goes direct, otherwise the entire grant is mailed. Mixing the two
        // would make partial-fit accounting ambiguous.
        let delivery = if player.inventory.can_store(&granted) {
            ItemDelivery::Direct
        } else {
            ItemDelivery::Mail
        };
        let grant_items = granted.into_iter().map(|i| (i, delivery)).collect();

        let reputation_floors = def
            .reputation_rewards
            .iter()
            .copied()
            .filter(|gate| player.reputation_with(gate.faction) < gate.min)
            .collect();

        Ok(Self {
            quest_id: def.id,
            slot,
            take_items,
            grant_items,
            money_delta: def.reward_money,
            reputation_floors,
            follow_on: def.next_quest,
        })
    }
}

impl QuestEngine {
    /// The durable store confirmed a staged reward; apply the whole unit to
    /// live state. Until this point the player is untouched.
    pub(crate) fn finish_reward_commit(&mut self, commit_id: CommitId) {
        let Some(pending) = self.pending_rewards.remove(&commit_id) else {
            warn!(commit = commit_id, "completion for unknown reward commit");
            return;
        };
        let PendingReward {
            player: guid,
            giver,
            tx,
            def,
        } = pending;
        let Some(player) = self.players.get_mut(&guid) else {
            // Already durable; the login loader will hydrate the result.
            info!(player = %guid, quest = def.id, "player left before reward applied");
            return;
        };

        if player.quest_log.remove(def.id).is_none() {
            warn!(player = %guid, quest = def.id, "log entry vanished before reward applied");
        }
        player.rewarded.insert(def.id);

        for item in &tx.take_items {
            player.inventory.remove(item.item_id, item.count);
        }
        let mut mailed = false;
        for (item, delivery) in &tx.grant_items {
            match delivery {
                ItemDelivery::Direct => {
                    player.inventory.store(&[*item]);
                }
                ItemDelivery::Mail => mailed = true,
            }
        }
        if mailed {
            player.session.send(ServerMessage::Notification {
                text: "Your quest reward has been sent by mail.".to_string(),
            });
        }
        player.money += tx.money_delta;
        for gate in &tx.reputation_floors {
            player.raise_reputation_floor(gate.faction, gate.min);
        }
        if def.flags.pvp {
            player.pvp_forced = player.quest_log.iter().any(|(_, e)| {
                self.catalog
                    .definition(e.quest_id)
                    .map_or(false, |d| d.flags.pvp)
            });
        }
        player
            .session
            .send(ServerMessage::QuestRewarded { quest_id: def.id });
        info!(player = %guid, quest = def.id, commit = commit_id, "quest rewarded");

        if self.config.quest_tracker_enabled {
            self.store.track_complete(guid, def.id);
        }

        // No-method turn-ins give the client nothing to re-query, so push the
        // giver's new marker.
        if def.is_no_method() {
            let status = match (self.players.get(&guid), self.objects.get(&giver)) {
                (Some(p), Some(o)) => {
                    Some(elig::dialog_status(p, o, &self.catalog, Utc::now()))
                }
                _ => None,
            };
            if let Some(status) = status {
                if let Some(p) = self.players.get(&guid) {
                    p.session
                        .send(ServerMessage::QuestGiverStatus { giver, status });
                }
            }
        }

        if let Some(next_id) = tx.follow_on {
            self.offer_next_quest(guid, giver, next_id);
        }
    }

    /// The durable store rejected a staged reward. Nothing was applied, so
    /// the turn-in can simply be retried.
    pub(crate) fn fail_reward_commit(&mut self, commit_id: CommitId, guid: ObjectGuid, error: String) {
        let Some(pending) = self.pending_rewards.remove(&commit_id) else {
            warn!(commit = commit_id, "failure for unknown reward commit");
            return;
        };
        error!(player = %guid, quest = pending.tx.quest_id, commit = commit_id,
            error = %error, "reward commit failed; no state was applied");
        if let Some(player) = self.players.get(&guid) {
            player.session.send(ServerMessage::DurableWriteFailed {
                quest_id: pending.tx.quest_id,
            });
            player.session.send(ServerMessage::Notification {
                text: "Your quest turn-in could not be saved. Please try again.".to_string(),
            });
        }
    }

    /// Chain to the follow-on quest after a turn-in: auto-accept quests are
    /// added silently, everything else gets its detail view. Never both.
    fn offer_next_quest(&mut self, guid: ObjectGuid, giver: ObjectGuid, next_id: QuestId) {
        let Some(next) = self.catalog.definition(next_id) else {
            return;
        };
        let can_take = self
            .players
            .get(&guid)
            .map_or(false, |p| elig::can_take_quest(p, &next));
        if !can_take {
            return;
        }

        if next.is_auto_accept() {
            let can_add = self
                .players
                .get(&guid)
                .map_or(false, |p| elig::can_add_quest(p, &next));
            if can_add {
                let _ = self.add_quest_internal(guid, &next, true);
            } else if let Some(p) = self.players.get(&guid) {
                p.session.send(ServerMessage::Notification {
                    text: "Your quest log is full.".to_string(),
                });
            }
        } else if let Some(p) = self.players.get(&guid) {
            p.session.send(ServerMessage::QuestDetails {
                giver,
                quest_id: next_id,
                title: next.title.clone(),
                reward_choices: next.reward_choices.clone(),
                reward_money: next.reward_money,
                shared: false,
            });
        }
    }
}
