//! Quest Engine
//!
//! Orchestrates every per-player quest transition. One engine instance owns
//! the players, world objects, and groups it serves and processes requests
//! strictly sequentially, so a player's quest log is never mutated
//! concurrently. Durable writes are fire-and-forget; their completions are
//! drained by `tick` and applied then.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::WorldConfig;
use crate::error::QuestError;
use crate::group::Group;
use crate::object::{can_interact, GiverKind, ObjectGuid, WorldObject};
use crate::player::{GroupId, Player};
use crate::protocol::{
    ClientRequest, DialogStatus, GossipQuestEntry, PushResultCode, ServerMessage,
};
use crate::quest::catalog::QuestCatalog;
use crate::quest::definition::{ItemAmount, QuestDefinition, QuestId};
use crate::quest::eligibility as elig;
use crate::quest::events::QuestEvent;
use crate::quest::log::{EntryStatus, QuestLogEntry, QuestLogFull, QuestStatus};
use crate::reward::RewardTransaction;
use crate::store::{CommitId, DurableStore, StoreEvent};

/// A staged reward waiting for its durable commit to complete
pub(crate) struct PendingReward {
    pub player: ObjectGuid,
    pub giver: ObjectGuid,
    pub tx: RewardTransaction,
    pub def: Arc<QuestDefinition>,
}

pub struct QuestEngine {
    pub(crate) catalog: Arc<QuestCatalog>,
    pub(crate) config: WorldConfig,
    pub(crate) store: Arc<dyn DurableStore>,
    pub(crate) players: HashMap<ObjectGuid, Player>,
    pub(crate) objects: HashMap<ObjectGuid, WorldObject>,
    pub(crate) groups: HashMap<GroupId, Group>,
    pub(crate) store_tx: mpsc::UnboundedSender<StoreEvent>,
    store_rx: mpsc::UnboundedReceiver<StoreEvent>,
    pub(crate) pending_rewards: HashMap<CommitId, PendingReward>,
    next_commit_id: CommitId,
}

impl QuestEngine {
    pub fn new(
        catalog: Arc<QuestCatalog>,
        config: WorldConfig,
        store: Arc<dyn DurableStore>,
    ) -> Self {
        let (store_tx, store_rx) = mpsc::unbounded_channel();
        Self {
            catalog,
            config,
            store,
            players: HashMap::new(),
            objects: HashMap::new(),
            groups: HashMap::new(),
            store_tx,
            store_rx,
            pending_rewards: HashMap::new(),
            next_commit_id: 1,
        }
    }

    // ========================================================================
    // World membership
    // ========================================================================

    pub fn add_player(&mut self, player: Player) {
        self.players.insert(player.guid, player);
    }

    /// Session end. Outstanding share offers in either direction resolve as
    /// cancelled so no reservation can leak past the session.
    pub fn remove_player(&mut self, guid: ObjectGuid) {
        self.leave_group(guid);
        self.cancel_offers_with(guid);
        self.players.remove(&guid);
    }

    pub fn add_object(&mut self, object: WorldObject) {
        self.objects.insert(object.guid, object);
    }

    pub fn create_group(&mut self, members: &[ObjectGuid]) -> GroupId {
        let id = Uuid::new_v4();
        let mut group = Group::new(id);
        for &m in members {
            if let Some(p) = self.players.get_mut(&m) {
                p.group = Some(id);
                group.add(m);
            }
        }
        self.groups.insert(id, group);
        id
    }

    pub fn leave_group(&mut self, guid: ObjectGuid) {
        let Some(player) = self.players.get_mut(&guid) else {
            return;
        };
        let Some(group_id) = player.group.take() else {
            return;
        };
        if let Some(group) = self.groups.get_mut(&group_id) {
            group.remove(guid);
            if group.is_empty() {
                self.groups.remove(&group_id);
            }
        }
        self.cancel_offers_with(guid);
    }

    pub fn player(&self, guid: ObjectGuid) -> Option<&Player> {
        self.players.get(&guid)
    }

    pub fn player_mut(&mut self, guid: ObjectGuid) -> Option<&mut Player> {
        self.players.get_mut(&guid)
    }

    pub fn quest_status(&self, guid: ObjectGuid, quest_id: QuestId) -> QuestStatus {
        self.players
            .get(&guid)
            .map_or(QuestStatus::None, |p| elig::quest_status(p, quest_id))
    }

    pub fn pending_commit_count(&self) -> usize {
        self.pending_rewards.len()
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    pub fn handle(
        &mut self,
        requester: ObjectGuid,
        request: ClientRequest,
    ) -> Result<(), QuestError> {
        let result = match request {
            ClientRequest::Hello { giver } => self.hello(requester, giver),
            ClientRequest::StatusQuery { giver } => self.status_query(requester, giver),
            ClientRequest::QuestQuery { quest_id } => self.quest_query(requester, quest_id),
            ClientRequest::QueryQuest { giver, quest_id } => {
                self.query_quest(requester, giver, quest_id)
            }
            ClientRequest::AcceptQuest { giver, quest_id } => {
                self.accept_quest(requester, giver, quest_id)
            }
            ClientRequest::ChooseReward {
                giver,
                quest_id,
                reward_index,
            } => self.choose_reward(requester, giver, quest_id, reward_index),
            ClientRequest::RequestReward { giver, quest_id } => {
                self.request_reward(requester, giver, quest_id)
            }
            ClientRequest::CompleteQuest { giver, quest_id } => {
                self.complete_quest(requester, giver, quest_id)
            }
            ClientRequest::Cancel => {
                self.close_gossip(requester);
                Ok(())
            }
            ClientRequest::SwapSlots { slot_a, slot_b } => {
                self.swap_slots(requester, slot_a, slot_b)
            }
            ClientRequest::RemoveQuest { slot } => self.remove_quest(requester, slot),
            ClientRequest::ConfirmAccept { quest_id } => self.confirm_accept(requester, quest_id),
            ClientRequest::PushToParty { quest_id } => self.push_to_party(requester, quest_id),
            ClientRequest::PushResult {
                sharer,
                quest_id,
                code,
            } => self.push_result(requester, sharer, quest_id, code),
            ClientRequest::QueryRewarded => self.query_rewarded(requester),
        };

        if let Err(e) = &result {
            if e.is_protocol_violation() {
                warn!(player = %requester, error = %e, "rejected quest request (possible packet hacking)");
            } else {
                debug!(player = %requester, error = %e, "quest request failed");
            }
        }
        result
    }

    /// Drain durable-store completions. Called once per processing tick.
    pub fn tick(&mut self) {
        while let Ok(event) = self.store_rx.try_recv() {
            match event {
                StoreEvent::RewardCommitted {
                    commit_id,
                    player,
                    result,
                } => match result {
                    Ok(()) => self.finish_reward_commit(commit_id),
                    Err(e) => self.fail_reward_commit(commit_id, player, e),
                },
                StoreEvent::LogPersisted {
                    player,
                    quest_id,
                    result,
                } => {
                    if let Err(e) = result {
                        warn!(player = %player, quest = quest_id, error = %e, "quest log persist failed");
                        if let Some(p) = self.players.get(&player) {
                            p.session.send(ServerMessage::DurableWriteFailed { quest_id });
                        }
                    }
                }
            }
        }
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Open a creature's gossip menu. Silently ignored for non-interactable
    /// givers; the client simply gets no window.
    fn hello(&mut self, requester: ObjectGuid, giver: ObjectGuid) -> Result<(), QuestError> {
        let Some(object) = self.objects.get(&giver) else {
            debug!(giver = %giver, "hello for unknown giver");
            return Ok(());
        };
        let player = self
            .players
            .get(&requester)
            .ok_or(QuestError::UnknownPlayer(requester))?;

        if !matches!(object.kind, GiverKind::Creature { .. })
            || !can_interact(player, object, &self.config)
        {
            return Ok(());
        }

        let mut seen = HashSet::new();
        let mut quests = Vec::new();
        for &quest_id in object
            .quests_offered
            .iter()
            .chain(object.quests_involved.iter())
        {
            if !seen.insert(quest_id) {
                continue;
            }
            let Some(def) = self.catalog.definition(quest_id) else {
                continue;
            };
            let status = if let Some(entry) = player.quest_log.entry(quest_id) {
                match entry.status {
                    EntryStatus::Complete => Some(DialogStatus::Completable),
                    EntryStatus::Incomplete => Some(DialogStatus::Incomplete),
                    EntryStatus::Failed => None,
                }
            } else if object.offers(quest_id) && elig::can_take_quest(player, &def) {
                if def.is_auto_complete() {
                    Some(DialogStatus::Reward)
                } else {
                    Some(DialogStatus::Available)
                }
            } else {
                None
            };
            let Some(status) = status else { continue };
            quests.push(GossipQuestEntry {
                quest_id,
                title: def.title.clone(),
                status,
            });
        }

        let player = self
            .players
            .get_mut(&requester)
            .ok_or(QuestError::UnknownPlayer(requester))?;
        player.session.open_gossip = Some(giver);
        player.session.send(ServerMessage::GossipMenu { giver, quests });
        Ok(())
    }

    /// Quest marker for a giver. Memoized against the open gossip window:
    /// while the menu for this giver is up, re-queries are redundant.
    fn status_query(&mut self, requester: ObjectGuid, giver: ObjectGuid) -> Result<(), QuestError> {
        let now = Utc::now();
        let player = self
            .players
            .get(&requester)
            .ok_or(QuestError::UnknownPlayer(requester))?;
        if player.session.open_gossip == Some(giver) {
            return Ok(());
        }
        let Some(object) = self.objects.get(&giver) else {
            debug!(giver = %giver, "status query for unknown giver");
            return Ok(());
        };

        let status = match object.kind {
            // Enemies never show quest markers.
            GiverKind::Creature { hostile: true } => DialogStatus::None,
            GiverKind::Creature { .. } => elig::dialog_status(player, object, &self.catalog, now),
            GiverKind::GameObject if self.config.object_quest_markers => {
                elig::dialog_status(player, object, &self.catalog, now)
            }
            GiverKind::GameObject => DialogStatus::None,
            GiverKind::Item => {
                return Err(QuestError::ProtocolViolation(
                    "status query for an item giver",
                ));
            }
        };

        player
            .session
            .send(ServerMessage::QuestGiverStatus { giver, status });
        Ok(())
    }

    fn quest_query(&mut self, requester: ObjectGuid, quest_id: QuestId) -> Result<(), QuestError> {
        let def = self
            .catalog
            .definition(quest_id)
            .ok_or(QuestError::UnknownQuest(quest_id))?;
        let player = self
            .players
            .get(&requester)
            .ok_or(QuestError::UnknownPlayer(requester))?;
        player.session.send(ServerMessage::QuestDefinitionView {
            quest_id,
            title: def.title.clone(),
            status: elig::quest_status(player, quest_id),
        });
        Ok(())
    }

    /// Detail or request-items view for one of a giver's quests. Auto-accept
    /// quests enter the log as a side effect.
    fn query_quest(
        &mut self,
        requester: ObjectGuid,
        giver: ObjectGuid,
        quest_id: QuestId,
    ) -> Result<(), QuestError> {
        let now = Utc::now();
        let knows = self
            .objects
            .get(&giver)
            .map_or(false, |o| o.offers(quest_id) || o.involves(quest_id));
        if !knows {
            self.close_gossip(requester);
            return Err(QuestError::EligibilityDenied(
                "giver does not know this quest",
            ));
        }
        let def = self
            .catalog
            .definition(quest_id)
            .ok_or(QuestError::UnknownQuest(quest_id))?;

        let can_take = self
            .players
            .get(&requester)
            .map(|p| elig::can_take_quest(p, &def))
            .ok_or(QuestError::UnknownPlayer(requester))?;
        if !can_take {
            return Ok(());
        }

        if def.is_auto_accept() {
            let can_add = self
                .players
                .get(&requester)
                .map_or(false, |p| elig::can_add_quest(p, &def));
            if can_add {
                self.add_quest_internal(requester, &def, true)?;
            }
        }

        let player = self
            .players
            .get(&requester)
            .ok_or(QuestError::UnknownPlayer(requester))?;
        if def.is_auto_complete() || def.is_no_method() {
            let completable = elig::can_complete_quest(player, &def, now);
            player.session.send(ServerMessage::RequestItems {
                giver,
                quest_id,
                required_items: def.required_items.clone(),
                completable,
            });
        } else {
            player.session.send(ServerMessage::QuestDetails {
                giver,
                quest_id,
                title: def.title.clone(),
                reward_choices: def.reward_choices.clone(),
                reward_money: def.reward_money,
                shared: false,
            });
        }
        Ok(())
    }

    /// Accept a quest from a world object or a sharing player. Rejection
    /// closes the window and drops the reservation so the UI never sticks.
    fn accept_quest(
        &mut self,
        requester: ObjectGuid,
        giver: ObjectGuid,
        quest_id: QuestId,
    ) -> Result<(), QuestError> {
        if giver == requester {
            self.reject_accept(requester);
            return Err(QuestError::ProtocolViolation("accepting a self-share"));
        }
        let Some(def) = self.catalog.definition(quest_id) else {
            self.reject_accept(requester);
            return Err(QuestError::UnknownQuest(quest_id));
        };

        let giver_is_player = self.players.contains_key(&giver);
        let giver_ok = if let Some(object) = self.objects.get(&giver) {
            object.offers(quest_id)
        } else if let Some(sharer) = self.players.get(&giver) {
            elig::can_share_quest(sharer, &def)
        } else {
            false
        };
        if !giver_ok {
            self.reject_accept(requester);
            return Err(QuestError::EligibilityDenied(
                "object does not offer this quest",
            ));
        }

        // Stale-client protection: the object must still be usable.
        if let Some(object) = self.objects.get(&giver) {
            let player = self
                .players
                .get(&requester)
                .ok_or(QuestError::UnknownPlayer(requester))?;
            if !can_interact(player, object, &self.config) {
                return Err(QuestError::EligibilityDenied(
                    "quest giver is out of reach",
                ));
            }
        }

        // Sharing a quest that hands out a sellable item would mint money.
        if giver_is_player && def.has_sellable_source_item() {
            return Err(QuestError::ProtocolViolation(
                "shared quest grants a sellable item",
            ));
        }

        let can_take = self
            .players
            .get(&requester)
            .map(|p| elig::can_take_quest(p, &def))
            .ok_or(QuestError::UnknownPlayer(requester))?;
        if !can_take {
            self.reject_accept(requester);
            return Err(QuestError::EligibilityDenied("cannot take this quest"));
        }

        // A pending incoming share offer is resolved by this accept; tell the
        // original sharer.
        self.resolve_divider(requester, PushResultCode::Accepted);

        let can_add = self
            .players
            .get(&requester)
            .map_or(false, |p| elig::can_add_quest(p, &def));
        if can_add {
            self.add_quest_internal(requester, &def, true)?;
            if def.flags.party_accept {
                self.fan_out_confirm_offers(requester, &def);
            }
        }

        self.close_gossip(requester);
        Ok(())
    }

    /// Turn in a quest for the chosen reward. Nothing is applied here: the
    /// commit unit is staged, written durably, and applied on completion.
    fn choose_reward(
        &mut self,
        requester: ObjectGuid,
        giver: ObjectGuid,
        quest_id: QuestId,
        reward_index: u32,
    ) -> Result<(), QuestError> {
        let now = Utc::now();
        let def = self
            .catalog
            .definition(quest_id)
            .ok_or(QuestError::UnknownQuest(quest_id))?;

        let idx = reward_index as usize;
        if idx != 0 && idx >= def.reward_choices.len() {
            warn!(player = %requester, quest = quest_id, reward = idx,
                "invalid reward choice (probably packet hacking)");
            return Err(QuestError::ProtocolViolation("reward choice out of range"));
        }

        let involved = self
            .objects
            .get(&giver)
            .map_or(false, |o| o.involves(quest_id));
        if !involved {
            return Err(QuestError::EligibilityDenied(
                "object is not the turn-in for this quest",
            ));
        }
        {
            let player = self
                .players
                .get(&requester)
                .ok_or(QuestError::UnknownPlayer(requester))?;
            let object = self
                .objects
                .get(&giver)
                .ok_or(QuestError::UnknownObject(giver))?;
            if !can_interact(player, object, &self.config) {
                return Err(QuestError::EligibilityDenied(
                    "quest giver is out of reach",
                ));
            }
        }

        if self
            .pending_rewards
            .values()
            .any(|p| p.player == requester && p.tx.quest_id == quest_id)
        {
            return Err(QuestError::EligibilityDenied(
                "a reward commit is already in flight",
            ));
        }

        let player = self
            .players
            .get(&requester)
            .ok_or(QuestError::UnknownPlayer(requester))?;

        let status = elig::quest_status(player, quest_id);
        if status != QuestStatus::Complete && !def.is_auto_complete() && !def.is_no_method() {
            warn!(player = %requester, quest = quest_id,
                "reward claim without completion (possible packet hacking)");
            return Err(QuestError::ProtocolViolation("quest is not complete"));
        }

        if !elig::can_reward_quest(player, &def, now) {
            // Requirements lapsed since the offer view; show it again.
            player.session.send(ServerMessage::OfferReward {
                giver,
                quest_id,
                reward_choices: def.reward_choices.clone(),
                reward_money: def.reward_money,
            });
            return Ok(());
        }

        let tx = RewardTransaction::stage(player, &def, idx)?;
        let commit_id = self.next_commit_id;
        self.next_commit_id += 1;
        self.pending_rewards.insert(
            commit_id,
            PendingReward {
                player: requester,
                giver,
                tx: tx.clone(),
                def: def.clone(),
            },
        );
        self.store
            .commit_reward(commit_id, requester, &tx, self.store_tx.clone());
        info!(player = %requester, quest = quest_id, commit = commit_id, "reward staged");
        Ok(())
    }

    /// Recompute completion, then show the offer-reward view if it holds.
    /// Safe to call repeatedly.
    fn request_reward(
        &mut self,
        requester: ObjectGuid,
        giver: ObjectGuid,
        quest_id: QuestId,
    ) -> Result<(), QuestError> {
        let now = Utc::now();
        let involved = self
            .objects
            .get(&giver)
            .map_or(false, |o| o.involves(quest_id));
        if !involved {
            return Err(QuestError::EligibilityDenied(
                "object is not the turn-in for this quest",
            ));
        }
        {
            let player = self
                .players
                .get(&requester)
                .ok_or(QuestError::UnknownPlayer(requester))?;
            let object = self
                .objects
                .get(&giver)
                .ok_or(QuestError::UnknownObject(giver))?;
            if !can_interact(player, object, &self.config) {
                return Err(QuestError::EligibilityDenied(
                    "quest giver is out of reach",
                ));
            }
        }
        let def = self
            .catalog
            .definition(quest_id)
            .ok_or(QuestError::UnknownQuest(quest_id))?;

        self.refresh_completion(requester, &def, now);

        let player = self
            .players
            .get(&requester)
            .ok_or(QuestError::UnknownPlayer(requester))?;
        if elig::quest_status(player, quest_id) != QuestStatus::Complete {
            return Ok(());
        }
        player.session.send(ServerMessage::OfferReward {
            giver,
            quest_id,
            reward_choices: def.reward_choices.clone(),
            reward_money: def.reward_money,
        });
        Ok(())
    }

    /// Turn-in dialog: request-items while something is missing, offer-reward
    /// once everything is in order.
    fn complete_quest(
        &mut self,
        requester: ObjectGuid,
        giver: ObjectGuid,
        quest_id: QuestId,
    ) -> Result<(), QuestError> {
        let now = Utc::now();
        let involved = self
            .objects
            .get(&giver)
            .map_or(false, |o| o.involves(quest_id));
        if !involved {
            return Err(QuestError::EligibilityDenied(
                "object is not the turn-in for this quest",
            ));
        }
        let def = self
            .catalog
            .definition(quest_id)
            .ok_or(QuestError::UnknownQuest(quest_id))?;
        let player = self
            .players
            .get(&requester)
            .ok_or(QuestError::UnknownPlayer(requester))?;
        let object = self
            .objects
            .get(&giver)
            .ok_or(QuestError::UnknownObject(giver))?;
        if !can_interact(player, object, &self.config) {
            return Err(QuestError::EligibilityDenied(
                "quest giver is out of reach",
            ));
        }

        let status = elig::quest_status(player, quest_id);
        if status == QuestStatus::None && !def.is_repeatable() {
            warn!(player = %requester, quest = quest_id,
                "turn-in for a quest not in possession (possible packet hacking)");
            return Err(QuestError::ProtocolViolation("quest not in possession"));
        }

        if status != QuestStatus::Complete {
            let completable = if def.is_repeatable() {
                elig::can_complete_repeatable(player, &def)
            } else {
                elig::can_complete_quest(player, &def, now)
            };
            player.session.send(ServerMessage::RequestItems {
                giver,
                quest_id,
                required_items: def.required_items.clone(),
                completable,
            });
        } else if !def.required_items.is_empty() {
            player.session.send(ServerMessage::RequestItems {
                giver,
                quest_id,
                required_items: def.required_items.clone(),
                completable: true,
            });
        } else {
            player.session.send(ServerMessage::OfferReward {
                giver,
                quest_id,
                reward_choices: def.reward_choices.clone(),
                reward_money: def.reward_money,
            });
        }
        Ok(())
    }

    fn swap_slots(&mut self, requester: ObjectGuid, slot_a: u8, slot_b: u8) -> Result<(), QuestError> {
        let (a, b) = (slot_a as usize, slot_b as usize);
        let player = self
            .players
            .get_mut(&requester)
            .ok_or(QuestError::UnknownPlayer(requester))?;
        if a == b || a >= player.quest_log.capacity() || b >= player.quest_log.capacity() {
            return Err(QuestError::ProtocolViolation("invalid quest log slots"));
        }
        player.quest_log.swap(a, b);

        let snapshots: Vec<(usize, QuestLogEntry)> = [a, b]
            .iter()
            .filter_map(|&i| player.quest_log.slot(i).map(|e| (i, e.clone())))
            .collect();
        for (slot, entry) in snapshots {
            self.store
                .persist_log(requester, slot, &entry, self.store_tx.clone());
        }
        Ok(())
    }

    /// Abandon whatever occupies a slot. Two-phase: the source item must be
    /// removable before anything is touched, otherwise the whole operation
    /// aborts.
    fn remove_quest(&mut self, requester: ObjectGuid, slot: u8) -> Result<(), QuestError> {
        let slot = slot as usize;
        let player = self
            .players
            .get(&requester)
            .ok_or(QuestError::UnknownPlayer(requester))?;
        if slot >= player.quest_log.capacity() {
            return Err(QuestError::ProtocolViolation("invalid quest log slot"));
        }
        let Some(entry) = player.quest_log.slot(slot) else {
            return Ok(());
        };
        let quest_id = entry.quest_id;
        let def = self
            .catalog
            .definition(quest_id)
            .ok_or(QuestError::UnknownQuest(quest_id))?;

        // The staged commit would land on a vanished entry otherwise.
        if self
            .pending_rewards
            .values()
            .any(|p| p.player == requester && p.tx.quest_id == quest_id)
        {
            return Err(QuestError::EligibilityDenied(
                "a reward commit is in flight for this quest",
            ));
        }

        if let Some(src) = def.source_item {
            if !player.inventory.can_remove(src.item_id) {
                return Err(QuestError::EligibilityDenied(
                    "quest item cannot be unequipped",
                ));
            }
        }

        let player = self
            .players
            .get_mut(&requester)
            .ok_or(QuestError::UnknownPlayer(requester))?;
        if let Some(src) = def.source_item {
            player.inventory.remove(src.item_id, src.count);
        }
        // Clearing the entry also drops any expiry timer it carried.
        player.quest_log.clear_slot(slot);
        if def.flags.pvp {
            player.pvp_forced = player.quest_log.iter().any(|(_, e)| {
                self.catalog
                    .definition(e.quest_id)
                    .map_or(false, |d| d.flags.pvp)
            });
        }
        player.session.send(ServerMessage::QuestRemoved { quest_id });
        info!(player = %requester, quest = quest_id, "quest abandoned");

        self.store
            .remove_log(requester, quest_id, self.store_tx.clone());
        if self.config.quest_tracker_enabled {
            self.store.track_abandon(requester, quest_id);
        }
        Ok(())
    }

    fn query_rewarded(&mut self, requester: ObjectGuid) -> Result<(), QuestError> {
        let player = self
            .players
            .get(&requester)
            .ok_or(QuestError::UnknownPlayer(requester))?;
        player.session.send(ServerMessage::RewardedList {
            quest_ids: player.rewarded.iter().collect(),
        });
        Ok(())
    }

    // ========================================================================
    // Progress events
    // ========================================================================

    /// Advance objective counters from a gameplay event and flip entries to
    /// Complete (or Failed, on timer lapse) where warranted.
    pub fn handle_event(&mut self, guid: ObjectGuid, event: QuestEvent) {
        let now = Utc::now();
        let Some(player) = self.players.get(&guid) else {
            return;
        };
        debug!(player = %guid, event = event.event_type(), "quest progress event");
        let active: Vec<QuestId> = player
            .quest_log
            .iter()
            .filter(|(_, e)| e.status == EntryStatus::Incomplete)
            .map(|(_, e)| e.quest_id)
            .collect();

        for quest_id in active {
            let Some(def) = self.catalog.definition(quest_id) else {
                continue;
            };
            let mut updates = Vec::new();
            let mut touched = false;
            let Some(player) = self.players.get_mut(&guid) else {
                return;
            };
            if let Some(entry) = player.quest_log.entry_mut(quest_id) {
                for (i, objective) in def.objectives.iter().enumerate() {
                    let amount = event.progress_for(objective);
                    if amount == 0 {
                        continue;
                    }
                    let before = entry.counters.get(i).copied().unwrap_or(0);
                    let current = entry.add_count(i, amount, objective.required);
                    if current != before {
                        touched = true;
                        updates.push((i, current, objective.required));
                    }
                    if objective.kind == crate::quest::definition::ObjectiveKind::Explore {
                        entry.explored = true;
                        touched = true;
                    }
                }
            }
            for (objective, current, required) in updates {
                player.session.send(ServerMessage::ObjectiveProgress {
                    quest_id,
                    objective,
                    current,
                    required,
                });
            }
            if touched {
                let snapshot = player.quest_log.find(quest_id).map(|(s, e)| (s, e.clone()));
                if let Some((slot, entry)) = snapshot {
                    self.store
                        .persist_log(guid, slot, &entry, self.store_tx.clone());
                }
                self.refresh_completion(guid, &def, now);
            }
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Insert a quest at Incomplete (or straight to Complete when nothing is
    /// outstanding), grant the source item, and persist.
    pub(crate) fn add_quest_internal(
        &mut self,
        guid: ObjectGuid,
        def: &Arc<QuestDefinition>,
        fire_start_effect: bool,
    ) -> Result<usize, QuestError> {
        let now = Utc::now();
        let player = self
            .players
            .get_mut(&guid)
            .ok_or(QuestError::UnknownPlayer(guid))?;

        if let Some(src) = def.source_item {
            player.inventory.store(&[ItemAmount {
                item_id: src.item_id,
                count: src.count,
            }]);
        }

        let mut entry = QuestLogEntry::new(def, now);
        if elig::objectives_satisfied(player, def, &entry, now) {
            entry.status = EntryStatus::Complete;
        }
        let snapshot = entry.clone();
        let slot = match player.quest_log.insert(entry) {
            Ok(slot) => slot,
            Err(QuestLogFull::Duplicate) => {
                return Err(QuestError::ProtocolViolation("quest already in log"))
            }
            Err(QuestLogFull::Full) => {
                return Err(QuestError::EligibilityDenied("quest log is full"))
            }
        };

        if def.flags.pvp {
            player.pvp_forced = true;
        }
        player.session.send(ServerMessage::QuestAdded {
            quest_id: def.id,
            slot,
        });
        if snapshot.status == EntryStatus::Complete {
            player
                .session
                .send(ServerMessage::QuestCompleted { quest_id: def.id });
        }
        if fire_start_effect {
            if let Some(effect) = def.start_effect {
                player.session.send(ServerMessage::StartEffect {
                    quest_id: def.id,
                    effect,
                });
            }
        }
        info!(player = %guid, quest = def.id, slot, "quest accepted");

        self.store
            .persist_log(guid, slot, &snapshot, self.store_tx.clone());
        Ok(slot)
    }

    /// Re-derive Complete/Failed for one entry from current objectives.
    pub(crate) fn refresh_completion(
        &mut self,
        guid: ObjectGuid,
        def: &QuestDefinition,
        now: DateTime<Utc>,
    ) {
        let Some(player) = self.players.get_mut(&guid) else {
            return;
        };
        let new_status = match player.quest_log.entry(def.id) {
            Some(entry) if entry.status == EntryStatus::Incomplete => {
                if entry.is_expired(now) {
                    Some(EntryStatus::Failed)
                } else if elig::objectives_satisfied(player, def, entry, now) {
                    Some(EntryStatus::Complete)
                } else {
                    None
                }
            }
            _ => None,
        };
        let Some(status) = new_status else {
            return;
        };

        if let Some(entry) = player.quest_log.entry_mut(def.id) {
            entry.status = status;
        }
        match status {
            EntryStatus::Complete => {
                player
                    .session
                    .send(ServerMessage::QuestCompleted { quest_id: def.id });
            }
            EntryStatus::Failed => {
                player
                    .session
                    .send(ServerMessage::QuestFailed { quest_id: def.id });
            }
            EntryStatus::Incomplete => {}
        }
        let snapshot = player.quest_log.find(def.id).map(|(s, e)| (s, e.clone()));
        if let Some((slot, entry)) = snapshot {
            self.store
                .persist_log(guid, slot, &entry, self.store_tx.clone());
        }
    }

    pub(crate) fn close_gossip(&mut self, guid: ObjectGuid) {
        if let Some(player) = self.players.get_mut(&guid) {
            player.session.open_gossip = None;
            player.session.send(ServerMessage::CloseGossip);
        }
    }

    /// Accept rejected outright: close the window and drop the reservation so
    /// the client is never left staring at a dead dialog.
    fn reject_accept(&mut self, guid: ObjectGuid) {
        if let Some(player) = self.players.get_mut(&guid) {
            player.session.open_gossip = None;
            player.session.divider = None;
            player.session.send(ServerMessage::CloseGossip);
        }
    }
}
