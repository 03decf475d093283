//! Party Quest Sharing
//!
//! Offer fan-out, the single-slot reservation each member holds for an
//! unresolved incoming offer, and the confirm/decline handshake back to the
//! sharer. A member with a reservation is Busy until it resolves; offers are
//! withdrawn implicitly when either side leaves the group or the world.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::engine::QuestEngine;
use crate::error::QuestError;
use crate::object::ObjectGuid;
use crate::protocol::{PushResultCode, ServerMessage};
use crate::quest::definition::{QuestDefinition, QuestId};
use crate::quest::eligibility as elig;

/// An unresolved incoming share offer held by a party member
#[derive(Debug, Clone, PartialEq)]
pub struct ShareOffer {
    pub sharer: ObjectGuid,
    pub quest_id: QuestId,
    pub created_at: DateTime<Utc>,
}

/// Per-member outcome decided during the fan-out pass
enum ShareAction {
    Respond(PushResultCode),
    BgBlocked,
    AutoGrant,
    Offer,
}

impl QuestEngine {
    /// Offer one of the requester's quests to every party member. Each member
    /// is classified in a fixed precedence order so the sharer's result codes
    /// stay deterministic.
    pub(crate) fn push_to_party(
        &mut self,
        requester: ObjectGuid,
        quest_id: QuestId,
    ) -> Result<(), QuestError> {
        let def = self
            .catalog
            .definition(quest_id)
            .ok_or(QuestError::UnknownQuest(quest_id))?;

        let (group, sharer_map, sharer_in_bg) = {
            let player = self
                .players
                .get(&requester)
                .ok_or(QuestError::UnknownPlayer(requester))?;
            if !elig::can_share_quest(player, &def) {
                return Err(QuestError::EligibilityDenied("quest cannot be shared"));
            }
            (player.group, player.map, player.in_battleground)
        };
        let Some(group_id) = group else {
            return Ok(());
        };
        let members: Vec<ObjectGuid> = self
            .groups
            .get(&group_id)
            .map(|g| g.members().to_vec())
            .unwrap_or_default();

        let now = Utc::now();
        let mut plan: Vec<(ObjectGuid, ShareAction)> = Vec::new();
        for guid in members {
            if guid == requester {
                continue;
            }
            let Some(member) = self.players.get(&guid) else {
                continue;
            };
            // Members in another partition are skipped silently.
            if member.map != sharer_map {
                continue;
            }
            let action = if member.quest_log.entry(quest_id).is_some() {
                ShareAction::Respond(PushResultCode::HaveQuest)
            } else if member.rewarded.contains(quest_id) && !def.is_repeatable() {
                ShareAction::Respond(PushResultCode::FinishQuest)
            } else if !elig::can_take_quest(member, &def) {
                ShareAction::Respond(PushResultCode::CantTake)
            } else if member.quest_log.is_full() {
                ShareAction::Respond(PushResultCode::LogFull)
            } else if self.config.disable_quest_share_in_bg && sharer_in_bg {
                ShareAction::BgBlocked
            } else if member.session.divider.is_some() {
                ShareAction::Respond(PushResultCode::Busy)
            } else if def.is_auto_accept() && elig::can_add_quest(member, &def) {
                ShareAction::AutoGrant
            } else {
                ShareAction::Offer
            };
            plan.push((guid, action));
        }

        let sharer_sender = self
            .players
            .get(&requester)
            .map(|p| p.session.sender())
            .ok_or(QuestError::UnknownPlayer(requester))?;

        for (guid, action) in plan {
            match action {
                ShareAction::Respond(code) => {
                    let _ = sharer_sender.send(ServerMessage::ShareResponse { member: guid, code });
                }
                ShareAction::BgBlocked => {
                    let _ = sharer_sender.send(ServerMessage::Notification {
                        text: "Quest sharing is disabled in battlegrounds.".to_string(),
                    });
                }
                ShareAction::AutoGrant => {
                    let _ = sharer_sender.send(ServerMessage::ShareResponse {
                        member: guid,
                        code: PushResultCode::Sharing,
                    });
                    let _ = self.add_quest_internal(guid, &def, true);
                    info!(sharer = %requester, member = %guid, quest = quest_id,
                        "shared quest auto-granted");
                }
                ShareAction::Offer => {
                    let _ = sharer_sender.send(ServerMessage::ShareResponse {
                        member: guid,
                        code: PushResultCode::Sharing,
                    });
                    if let Some(member) = self.players.get_mut(&guid) {
                        member.session.divider = Some(ShareOffer {
                            sharer: requester,
                            quest_id,
                            created_at: now,
                        });
                        member.session.send(ServerMessage::QuestDetails {
                            giver: requester,
                            quest_id,
                            title: def.title.clone(),
                            reward_choices: def.reward_choices.clone(),
                            reward_money: def.reward_money,
                            shared: true,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// A member echoes their offer outcome toward the sharer. Only an ack
    /// matching the pending reservation resolves it; anything else is a stale
    /// echo and is dropped.
    pub(crate) fn push_result(
        &mut self,
        requester: ObjectGuid,
        sharer: ObjectGuid,
        quest_id: QuestId,
        code: PushResultCode,
    ) -> Result<(), QuestError> {
        let offer = self
            .players
            .get(&requester)
            .ok_or(QuestError::UnknownPlayer(requester))?
            .session
            .divider
            .clone();
        let Some(offer) = offer else {
            return Ok(());
        };
        if offer.sharer != sharer || offer.quest_id != quest_id {
            debug!(player = %requester, sharer = %sharer, quest = quest_id,
                "dropping stale quest push result");
            return Ok(());
        }
        if let Some(player) = self.players.get_mut(&requester) {
            player.session.divider = None;
        }
        if let Some(sharer) = self.players.get(&sharer) {
            sharer
                .session
                .send(ServerMessage::ShareResponse { member: requester, code });
        }
        Ok(())
    }

    /// Accept a shared quest from the pending reservation. Group membership
    /// and distance are re-checked here; the world may have moved on since
    /// the offer went out.
    pub(crate) fn confirm_accept(
        &mut self,
        requester: ObjectGuid,
        quest_id: QuestId,
    ) -> Result<(), QuestError> {
        let def = self
            .catalog
            .definition(quest_id)
            .ok_or(QuestError::UnknownQuest(quest_id))?;
        if !def.flags.party_accept && !def.flags.shareable {
            return Err(QuestError::ProtocolViolation(
                "quest is not party-confirmable",
            ));
        }

        let offer = self
            .players
            .get(&requester)
            .ok_or(QuestError::UnknownPlayer(requester))?
            .session
            .divider
            .clone();
        let Some(offer) = offer else {
            return Err(QuestError::EligibilityDenied("no pending share offer"));
        };
        if offer.quest_id != quest_id {
            return Err(QuestError::EligibilityDenied(
                "pending offer is for a different quest",
            ));
        }

        let Some(sharer) = self.players.get(&offer.sharer) else {
            // Sharer is gone; the offer dies with them.
            if let Some(player) = self.players.get_mut(&requester) {
                player.session.divider = None;
            }
            return Err(QuestError::EligibilityDenied(
                "sharer is no longer available",
            ));
        };
        let (sharer_group, sharer_pos, sharer_map) = (sharer.group, sharer.position, sharer.map);

        let member = self
            .players
            .get(&requester)
            .ok_or(QuestError::UnknownPlayer(requester))?;
        let same_group = member.group.is_some() && member.group == sharer_group;
        let in_range = member.map == sharer_map
            && member.distance_to(sharer_pos) <= self.config.group_reward_distance;
        if !same_group || !in_range {
            return Err(QuestError::EligibilityDenied(
                "sharer is out of group or range",
            ));
        }
        if def.has_sellable_source_item() {
            return Err(QuestError::ProtocolViolation(
                "shared quest grants a sellable item",
            ));
        }
        if !elig::can_take_quest(member, &def) {
            return Err(QuestError::EligibilityDenied("cannot take this quest"));
        }

        if elig::can_add_quest(member, &def) {
            // The start effect already fired for the sharer's accept.
            self.add_quest_internal(requester, &def, false)?;
        }
        if let Some(player) = self.players.get_mut(&requester) {
            player.session.divider = None;
        }
        Ok(())
    }

    /// After the sharer accepts a party-confirmable quest, every nearby and
    /// eligible member gets a confirmation prompt backed by a reservation.
    pub(crate) fn fan_out_confirm_offers(
        &mut self,
        sharer: ObjectGuid,
        def: &QuestDefinition,
    ) {
        let Some(player) = self.players.get(&sharer) else {
            return;
        };
        let Some(group_id) = player.group else {
            return;
        };
        let (sharer_pos, sharer_map) = (player.position, player.map);
        let members: Vec<ObjectGuid> = self
            .groups
            .get(&group_id)
            .map(|g| g.members().to_vec())
            .unwrap_or_default();

        let now = Utc::now();
        for guid in members {
            if guid == sharer {
                continue;
            }
            let Some(member) = self.players.get_mut(&guid) else {
                continue;
            };
            if member.map != sharer_map
                || member.distance_to(sharer_pos) > self.config.group_reward_distance
            {
                continue;
            }
            if !elig::can_take_quest(member, def) {
                continue;
            }
            if member.session.divider.is_some() {
                continue;
            }
            member.session.divider = Some(ShareOffer {
                sharer,
                quest_id: def.id,
                created_at: now,
            });
            member.session.open_gossip = None;
            member.session.send(ServerMessage::CloseGossip);
            member.session.send(ServerMessage::QuestConfirmAccept {
                quest_id: def.id,
                sharer,
            });
        }
    }

    /// Resolve the player's own pending incoming offer, notifying whoever
    /// shared it. No-op without a reservation.
    pub(crate) fn resolve_divider(&mut self, guid: ObjectGuid, code: PushResultCode) {
        let offer = match self.players.get_mut(&guid) {
            Some(player) => player.session.divider.take(),
            None => None,
        };
        let Some(offer) = offer else {
            return;
        };
        if let Some(sharer) = self.players.get(&offer.sharer) {
            sharer
                .session
                .send(ServerMessage::ShareResponse { member: guid, code });
        }
    }

    /// Withdraw every share offer touching this player, in both directions.
    /// Called on group leave and on departure from the world.
    pub(crate) fn cancel_offers_with(&mut self, guid: ObjectGuid) {
        self.resolve_divider(guid, PushResultCode::Cancelled);

        let holders: Vec<ObjectGuid> = self
            .players
            .iter()
            .filter(|(_, p)| {
                p.session
                    .divider
                    .as_ref()
                    .map_or(false, |o| o.sharer == guid)
            })
            .map(|(g, _)| *g)
            .collect();
        for holder in holders {
            if let Some(player) = self.players.get_mut(&holder) {
                player.session.divider = None;
                player.session.send(ServerMessage::CloseGossip);
            }
            debug!(member = %holder, sharer = %guid, "share offer withdrawn by departure");
        }
    }
}
