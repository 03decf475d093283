//! Quest Protocol Messages
//!
//! One inbound request per client quest operation and the outbound views the
//! engine pushes back to sessions. Wire encoding is a separate layer; these
//! enums are the engine's contract.

use serde::{Deserialize, Serialize};

use crate::object::ObjectGuid;
use crate::quest::definition::{ItemAmount, QuestId};
use crate::quest::log::QuestStatus;

// ============================================================================
// Client -> Server Requests
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientRequest {
    /// Open a giver's gossip/quest menu.
    Hello { giver: ObjectGuid },

    /// Ask for the giver's quest marker relative to this player.
    StatusQuery { giver: ObjectGuid },

    /// Ask for a quest definition by id.
    QuestQuery { quest_id: QuestId },

    /// Open the detail or request-items view for one of a giver's quests.
    QueryQuest { giver: ObjectGuid, quest_id: QuestId },

    /// Accept a quest from a giver (or from a sharing player).
    AcceptQuest { giver: ObjectGuid, quest_id: QuestId },

    /// Turn in a quest and pick a reward choice.
    ChooseReward {
        giver: ObjectGuid,
        quest_id: QuestId,
        reward_index: u32,
    },

    /// Re-poll completion and ask for the offer-reward view.
    RequestReward { giver: ObjectGuid, quest_id: QuestId },

    /// Open the turn-in dialog for an involved quest.
    CompleteQuest { giver: ObjectGuid, quest_id: QuestId },

    /// Close any open interaction UI.
    Cancel,

    /// Reorder two quest log slots.
    SwapSlots { slot_a: u8, slot_b: u8 },

    /// Abandon whatever occupies a quest log slot.
    RemoveQuest { slot: u8 },

    /// Accept a party-shared quest from the pending offer.
    ConfirmAccept { quest_id: QuestId },

    /// Offer one of our quests to every party member.
    PushToParty { quest_id: QuestId },

    /// Echo a share offer outcome back toward the sharer.
    PushResult {
        sharer: ObjectGuid,
        quest_id: QuestId,
        code: PushResultCode,
    },

    /// Ask for the set of quests ever rewarded.
    QueryRewarded,
}

// ============================================================================
// Server -> Client Messages
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    QuestGiverStatus {
        giver: ObjectGuid,
        status: DialogStatus,
    },
    GossipMenu {
        giver: ObjectGuid,
        quests: Vec<GossipQuestEntry>,
    },
    /// Full detail view for one quest.
    QuestDetails {
        giver: ObjectGuid,
        quest_id: QuestId,
        title: String,
        reward_choices: Vec<ItemAmount>,
        reward_money: i64,
        /// True when this view comes from a share offer.
        shared: bool,
    },
    /// Turn-in view listing what is still required.
    RequestItems {
        giver: ObjectGuid,
        quest_id: QuestId,
        required_items: Vec<ItemAmount>,
        completable: bool,
    },
    /// Reward-choice view at turn-in.
    OfferReward {
        giver: ObjectGuid,
        quest_id: QuestId,
        reward_choices: Vec<ItemAmount>,
        reward_money: i64,
    },
    CloseGossip,
    /// A party member asks this session to confirm a shared quest.
    QuestConfirmAccept {
        quest_id: QuestId,
        sharer: ObjectGuid,
    },
    /// Outcome of one share offer, delivered to the sharer.
    ShareResponse {
        member: ObjectGuid,
        code: PushResultCode,
    },
    QuestAdded {
        quest_id: QuestId,
        slot: usize,
    },
    QuestCompleted {
        quest_id: QuestId,
    },
    QuestFailed {
        quest_id: QuestId,
    },
    QuestRemoved {
        quest_id: QuestId,
    },
    QuestRewarded {
        quest_id: QuestId,
    },
    ObjectiveProgress {
        quest_id: QuestId,
        objective: usize,
        current: u32,
        required: u32,
    },
    /// One-shot effect fired when a quest is first accepted.
    StartEffect {
        quest_id: QuestId,
        effect: u32,
    },
    QuestDefinitionView {
        quest_id: QuestId,
        title: String,
        status: QuestStatus,
    },
    RewardedList {
        quest_ids: Vec<QuestId>,
    },
    /// Chat-style system notification.
    Notification {
        text: String,
    },
    /// The durable store rejected a commit; the operation can be retried.
    DurableWriteFailed {
        quest_id: QuestId,
    },
}

/// One row of a giver's gossip menu
#[derive(Debug, Clone, Serialize)]
pub struct GossipQuestEntry {
    pub quest_id: QuestId,
    pub title: String,
    pub status: DialogStatus,
}

/// Quest marker shown over a giver for a particular player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogStatus {
    None,
    /// Has a quest of ours that is not finished yet
    Incomplete,
    /// Offers a quest we can take
    Available,
    /// Holds the turn-in for a quest we finished
    Completable,
    /// Offers an auto-complete quest, reward pending
    Reward,
}

/// Result codes for the party share handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushResultCode {
    Sharing,
    CantTake,
    Accepted,
    Declined,
    Busy,
    LogFull,
    HaveQuest,
    FinishQuest,
    /// Offer implicitly withdrawn (departure, disconnect).
    Cancelled,
}
