//! Party share handshake: fan-out result codes, the single-slot reservation,
//! stale acknowledgements, confirm-time re-checks, and implicit cancellation
//! on departure.

mod common;

use common::{build, raw_quest, Harness};

use questforge_server::object::ObjectGuid;
use questforge_server::protocol::{ClientRequest, PushResultCode, ServerMessage};
use questforge_server::quest::QuestStatus;
use questforge_server::QuestError;

fn shareable_quest(id: u32, min_level: u32) -> questforge_server::QuestDefinition {
    let mut r = raw_quest(id);
    r.min_level = min_level;
    r.flags.shareable = true;
    build(&r)
}

fn share_responses(msgs: &[ServerMessage]) -> Vec<(ObjectGuid, PushResultCode)> {
    msgs.iter()
        .filter_map(|m| match m {
            ServerMessage::ShareResponse { member, code } => Some((*member, *code)),
            _ => None,
        })
        .collect()
}

#[test]
fn test_push_to_party_classifies_each_member() {
    let mut config = questforge_server::WorldConfig::default();
    config.quest_log_capacity = 2;
    let defs = vec![
        shareable_quest(1, 10),
        shareable_quest(50, 0),
        shareable_quest(51, 0),
    ];
    let mut h = Harness::with_config(defs, config);

    let sharer = h.spawn_player(10);
    let has_quest = h.spawn_player(10);
    let finished = h.spawn_player(10);
    let too_low = h.spawn_player(1);
    let log_full = h.spawn_player(10);
    let eligible = h.spawn_player(10);
    let giver = h.spawn_giver(&[1, 50, 51], &[]);

    h.engine
        .handle(sharer, ClientRequest::AcceptQuest { giver, quest_id: 1 })
        .unwrap();
    h.engine
        .handle(has_quest, ClientRequest::AcceptQuest { giver, quest_id: 1 })
        .unwrap();
    h.engine.player_mut(finished).unwrap().rewarded.insert(1);
    for filler in [50, 51] {
        h.engine
            .handle(log_full, ClientRequest::AcceptQuest { giver, quest_id: filler })
            .unwrap();
    }
    h.engine
        .create_group(&[sharer, has_quest, finished, too_low, log_full, eligible]);
    h.drain(sharer);

    h.engine
        .handle(sharer, ClientRequest::PushToParty { quest_id: 1 })
        .unwrap();

    let responses = share_responses(&h.drain(sharer));
    assert_eq!(
        responses,
        vec![
            (has_quest, PushResultCode::HaveQuest),
            (finished, PushResultCode::FinishQuest),
            (too_low, PushResultCode::CantTake),
            (log_full, PushResultCode::LogFull),
            (eligible, PushResultCode::Sharing),
        ]
    );

    // The eligible member got the detail view plus a reservation.
    assert!(h.drain(eligible).iter().any(|m| matches!(
        m,
        ServerMessage::QuestDetails { quest_id: 1, shared: true, .. }
    )));
    let offer = h
        .engine
        .player(eligible)
        .unwrap()
        .session
        .divider
        .clone()
        .unwrap();
    assert_eq!(offer.sharer, sharer);
    assert_eq!(offer.quest_id, 1);
}

#[test]
fn test_member_with_pending_offer_is_busy() {
    let defs = vec![shareable_quest(1, 0), shareable_quest(2, 0)];
    let mut h = Harness::new(defs);
    let sharer_a = h.spawn_player(10);
    let sharer_b = h.spawn_player(10);
    let member = h.spawn_player(10);
    let giver = h.spawn_giver(&[1, 2], &[]);

    h.engine
        .handle(sharer_a, ClientRequest::AcceptQuest { giver, quest_id: 1 })
        .unwrap();
    h.engine
        .handle(sharer_b, ClientRequest::AcceptQuest { giver, quest_id: 2 })
        .unwrap();
    h.engine.create_group(&[sharer_a, sharer_b, member]);

    h.engine
        .handle(sharer_a, ClientRequest::PushToParty { quest_id: 1 })
        .unwrap();
    h.engine
        .handle(sharer_b, ClientRequest::PushToParty { quest_id: 2 })
        .unwrap();

    let responses = share_responses(&h.drain(sharer_b));
    assert!(responses.contains(&(member, PushResultCode::Busy)));
    // The first reservation is untouched.
    let offer = h.engine.player(member).unwrap().session.divider.clone().unwrap();
    assert_eq!(offer.quest_id, 1);
}

#[test]
fn test_push_result_resolves_offer_and_drops_stale_acks() {
    let mut h = Harness::new(vec![shareable_quest(1, 0)]);
    let sharer = h.spawn_player(10);
    let member = h.spawn_player(10);
    let giver = h.spawn_giver(&[1], &[]);

    h.engine
        .handle(sharer, ClientRequest::AcceptQuest { giver, quest_id: 1 })
        .unwrap();
    h.engine.create_group(&[sharer, member]);
    h.engine
        .handle(sharer, ClientRequest::PushToParty { quest_id: 1 })
        .unwrap();
    h.drain(sharer);

    h.engine
        .handle(
            member,
            ClientRequest::PushResult {
                sharer,
                quest_id: 1,
                code: PushResultCode::Declined,
            },
        )
        .unwrap();
    let responses = share_responses(&h.drain(sharer));
    assert_eq!(responses, vec![(member, PushResultCode::Declined)]);
    assert!(h.engine.player(member).unwrap().session.divider.is_none());

    // A second ack no longer matches any reservation and is dropped.
    h.engine
        .handle(
            member,
            ClientRequest::PushResult {
                sharer,
                quest_id: 1,
                code: PushResultCode::Declined,
            },
        )
        .unwrap();
    assert!(share_responses(&h.drain(sharer)).is_empty());
}

#[test]
fn test_accepting_shared_quest_notifies_sharer() {
    let mut h = Harness::new(vec![shareable_quest(1, 0)]);
    let sharer = h.spawn_player(10);
    let member = h.spawn_player(10);
    let giver = h.spawn_giver(&[1], &[]);

    h.engine
        .handle(sharer, ClientRequest::AcceptQuest { giver, quest_id: 1 })
        .unwrap();
    h.engine.create_group(&[sharer, member]);
    h.engine
        .handle(sharer, ClientRequest::PushToParty { quest_id: 1 })
        .unwrap();
    h.drain(sharer);

    // The sharer is the giver for a share accept.
    h.engine
        .handle(
            member,
            ClientRequest::AcceptQuest {
                giver: sharer,
                quest_id: 1,
            },
        )
        .unwrap();

    assert_eq!(h.engine.quest_status(member, 1), QuestStatus::Incomplete);
    assert!(h.engine.player(member).unwrap().session.divider.is_none());
    let responses = share_responses(&h.drain(sharer));
    assert_eq!(responses, vec![(member, PushResultCode::Accepted)]);
}

#[test]
fn test_confirm_accept_resolves_pushed_offer() {
    let mut h = Harness::new(vec![shareable_quest(1, 0)]);
    let sharer = h.spawn_player(10);
    let member = h.spawn_player(10);
    let giver = h.spawn_giver(&[1], &[]);

    h.engine
        .handle(sharer, ClientRequest::AcceptQuest { giver, quest_id: 1 })
        .unwrap();
    h.engine.create_group(&[sharer, member]);
    h.engine
        .handle(sharer, ClientRequest::PushToParty { quest_id: 1 })
        .unwrap();

    h.engine
        .handle(member, ClientRequest::ConfirmAccept { quest_id: 1 })
        .unwrap();
    assert_eq!(h.engine.quest_status(member, 1), QuestStatus::Incomplete);
    assert!(h.engine.player(member).unwrap().session.divider.is_none());
    assert_eq!(h.engine.player(member).unwrap().quest_log.occupied(), 1);
}

#[test]
fn test_sellable_source_item_blocks_sharing() {
    let mut r = raw_quest(1);
    r.flags.shareable = true;
    r.source_item = Some(questforge_server::quest::definition::SourceItem {
        item_id: 6,
        count: 1,
        sell_price: 25,
    });
    let mut h = Harness::new(vec![build(&r)]);
    let sharer = h.spawn_player(10);
    let member = h.spawn_player(10);
    let giver = h.spawn_giver(&[1], &[]);

    h.engine
        .handle(sharer, ClientRequest::AcceptQuest { giver, quest_id: 1 })
        .unwrap();
    h.engine.create_group(&[sharer, member]);

    let err = h
        .engine
        .handle(sharer, ClientRequest::PushToParty { quest_id: 1 })
        .unwrap_err();
    assert!(matches!(err, QuestError::EligibilityDenied(_)));

    // A direct player-giver accept is refused for the same reason.
    let err = h
        .engine
        .handle(
            member,
            ClientRequest::AcceptQuest {
                giver: sharer,
                quest_id: 1,
            },
        )
        .unwrap_err();
    assert!(matches!(err, QuestError::EligibilityDenied(_)));
    assert_eq!(h.engine.quest_status(member, 1), QuestStatus::None);
}

#[test]
fn test_confirm_accept_rechecks_distance() {
    let mut r = raw_quest(1);
    r.flags.shareable = true;
    r.flags.party_accept = true;
    let mut h = Harness::new(vec![build(&r)]);
    let sharer = h.spawn_player(10);
    let member = h.spawn_player(10);
    let giver = h.spawn_giver(&[1], &[]);

    h.engine.create_group(&[sharer, member]);
    // Accepting a party-accept quest fans confirmation offers out.
    h.engine
        .handle(sharer, ClientRequest::AcceptQuest { giver, quest_id: 1 })
        .unwrap();

    assert!(h.drain(member).iter().any(|m| matches!(
        m,
        ServerMessage::QuestConfirmAccept { quest_id: 1, .. }
    )));
    assert!(h.engine.player(member).unwrap().session.divider.is_some());

    // The member wandered off before confirming.
    h.engine.player_mut(member).unwrap().position = (1000.0, 0.0);
    let err = h
        .engine
        .handle(member, ClientRequest::ConfirmAccept { quest_id: 1 })
        .unwrap_err();
    assert!(matches!(err, QuestError::EligibilityDenied(_)));
    assert_eq!(h.engine.quest_status(member, 1), QuestStatus::None);
    // The offer survives a failed confirm; it can still be declined.
    assert!(h.engine.player(member).unwrap().session.divider.is_some());

    h.engine.player_mut(member).unwrap().position = (0.0, 0.0);
    h.engine
        .handle(member, ClientRequest::ConfirmAccept { quest_id: 1 })
        .unwrap();
    assert_eq!(h.engine.quest_status(member, 1), QuestStatus::Incomplete);
    assert!(h.engine.player(member).unwrap().session.divider.is_none());
}

#[test]
fn test_departure_withdraws_offers_both_ways() {
    let mut h = Harness::new(vec![shareable_quest(1, 0)]);
    let sharer = h.spawn_player(10);
    let member_a = h.spawn_player(10);
    let member_b = h.spawn_player(10);
    let giver = h.spawn_giver(&[1], &[]);

    h.engine
        .handle(sharer, ClientRequest::AcceptQuest { giver, quest_id: 1 })
        .unwrap();
    h.engine.create_group(&[sharer, member_a, member_b]);
    h.engine
        .handle(sharer, ClientRequest::PushToParty { quest_id: 1 })
        .unwrap();
    h.drain(sharer);

    // A member leaving resolves their reservation as cancelled.
    h.engine.remove_player(member_a);
    let responses = share_responses(&h.drain(sharer));
    assert_eq!(responses, vec![(member_a, PushResultCode::Cancelled)]);

    // The sharer leaving clears the remaining member's reservation.
    h.engine.remove_player(sharer);
    assert!(h.engine.player(member_b).unwrap().session.divider.is_none());
}

#[test]
fn test_share_blocked_in_battleground() {
    let mut config = questforge_server::WorldConfig::default();
    config.disable_quest_share_in_bg = true;
    let mut h = Harness::with_config(vec![shareable_quest(1, 0)], config);
    let sharer = h.spawn_player(10);
    let member = h.spawn_player(10);
    let giver = h.spawn_giver(&[1], &[]);

    h.engine
        .handle(sharer, ClientRequest::AcceptQuest { giver, quest_id: 1 })
        .unwrap();
    h.engine.player_mut(sharer).unwrap().in_battleground = true;
    h.engine.create_group(&[sharer, member]);
    h.drain(sharer);

    h.engine
        .handle(sharer, ClientRequest::PushToParty { quest_id: 1 })
        .unwrap();

    let msgs = h.drain(sharer);
    assert!(share_responses(&msgs).is_empty());
    assert!(msgs
        .iter()
        .any(|m| matches!(m, ServerMessage::Notification { .. })));
    assert!(h.engine.player(member).unwrap().session.divider.is_none());
}

#[test]
fn test_non_shareable_quest_cannot_be_pushed() {
    let mut h = Harness::new(vec![build(&raw_quest(1))]);
    let sharer = h.spawn_player(10);
    let member = h.spawn_player(10);
    let giver = h.spawn_giver(&[1], &[]);

    h.engine
        .handle(sharer, ClientRequest::AcceptQuest { giver, quest_id: 1 })
        .unwrap();
    h.engine.create_group(&[sharer, member]);

    let err = h
        .engine
        .handle(sharer, ClientRequest::PushToParty { quest_id: 1 })
        .unwrap_err();
    assert!(matches!(err, QuestError::EligibilityDenied(_)));
}
