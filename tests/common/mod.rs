//! Shared harness for the engine integration tests: an engine over a
//! `MemoryStore`, players with captured outbound channels, and quest
//! definition builders.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use questforge_server::object::{GiverKind, ObjectGuid, WorldObject};
use questforge_server::player::Player;
use questforge_server::protocol::ServerMessage;
use questforge_server::quest::catalog::QuestCatalog;
use questforge_server::quest::definition::{QuestDefinition, QuestId, RawQuest};
use questforge_server::store::MemoryStore;
use questforge_server::{QuestEngine, WorldConfig};

pub struct Harness {
    pub engine: QuestEngine,
    pub store: Arc<MemoryStore>,
    config: WorldConfig,
    receivers: HashMap<ObjectGuid, mpsc::UnboundedReceiver<ServerMessage>>,
}

impl Harness {
    pub fn new(defs: Vec<QuestDefinition>) -> Self {
        Self::with_config(defs, WorldConfig::default())
    }

    pub fn with_config(defs: Vec<QuestDefinition>, config: WorldConfig) -> Self {
        // First call wins; later harnesses reuse the same subscriber.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let catalog = Arc::new(QuestCatalog::from_definitions(defs));
        let store = Arc::new(MemoryStore::new());
        let engine = QuestEngine::new(catalog, config, store.clone());
        Self {
            engine,
            store,
            config,
            receivers: HashMap::new(),
        }
    }

    pub fn spawn_player(&mut self, level: u32) -> ObjectGuid {
        let guid = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.engine.add_player(Player::new(
            guid,
            format!("p-{}", guid),
            level,
            self.config.quest_log_capacity,
            tx,
        ));
        self.receivers.insert(guid, rx);
        guid
    }

    pub fn spawn_giver(&mut self, offered: &[QuestId], involved: &[QuestId]) -> ObjectGuid {
        self.spawn_object(GiverKind::Creature { hostile: false }, offered, involved)
    }

    pub fn spawn_object(
        &mut self,
        kind: GiverKind,
        offered: &[QuestId],
        involved: &[QuestId],
    ) -> ObjectGuid {
        let guid = Uuid::new_v4();
        let mut object = WorldObject::new(guid, kind, (0.0, 0.0));
        object.quests_offered = offered.to_vec();
        object.quests_involved = involved.to_vec();
        self.engine.add_object(object);
        guid
    }

    /// Everything sent to this player since the last drain.
    pub fn drain(&mut self, guid: ObjectGuid) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        if let Some(rx) = self.receivers.get_mut(&guid) {
            while let Ok(msg) = rx.try_recv() {
                messages.push(msg);
            }
        }
        messages
    }
}

/// A raw quest with everything optional left empty.
pub fn raw_quest(id: QuestId) -> RawQuest {
    RawQuest {
        id,
        title: format!("Quest {}", id),
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
        flags: Default::default(),
    }
}

pub fn build(raw: &RawQuest) -> QuestDefinition {
    QuestDefinition::from_raw(raw).unwrap()
}
