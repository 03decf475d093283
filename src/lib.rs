//! Quest lifecycle engine for an MMO game server.
//!
//! The engine owns the static quest catalog, per-player quest logs, the party
//! share handshake, and the staged reward commits that keep turn-ins atomic
//! against the durable store. Transport and combat live elsewhere; this crate
//! is the authoritative state machine between them.

pub mod config;
pub mod engine;
pub mod error;
pub mod group;
pub mod object;
pub mod player;
pub mod protocol;
pub mod quest;
pub mod reward;
pub mod share;
pub mod store;

pub use config::WorldConfig;
pub use engine::QuestEngine;
pub use error::QuestError;
pub use object::{GiverKind, ObjectGuid, WorldObject};
pub use player::{Inventory, Player, Session};
pub use protocol::{ClientRequest, DialogStatus, PushResultCode, ServerMessage};
pub use quest::{QuestCatalog, QuestDefinition, QuestId, QuestStatus};
pub use reward::RewardTransaction;
pub use share::ShareOffer;
pub use store::{DurableStore, MemoryStore, SqliteStore};
