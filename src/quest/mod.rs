//! Quest System Module
//!
//! Static definitions, the per-player log, pure eligibility rules, and the
//! progress events that tie gameplay back into objectives.

pub mod catalog;
pub mod definition;
pub mod eligibility;
pub mod events;
pub mod log;

pub use catalog::QuestCatalog;
pub use definition::{ItemAmount, ObjectiveKind, QuestDefinition, QuestFlags, QuestId};
pub use events::QuestEvent;
pub use log::{EntryStatus, QuestLog, QuestLogEntry, QuestStatus, RewardedSet};
