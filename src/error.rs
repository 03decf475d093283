//! Unified error type for quest operations
//!
//! Every failed client operation maps to one of these classes. The dispatcher
//! decides the log level from the class: protocol violations are logged as
//! possible exploit attempts, eligibility denials are routine.

use thiserror::Error;
use uuid::Uuid;

use crate::quest::definition::QuestId;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum QuestError {
    /// Malformed or out-of-range client input (bad reward index, bad slot,
    /// rewarding a quest the player does not hold). Never mutates state.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    /// A legitimate request the player is currently not allowed to perform.
    /// Busy dividers and failed durable commits are not errors at this level;
    /// they surface as push result codes and store completion events.
    #[error("not eligible: {0}")]
    EligibilityDenied(&'static str),

    #[error("unknown object {0}")]
    UnknownObject(Uuid),

    #[error("unknown player {0}")]
    UnknownPlayer(Uuid),

    #[error("unknown quest {0}")]
    UnknownQuest(QuestId),

    #[error("config error: {0}")]
    Config(String),

    #[error("catalog error: {0}")]
    Catalog(String),
}

impl QuestError {
    /// True for input that a well-behaved client can never produce.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, QuestError::ProtocolViolation(_))
    }
}
