//! Coordination denials

use crate::oss::ObjectStoreError;
use crate::types::AgoraError;

/// Why a topic write was refused
#[derive(Debug, thiserror::Error)]
pub enum CoordinationError {
    #[error("not your turn")]
    NotYourTurn,

    #[error("already written: {0}")]
    AlreadyWritten(String),

    #[error("already queued for this turn")]
    AlreadyQueued,

    #[error("the current speaker cannot join the queue")]
    SpeakerCannotQueue,

    #[error("slots full")]
    SlotsFull,

    #[error("no slot held")]
    NoSlotHeld,

    #[error("caller does not hold the beat")]
    NotHolder,

    #[error("unknown role: {0}")]
    UnknownRole(String),

    #[error("role already taken: {0}")]
    RoleTaken(String),

    #[error("role not held: {0}")]
    RoleNotHeld(String),

    #[error("caller is not a participant")]
    NotParticipant,

    #[error("daily proposal quota exhausted")]
    QuotaExhausted,

    #[error("proposal type not allowed: {0}")]
    ProposalTypeNotAllowed(String),

    #[error("deadline passed")]
    DeadlinePassed,

    #[error("round is not open")]
    PhaseClosed,

    #[error("voting is disabled for this topic")]
    VotingDisabled,

    #[error("topic has not started")]
    NotStarted,

    #[error("request '{request}' is not supported in mode '{mode}'")]
    RequestNotSupported { mode: String, request: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unknown topic mode: {0}")]
    UnknownMode(String),

    #[error("invalid topic rules: {0}")]
    InvalidRules(String),

    #[error("invalid topic state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Store(#[from] ObjectStoreError),
}

impl From<CoordinationError> for AgoraError {
    fn from(err: CoordinationError) -> Self {
        use CoordinationError::*;
        match err {
            AlreadyWritten(_) | AlreadyQueued | SlotsFull | RoleTaken(_) | QuotaExhausted => {
                AgoraError::Conflict(err.to_string())
            }
            NotYourTurn | SpeakerCannotQueue | NoSlotHeld | NotHolder | UnknownRole(_) | RoleNotHeld(_) | NotParticipant
            | ProposalTypeNotAllowed(_) | DeadlinePassed | PhaseClosed | VotingDisabled | NotStarted => {
                AgoraError::Forbidden(err.to_string())
            }
            RequestNotSupported { .. } | InvalidRequest(_) | UnknownMode(_) => AgoraError::BadRequest(err.to_string()),
            InvalidRules(_) | InvalidState(_) => AgoraError::Internal(err.to_string()),
            Store(e) => e.into(),
        }
    }
}
