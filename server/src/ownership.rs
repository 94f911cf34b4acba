//! Paddle ownership protocol
//!
//! Each paddle is a two-state machine, `Free` or `Locked(owner)`:
//!
//! - `Free -> Locked(P)` on a grab by `P`
//! - `Locked(P) -> Free` on a release by `P`
//! - any grab while locked is rejected, including one by the owner
//! - a release by anyone but the owner is rejected
//!
//! There is no queueing and no retry. A rejected caller has to ask again.
//! The transitions here are pure; the store applies them under its lock and
//! moves the requester's control pointer alongside.

use shared::{AckStatus, PaddleId, PlayerId, ServerMessage};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OwnershipError {
    #[error("paddle already locked")]
    AlreadyLocked,
    #[error("you do not own this paddle")]
    NotOwner,
    #[error("invalid paddle")]
    InvalidPaddle,
    #[error("unknown player")]
    UnknownPlayer,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PaddleLock {
    #[default]
    Free,
    Locked(PlayerId),
}

impl PaddleLock {
    pub fn grab(&mut self, requester: &PlayerId) -> Result<(), OwnershipError> {
        match self {
            PaddleLock::Free => {
                *self = PaddleLock::Locked(requester.clone());
                Ok(())
            }
            PaddleLock::Locked(_) => Err(OwnershipError::AlreadyLocked),
        }
    }

    pub fn release(&mut self, requester: &PlayerId) -> Result<(), OwnershipError> {
        if self.owner() != Some(requester) {
            return Err(OwnershipError::NotOwner);
        }
        *self = PaddleLock::Free;
        Ok(())
    }

    /// Drops the lock if `player` holds it. Returns whether anything changed.
    pub fn release_if_held_by(&mut self, player: &PlayerId) -> bool {
        self.release(player).is_ok()
    }

    pub fn owner(&self) -> Option<&PlayerId> {
        match self {
            PaddleLock::Free => None,
            PaddleLock::Locked(owner) => Some(owner),
        }
    }

    pub fn is_free(&self) -> bool {
        matches!(self, PaddleLock::Free)
    }
}

fn status_of(result: &Result<(), OwnershipError>) -> (AckStatus, Option<String>) {
    match result {
        Ok(()) => (AckStatus::Success, None),
        Err(e) => (AckStatus::Failed, Some(e.to_string())),
    }
}

pub fn grab_ack(paddle_id: PaddleId, result: &Result<(), OwnershipError>) -> ServerMessage {
    let (status, reason) = status_of(result);
    ServerMessage::GrabAck {
        status,
        paddle_id,
        reason,
    }
}

pub fn release_ack(paddle_id: PaddleId, result: &Result<(), OwnershipError>) -> ServerMessage {
    let (status, reason) = status_of(result);
    ServerMessage::ReleaseAck {
        status,
        paddle_id,
        reason,
    }
}
