//! Lifecycle of a submitted user operation.

use std::fmt;

use alloy_primitives::B256;
use keyway_core::ClassifiedError;
use tracing::debug;

use crate::types::UserOperationReceipt;

/// Progress of one submission through the relay.
///
/// Transitions only move forward: `Pending -> Submitted -> Included`, with
/// `Failed` reachable from either non-terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundlerRequestState {
    /// Not yet accepted by the relay.
    Pending,
    /// Accepted; carries the relay's operation hash.
    Submitted(B256),
    /// Mined, successfully or not.
    Included(Box<UserOperationReceipt>),
    /// Gave up with a classified error.
    Failed(ClassifiedError),
}

/// A transition that would move a request backwards or out of a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid request state transition from {from} to {to}")]
pub struct InvalidTransition {
    /// State the request was in.
    pub from: &'static str,
    /// State it was asked to move to.
    pub to: &'static str,
}

impl BundlerRequestState {
    /// Short lowercase name, used in logs.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Submitted(_) => "submitted",
            Self::Included(_) => "included",
            Self::Failed(_) => "failed",
        }
    }

    /// `Included` or `Failed`.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Included(_) | Self::Failed(_))
    }

    /// Hash assigned by the relay, once known.
    pub fn user_op_hash(&self) -> Option<B256> {
        match self {
            Self::Submitted(hash) => Some(*hash),
            Self::Included(receipt) => Some(receipt.user_op_hash),
            Self::Pending | Self::Failed(_) => None,
        }
    }

    /// Moves to `next`.
    ///
    /// Re-entering `Submitted` with the same hash is accepted as a no-op so a
    /// retried submission of an identical operation does not count as a
    /// transition.
    pub fn advance(&mut self, next: Self) -> Result<(), InvalidTransition> {
        let allowed = match (&*self, &next) {
            (Self::Pending, Self::Submitted(_) | Self::Failed(_)) => true,
            (Self::Submitted(current), Self::Submitted(hash)) => current == hash,
            (Self::Submitted(_), Self::Included(_) | Self::Failed(_)) => true,
            _ => false,
        };
        if !allowed {
            return Err(InvalidTransition { from: self.name(), to: next.name() });
        }
        if *self != next {
            debug!(from = self.name(), to = next.name(), user_op_hash = ?next.user_op_hash(), "bundler request state changed");
        }
        *self = next;
        Ok(())
    }
}

impl fmt::Display for BundlerRequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Submitted(hash) => write!(f, "submitted ({hash})"),
            Self::Included(receipt) => write!(f, "included ({})", receipt.user_op_hash),
            Self::Failed(err) => write!(f, "failed: {err}"),
            Self::Pending => f.write_str("pending"),
        }
    }
}
