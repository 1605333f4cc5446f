//! Error taxonomy for the rescue engine.

use thiserror::Error;

use crate::types::{AgentId, Cell, VictimId, VictimState};

#[derive(Debug, Error)]
pub enum SimError {
    /// Rejected before the run starts; no partial run exists.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Recovered inside the agent state machine, never surfaced by `Simulation::step`.
    #[error("no path from {from} to {to}")]
    NoPathExists { from: Cell, to: Cell },

    #[error("victim {victim} cannot be assigned to agent {agent}: held by {holder:?}")]
    AlreadyAssigned {
        victim: VictimId,
        agent: AgentId,
        holder: Option<AgentId>,
    },

    #[error("unknown victim {0}")]
    UnknownVictim(VictimId),

    #[error("victim {victim} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        victim: VictimId,
        from: VictimState,
        to: VictimState,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SimError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Invariant violations abort the run; everything else is either a
    /// configuration problem or absorbed by the engine.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Self::AlreadyAssigned { .. } | Self::InvalidTransition { .. } | Self::UnknownVictim(_)
        )
    }
}

pub type SimResult<T> = Result<T, SimError>;
