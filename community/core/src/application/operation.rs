// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Operation State Machine
//!
//! Lifecycle of one coordinator operation:
//!
//! ```text
//! Issued ──────────────────────────────────────────────► Completed
//!   │                                                      ▲
//!   └─► AwaitingManagerAddress ─► AwaitingResponse ────────┤
//!              │                        │                  │
//!              └────────────────────────┴──► TimedOut      │
//! ```
//!
//! The local fast path goes straight from `Issued` to `Completed`. Terminal
//! states accept no further transition, which is what makes late responses and
//! late timeouts harmless.

use crate::domain::request::{CorrelationId, RequestKind};
use std::fmt;
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationState {
    Issued,
    AwaitingManagerAddress,
    AwaitingResponse,
    Completed,
    TimedOut,
}

impl OperationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, OperationState::Completed | OperationState::TimedOut)
    }

    fn allows(self, to: OperationState) -> bool {
        use OperationState::*;
        matches!(
            (self, to),
            (Issued, Completed)
                | (Issued, AwaitingManagerAddress)
                | (AwaitingManagerAddress, AwaitingResponse)
                | (AwaitingManagerAddress, TimedOut)
                | (AwaitingResponse, Completed)
                | (AwaitingResponse, TimedOut)
        )
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationState::Issued => "ISSUED",
            OperationState::AwaitingManagerAddress => "AWAITING_MANAGER_ADDRESS",
            OperationState::AwaitingResponse => "AWAITING_RESPONSE",
            OperationState::Completed => "COMPLETED",
            OperationState::TimedOut => "TIMED_OUT",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal operation transition from {from} to {to}")]
pub struct TransitionError {
    pub from: OperationState,
    pub to: OperationState,
}

/// Tracks the state of one in-flight request.
#[derive(Debug)]
pub struct Operation {
    correlation_id: CorrelationId,
    kind: RequestKind,
    community: String,
    state: OperationState,
}

impl Operation {
    pub fn new(correlation_id: CorrelationId, kind: RequestKind, community: impl Into<String>) -> Self {
        Self { correlation_id, kind, community: community.into(), state: OperationState::Issued }
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    pub fn community(&self) -> &str {
        &self.community
    }

    pub fn state(&self) -> OperationState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn transition(&mut self, to: OperationState) -> Result<(), TransitionError> {
        if !self.state.allows(to) {
            return Err(TransitionError { from: self.state, to });
        }
        trace!(
            id = %self.correlation_id,
            kind = %self.kind,
            community = %self.community,
            from = %self.state,
            to = %to,
            "Operation transition"
        );
        self.state = to;
        Ok(())
    }

    pub fn await_manager(&mut self) -> Result<(), TransitionError> {
        self.transition(OperationState::AwaitingManagerAddress)
    }

    pub fn await_response(&mut self) -> Result<(), TransitionError> {
        self.transition(OperationState::AwaitingResponse)
    }

    pub fn complete(&mut self) -> Result<(), TransitionError> {
        self.transition(OperationState::Completed)
    }

    pub fn time_out(&mut self) -> Result<(), TransitionError> {
        self.transition(OperationState::TimedOut)
    }
}
