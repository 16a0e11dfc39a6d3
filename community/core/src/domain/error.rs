// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Errors returned synchronously by coordinator operations.
//!
//! Network outcomes (manager rejected the request, manager unreachable) are
//! never errors; they reach listeners as `FAIL` / `TIMEOUT` responses.

use super::filter::FilterParseError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommunityError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("invalid search filter: {0}")]
    Filter(#[from] FilterParseError),
}
