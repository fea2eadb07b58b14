// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Errors
//!
//! Every failure a dispatch operation can report carries a stable machine code
//! (`DomainError::code`) and an HTTP status hint (`DomainError::status_code`).
//! The presentation layer renders both into the `{"error": {"code", "message"}}`
//! envelope; nothing outside this module decides which code a failure gets.
//!
//! | Variant | Code | HTTP |
//! |---------|------|------|
//! | `NotFound` | `NOT_FOUND` | 404 |
//! | `InvalidTransition` | `INVALID_TRANSITION` | 409 |
//! | `Conflict` | `CONFLICT` | 409 |
//! | `Forbidden` | `FORBIDDEN` | 403 |
//! | `Validation` | `VALIDATION` | 400 |
//! | `OutOfZone` | `OUT_OF_ZONE` | 400 |
//! | `Internal` | `INTERNAL` | 500 |

use thiserror::Error;

use crate::domain::repository::RepositoryError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DomainError {
    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("cannot transition from {from} to {to}")]
    InvalidTransition { from: &'static str, to: &'static str },

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    OutOfZone(String),

    #[error("{0}")]
    Internal(String),
}

impl DomainError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::Conflict(_) => "CONFLICT",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Validation(_) => "VALIDATION",
            Self::OutOfZone(_) => "OUT_OF_ZONE",
            Self::Internal(_) => "INTERNAL",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::InvalidTransition { .. } | Self::Conflict(_) => 409,
            Self::Forbidden(_) => 403,
            Self::Validation(_) | Self::OutOfZone(_) => 400,
            Self::Internal(_) => 500,
        }
    }

    /// True for errors raised by a state machine rejecting a transition.
    pub fn is_transition_rejection(&self) -> bool {
        matches!(self, Self::InvalidTransition { .. } | Self::Conflict(_))
    }
}

impl From<RepositoryError> for DomainError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => Self::NotFound { entity, id },
            RepositoryError::Contention(_) => Self::Conflict(
                "delivery was updated concurrently, retry the request".to_string(),
            ),
            other => Self::Internal(other.to_string()),
        }
    }
}
