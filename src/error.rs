//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::discovery::LeaseId;
use crate::models::ErrorResponse;

// == Group Error Enum ==
/// Errors surfaced by a cache group and its registry.
///
/// Cloneable so one outcome can be handed to every coalesced waiter.
#[derive(Error, Debug, Clone)]
pub enum GroupError {
    /// The caller asked for the empty key
    #[error("key is required")]
    EmptyKey,

    /// The loader failed; its error is kept as-is
    #[error("{0}")]
    Loader(Arc<anyhow::Error>),

    /// Peers were registered on a group that already has a picker
    #[error("peers already registered for group {0}")]
    PeersAlreadyRegistered(String),

    /// A group with this name already exists in the registry
    #[error("group already registered: {0}")]
    DuplicateGroup(String),

    /// No group with this name exists in the registry
    #[error("no such group: {0}")]
    NoSuchGroup(String),
}

impl GroupError {
    pub fn loader(err: anyhow::Error) -> Self {
        GroupError::Loader(Arc::new(err))
    }
}

// == Peer Error Enum ==
/// Failures while fetching from a remote peer.
///
/// These never reach a `get` caller: the group falls back to its loader.
#[derive(Error, Debug)]
pub enum PeerError {
    /// The peer did not answer within the fetch deadline
    #[error("peer request timed out after {0:?}")]
    Timeout(Duration),

    /// The request could not be sent or the body not read
    #[error("peer transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The peer answered with a non-success status
    #[error("peer {peer} answered {status}: {message}")]
    Status {
        peer: String,
        status: u16,
        message: String,
    },

    /// The peer address could not be turned into a URL
    #[error("invalid peer address {0}")]
    InvalidAddress(String),
}

// == Discovery Error Enum ==
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// The lease was revoked, expired, or never granted
    #[error("lease {0} not found")]
    LeaseNotFound(LeaseId),

    /// The directory backend could not be reached
    #[error("registry unavailable: {0}")]
    Unavailable(#[from] anyhow::Error),
}

// == IntoResponse Implementation ==
impl IntoResponse for GroupError {
    fn into_response(self) -> Response {
        let status = match &self {
            GroupError::EmptyKey => StatusCode::BAD_REQUEST,
            GroupError::NoSuchGroup(_) => StatusCode::NOT_FOUND,
            GroupError::DuplicateGroup(_) | GroupError::PeersAlreadyRegistered(_) => {
                StatusCode::CONFLICT
            }
            GroupError::Loader(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for group operations.
pub type Result<T> = std::result::Result<T, GroupError>;
