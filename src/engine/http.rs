//! External-call surface
//!
//! The engine resolves method, URL, headers and timeout, then hands the
//! request to an injected `HttpSurface`. The transport itself (pooling,
//! actual sockets) is the caller's concern and out of scope here.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl OutboundResponse {
    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status)
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("transport failure: {0}")]
    Transport(String),
}

/// Injected collaborator performing the actual call.
///
/// Invoked synchronously from within a render; implementations shared
/// across renders must be `Send + Sync` and pool their own connections.
pub trait HttpSurface: Send + Sync {
    fn send(&self, request: &OutboundRequest) -> Result<OutboundResponse, TransportError>;
}

/// Default surface for environments with no outbound transport wired up.
/// Every call is a transport failure, which the engine reports against the
/// originating node.
pub struct NoHttp;

impl HttpSurface for NoHttp {
    fn send(&self, request: &OutboundRequest) -> Result<OutboundResponse, TransportError> {
        Err(TransportError::Transport(format!(
            "no HTTP surface configured (request to {})",
            request.url
        )))
    }
}
