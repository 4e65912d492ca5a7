// SPDX-License-Identifier: MIT

//! Shared error kinds (§7). Each crate wraps these in its own `thiserror`
//! enum with extra context; this is the vocabulary they all draw from.

use thiserror::Error;

/// Error kinds from §7. These are categories, not a single error type —
/// downstream crates attach context (paths, request ids, messages) in their
/// own error enums and implement `From<X> for ErrorKind` where useful.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ConfigError,
    AlreadyRunning,
    PmdUnavailable,
    ConnectionError,
    ProtocolError,
    AliasConflict,
    NotFound,
    Timeout,
    Cancelled,
    OverflowDropped,
    Conflict,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConfigError => "config_error",
            ErrorKind::AlreadyRunning => "already_running",
            ErrorKind::PmdUnavailable => "pmd_unavailable",
            ErrorKind::ConnectionError => "connection_error",
            ErrorKind::ProtocolError => "protocol_error",
            ErrorKind::AliasConflict => "alias_conflict",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::OverflowDropped => "overflow_dropped",
            ErrorKind::Conflict => "conflict",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Generic error carrying a kind plus a message, used where a crate doesn't
/// need its own bespoke variant set.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct MeshError {
    pub kind: ErrorKind,
    pub message: String,
}

impl MeshError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
}
