// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Errors surfaced by the token lifecycle core.
///
/// Cloneable because a single renewal outcome is fanned out to every caller
/// parked on the pending queue.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The access token could not be decoded. Callers treat this as expired.
    #[error("malformed access token: {0}")]
    Decode(String),

    /// The identity provider rejected the renewal, or it failed or timed out.
    #[error("renewal failed: {0}")]
    Renewal(String),

    /// The remote side rejected the attached credential.
    #[error("unauthorized")]
    Unauthorized,

    /// Renewal was requested but no refresh token is stored.
    #[error("no refresh credential stored")]
    NoRefreshCredential,

    /// An outbound operation failed below the HTTP layer.
    #[error("transport error: {0}")]
    Transport(String),

    /// Login or registration failed.
    #[error("issue failed: {0}")]
    Issue(String),
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Decode(_) => "DECODE_ERROR",
            Self::Renewal(_) => "RENEWAL_FAILED",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::NoRefreshCredential => "NO_REFRESH_CREDENTIAL",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::Issue(_) => "ISSUE_FAILED",
        }
    }

    /// Whether this error ends the session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Renewal(_) | Self::NoRefreshCredential)
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
