// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Offline inspection of the access token's expiration claim.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;

use crate::error::AuthError;

#[derive(Debug, Deserialize)]
struct Claims {
    exp: Option<serde_json::Number>,
}

/// Time left before `access_token` expires, measured against the system clock.
///
/// Returns `Duration::ZERO` once the expiry has passed. No signature checks
/// are made; this only reads the claims segment.
pub fn time_remaining(access_token: &str) -> Result<Duration, AuthError> {
    time_remaining_at(access_token, SystemTime::now())
}

/// Same as [`time_remaining`] with an explicit clock.
pub fn time_remaining_at(access_token: &str, now: SystemTime) -> Result<Duration, AuthError> {
    let expires_at = expires_at(access_token)?;
    let now = now.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
    Ok(Duration::from_secs(expires_at.saturating_sub(now)))
}

/// Decode the `exp` claim as epoch seconds.
pub fn expires_at(access_token: &str) -> Result<u64, AuthError> {
    let mut segments = access_token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (segments.next(), segments.next(), segments.next(), segments.next())
    else {
        return Err(AuthError::Decode("expected three dot-separated segments".into()));
    };

    // Some issuers keep the padding even though JWT forbids it.
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| AuthError::Decode(format!("claims segment: {e}")))?;
    let claims: Claims = serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::Decode(format!("claims json: {e}")))?;

    let exp = claims.exp.ok_or_else(|| AuthError::Decode("missing exp claim".into()))?;
    if let Some(secs) = exp.as_u64() {
        return Ok(secs);
    }
    match exp.as_f64() {
        Some(secs) if secs.is_finite() && secs >= 0.0 => Ok(secs as u64),
        _ => Err(AuthError::Decode(format!("invalid exp claim: {exp}"))),
    }
}

#[cfg(test)]
#[path = "claims_tests.rs"]
mod tests;
