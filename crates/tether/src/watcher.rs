// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background watcher that renews the access token before it expires.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::claims;
use crate::coordinator::RefreshCoordinator;
use crate::store::{TokenKind, TokenStore};

/// Outcome of a single watcher step.
#[derive(Debug)]
pub enum Tick {
    /// No access token stored.
    NoSession,
    /// Token is fine for now.
    Fresh(Duration),
    /// Token already expired or undecodable; left to the request path.
    Expired,
    /// A renewal was started. The handle is only useful to tests.
    Renewing(JoinHandle<()>),
}

pub struct ExpirationWatcher {
    store: Arc<dyn TokenStore>,
    coordinator: Arc<RefreshCoordinator>,
    threshold: Duration,
}

impl ExpirationWatcher {
    pub fn new(
        store: Arc<dyn TokenStore>,
        coordinator: Arc<RefreshCoordinator>,
        threshold: Duration,
    ) -> Self {
        Self { store, coordinator, threshold }
    }

    /// One check. Renewal, when due, is fire-and-forget; its failures go
    /// through the coordinator's own failure path.
    pub fn tick(&self) -> Tick {
        let Some(token) = self.store.get(TokenKind::Access) else {
            return Tick::NoSession;
        };
        let remaining = match claims::time_remaining(&token) {
            Ok(remaining) => remaining,
            Err(e) => {
                tracing::debug!(err = %e, "access token undecodable, treating as expired");
                return Tick::Expired;
            }
        };
        if remaining.is_zero() {
            return Tick::Expired;
        }
        if remaining >= self.threshold {
            return Tick::Fresh(remaining);
        }

        tracing::debug!(remaining_secs = remaining.as_secs(), "access token near expiry, renewing");
        let coordinator = Arc::clone(&self.coordinator);
        Tick::Renewing(tokio::spawn(async move {
            if let Err(e) = coordinator.ensure_fresh_token().await {
                tracing::debug!(err = %e, "preemptive renewal failed");
            }
        }))
    }

    /// Tick every `interval` until `shutdown` fires.
    pub fn spawn(self, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = timer.tick() => {}
                }
                let _ = self.tick();
            }
            tracing::debug!("expiration watcher stopped");
        })
    }
}

#[cfg(test)]
#[path = "watcher_tests.rs"]
mod tests;
