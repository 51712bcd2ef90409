// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal failure path: tear the session down exactly once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::identity::{Principal, Revoker};
use crate::store::{TokenKind, TokenPair, TokenStore};
use crate::SessionEvent;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    RenewalFailed,
    NoRefreshCredential,
    Logout,
    /// The refresh token was revoked at the identity provider on request.
    Revoked,
}

impl TerminationReason {
    /// One-line user-facing notice.
    pub fn notice(&self) -> &'static str {
        match self {
            Self::RenewalFailed | Self::NoRefreshCredential => {
                "Your session has expired. Please sign in again."
            }
            Self::Logout => "You have been signed out.",
            Self::Revoked => "Your session was revoked. Please sign in again.",
        }
    }
}

/// Tears a session down and tracks which session is current.
///
/// Every session gets an epoch. Starting or ending a session bumps it, and
/// renewals commit their pair through [`commit`](Self::commit) only while the
/// epoch they started under is still current. The epoch lock also covers the
/// store writes, so a commit and a teardown never interleave.
pub struct SessionTerminator {
    store: Arc<dyn TokenStore>,
    revoker: Option<Arc<dyn Revoker>>,
    event_tx: broadcast::Sender<SessionEvent>,
    redirect: String,
    principal: RwLock<Option<Principal>>,
    armed: AtomicBool,
    epoch: Mutex<u64>,
}

impl SessionTerminator {
    /// Starts armed if `store` already holds a credential.
    pub fn new(
        store: Arc<dyn TokenStore>,
        revoker: Option<Arc<dyn Revoker>>,
        event_tx: broadcast::Sender<SessionEvent>,
        redirect: String,
    ) -> Arc<Self> {
        let armed = AtomicBool::new(store.has_credentials());
        Arc::new(Self {
            store,
            revoker,
            event_tx,
            redirect,
            principal: RwLock::new(None),
            armed,
            epoch: Mutex::new(0),
        })
    }

    /// Store a newly issued pair and arm for the session it starts.
    pub fn start(&self, pair: &TokenPair, principal: Option<Principal>) {
        let mut epoch = self.epoch.lock();
        *epoch += 1;
        self.store.replace(pair);
        *self.principal.write() = principal;
        self.armed.store(true, Ordering::SeqCst);
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }

    /// Derived user state for the current session.
    pub fn principal(&self) -> Option<Principal> {
        self.principal.read().clone()
    }

    /// Identifies the current session.
    pub fn epoch(&self) -> u64 {
        *self.epoch.lock()
    }

    /// Store a renewed pair if the session `epoch` is still current.
    pub fn commit(&self, epoch: u64, pair: &TokenPair) -> bool {
        let current = self.epoch.lock();
        if *current != epoch {
            return false;
        }
        self.store.replace(pair);
        true
    }

    /// End the session. Returns `true` for the call that did the work and
    /// `false` for every concurrent or repeated call.
    ///
    /// Stored credentials are cleared even if they were deposited without
    /// [`start`](Self::start). Makes no authenticated request. Revocation is
    /// spawned and never awaited, so a dead identity provider cannot delay
    /// local teardown.
    pub fn terminate(&self, reason: TerminationReason) -> bool {
        self.end(reason, None)
    }

    /// [`terminate`](Self::terminate), unless a newer session than `epoch`
    /// has started or the session already ended.
    pub fn terminate_at(&self, epoch: u64, reason: TerminationReason) -> bool {
        self.end(reason, Some(epoch))
    }

    fn end(&self, reason: TerminationReason, expected: Option<u64>) -> bool {
        let refresh_token = {
            let mut epoch = self.epoch.lock();
            if expected.is_some_and(|e| e != *epoch) {
                debug!(?reason, "session changed since renewal started, not terminating");
                return false;
            }
            let was_armed = self.armed.swap(false, Ordering::SeqCst);
            if !was_armed && !self.store.has_credentials() {
                debug!(?reason, "session already terminated");
                return false;
            }
            *epoch += 1;
            let refresh_token = self.store.get(TokenKind::Refresh);
            self.store.clear();
            *self.principal.write() = None;
            refresh_token
        };

        info!(?reason, redirect = %self.redirect, "session terminated");
        let _ = self.event_tx.send(SessionEvent::Terminated {
            reason,
            redirect: self.redirect.clone(),
        });

        // Other reasons mean the provider already considers the token dead
        // or the caller revoked it.
        if reason == TerminationReason::Logout {
            if let (Some(revoker), Some(token)) = (self.revoker.clone(), refresh_token) {
                spawn_revoke(revoker, token);
            }
        }
        true
    }
}

fn spawn_revoke(revoker: Arc<dyn Revoker>, token: String) {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        debug!("no runtime, skipping revoke");
        return;
    };
    handle.spawn(async move {
        if let Err(e) = revoker.revoke(&token).await {
            warn!(err = %e, "refresh token revocation failed");
        }
    });
}

#[cfg(test)]
#[path = "terminator_tests.rs"]
mod tests;
