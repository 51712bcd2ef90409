// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-flight token renewal.
//!
//! The coordinator is a two-state machine, `Idle` and `Renewing`. The first
//! caller to find it `Idle` flips it to `Renewing` under the state lock and
//! spawns the renewal; every other caller parks a oneshot sender on the
//! pending queue. When the renewal settles the queue is taken in the same
//! critical section that returns the state to `Idle`, then each waiter is
//! resolved in arrival order.
//!
//! The renewal itself runs on a spawned task: dropping a caller's future
//! (request cancelled, page torn down) cannot leave the machine stuck in
//! `Renewing`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

use crate::error::AuthError;
use crate::gateway::OperationKind;
use crate::identity::Renewer;
use crate::store::{TokenKind, TokenStore};
use crate::terminator::{SessionTerminator, TerminationReason};
use crate::SessionEvent;

type Waiter = oneshot::Sender<Result<String, AuthError>>;

enum RefreshState {
    Idle,
    Renewing(VecDeque<Waiter>),
}

/// Observable phase, for status output and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Renewing { waiters: usize },
}

/// What a caller must do after inspecting the state.
enum Admission {
    /// A newer token than the one rejected is already stored.
    Current(String),
    /// Renewal is impossible without a refresh token.
    Missing,
    /// Wait for the in-flight renewal (possibly one this caller just started).
    Wait(oneshot::Receiver<Result<String, AuthError>>),
}

pub struct RefreshCoordinator {
    state: Mutex<RefreshState>,
    store: Arc<dyn TokenStore>,
    renewer: Arc<dyn Renewer>,
    terminator: Arc<SessionTerminator>,
    event_tx: broadcast::Sender<SessionEvent>,
    renew_timeout: Duration,
    renewals: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<dyn TokenStore>,
        renewer: Arc<dyn Renewer>,
        terminator: Arc<SessionTerminator>,
        event_tx: broadcast::Sender<SessionEvent>,
        renew_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(RefreshState::Idle),
            store,
            renewer,
            terminator,
            event_tx,
            renew_timeout,
            renewals: AtomicU64::new(0),
        })
    }

    pub fn phase(&self) -> Phase {
        match &*self.state.lock() {
            RefreshState::Idle => Phase::Idle,
            RefreshState::Renewing(waiters) => Phase::Renewing { waiters: waiters.len() },
        }
    }

    /// Number of renewal calls issued so far.
    pub fn renewals(&self) -> u64 {
        self.renewals.load(Ordering::Relaxed)
    }

    /// Obtain a freshly renewed access token, joining an in-flight renewal
    /// if there is one.
    pub async fn ensure_fresh_token(self: &Arc<Self>) -> Result<String, AuthError> {
        self.ensure_fresh_token_for(OperationKind::Regular, None).await
    }

    /// Like [`ensure_fresh_token`](Self::ensure_fresh_token), on behalf of an
    /// operation of `kind` that was rejected while presenting `rejected`.
    ///
    /// Exempt operations short-circuit with `Unauthorized`. If the store
    /// already holds an access token other than `rejected`, a renewal has
    /// completed since the request left and that token is returned as is.
    pub async fn ensure_fresh_token_for(
        self: &Arc<Self>,
        kind: OperationKind,
        rejected: Option<&str>,
    ) -> Result<String, AuthError> {
        if kind.is_exempt() {
            debug!(?kind, "renewal not attempted for exempt operation");
            return Err(AuthError::Unauthorized);
        }

        match self.admit(rejected) {
            Admission::Current(token) => {
                debug!("token already replaced since rejection, skipping renewal");
                Ok(token)
            }
            Admission::Missing => {
                warn!("renewal requested without a refresh credential");
                self.terminator.terminate(TerminationReason::NoRefreshCredential);
                Err(AuthError::NoRefreshCredential)
            }
            Admission::Wait(rx) => rx
                .await
                .unwrap_or_else(|_| Err(AuthError::Renewal("renewal abandoned".into()))),
        }
    }

    /// Decide this caller's role. Never suspends: the Idle→Renewing flip and
    /// the enqueue happen in one critical section.
    fn admit(self: &Arc<Self>, rejected: Option<&str>) -> Admission {
        let mut state = self.state.lock();
        let (tx, rx) = oneshot::channel();
        match &mut *state {
            RefreshState::Renewing(waiters) => {
                waiters.push_back(tx);
                debug!(waiters = waiters.len(), "renewal in flight, queued");
            }
            RefreshState::Idle => {
                let current = self.store.get(TokenKind::Access);
                if let (Some(rejected), Some(current)) = (rejected, current) {
                    if current != rejected {
                        return Admission::Current(current);
                    }
                }
                let epoch = self.terminator.epoch();
                let Some(refresh_token) = self.store.get(TokenKind::Refresh) else {
                    return Admission::Missing;
                };
                *state = RefreshState::Renewing(VecDeque::from([tx]));
                self.renewals.fetch_add(1, Ordering::Relaxed);

                let coordinator = Arc::clone(self);
                tokio::spawn(async move {
                    coordinator.run_renewal(refresh_token, epoch).await;
                });
            }
        }
        Admission::Wait(rx)
    }

    /// Renew on behalf of the session identified by `epoch`. A pair that
    /// arrives after that session ended is discarded.
    async fn run_renewal(&self, refresh_token: String, epoch: u64) {
        let result = match tokio::time::timeout(
            self.renew_timeout,
            self.renewer.renew(&refresh_token),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(AuthError::Renewal(format!("timed out after {:?}", self.renew_timeout))),
        };

        match result {
            Ok(pair) => {
                if !self.terminator.commit(epoch, &pair) {
                    info!("session ended during renewal, discarding renewed pair");
                    for waiter in self.settle() {
                        let _ = waiter.send(Err(AuthError::Renewal("session terminated".into())));
                    }
                    return;
                }
                let waiters = self.settle();
                info!(waiters = waiters.len(), "access token renewed");
                let _ = self.event_tx.send(SessionEvent::Renewed);
                for waiter in waiters {
                    let _ = waiter.send(Ok(pair.access_token.clone()));
                }
            }
            Err(e) => {
                warn!(err = %e, "token renewal failed, terminating session");
                // Clear credentials before leaving Renewing so a caller
                // arriving at Idle cannot start a renewal with the dead token.
                self.terminator.terminate_at(epoch, TerminationReason::RenewalFailed);
                let waiters = self.settle();
                for waiter in waiters {
                    let _ = waiter.send(Err(e.clone()));
                }
            }
        }
    }

    /// Return to `Idle`, handing back every queued waiter.
    fn settle(&self) -> VecDeque<Waiter> {
        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, RefreshState::Idle) {
            RefreshState::Renewing(waiters) => waiters,
            RefreshState::Idle => VecDeque::new(),
        }
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
