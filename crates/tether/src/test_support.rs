// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fakes shared by the unit tests.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::coordinator::RefreshCoordinator;
use crate::error::AuthError;
use crate::gateway::{Operation, OperationKind};
use crate::identity::{Renewer, Revoker};
use crate::store::{MemoryStore, TokenPair, TokenStore};
use crate::terminator::SessionTerminator;
use crate::SessionEvent;

/// Mint an unsigned JWT-shaped token expiring `ttl_secs` from now.
///
/// `tag` ends up in a `jti` claim so two tokens minted in the same second differ.
pub fn mint_token(ttl_secs: i64, tag: &str) -> String {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64;
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let claims = serde_json::json!({ "sub": "user-1", "exp": now + ttl_secs, "jti": tag });
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.sig")
}

pub fn pair(ttl_secs: i64, tag: &str) -> TokenPair {
    TokenPair { access_token: mint_token(ttl_secs, tag), refresh_token: format!("refresh-{tag}") }
}

/// Scripted outcome for one renewal call.
#[derive(Debug, Clone)]
pub enum RenewOutcome {
    Succeed(TokenPair),
    Fail(String),
    Hang,
}

/// A renewer that counts calls and replays scripted outcomes.
///
/// Once the script runs out, the last outcome repeats.
pub struct FakeRenewer {
    outcomes: Mutex<VecDeque<RenewOutcome>>,
    last: Mutex<Option<RenewOutcome>>,
    delay: Duration,
    calls: AtomicU32,
    seen: Mutex<Vec<String>>,
}

impl FakeRenewer {
    pub fn new(outcomes: Vec<RenewOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            last: Mutex::new(None),
            delay: Duration::ZERO,
            calls: AtomicU32::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding(pair: TokenPair) -> Self {
        Self::new(vec![RenewOutcome::Succeed(pair)])
    }

    pub fn failing(msg: &str) -> Self {
        Self::new(vec![RenewOutcome::Fail(msg.to_owned())])
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Refresh tokens presented so far.
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().clone()
    }

    fn next_outcome(&self) -> RenewOutcome {
        let next = self.outcomes.lock().pop_front();
        let mut last = self.last.lock();
        match next {
            Some(outcome) => {
                *last = Some(outcome.clone());
                outcome
            }
            None => last.clone().unwrap_or(RenewOutcome::Fail("no scripted outcome".into())),
        }
    }
}

impl Renewer for FakeRenewer {
    fn renew(
        &self,
        refresh_token: &str,
    ) -> Pin<Box<dyn Future<Output = Result<TokenPair, AuthError>> + Send + '_>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push(refresh_token.to_owned());
        let outcome = self.next_outcome();
        let delay = self.delay;
        Box::pin(async move {
            if delay > Duration::ZERO {
                tokio::time::sleep(delay).await;
            }
            match outcome {
                RenewOutcome::Succeed(pair) => Ok(pair),
                RenewOutcome::Fail(msg) => Err(AuthError::Renewal(msg)),
                RenewOutcome::Hang => std::future::pending().await,
            }
        })
    }
}

/// A revoker that records what it was asked to revoke.
#[derive(Default)]
pub struct FakeRevoker {
    pub revoked: Mutex<Vec<String>>,
    pub fail: bool,
}

impl Revoker for FakeRevoker {
    fn revoke(
        &self,
        refresh_token: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AuthError>> + Send + '_>> {
        self.revoked.lock().push(refresh_token.to_owned());
        let fail = self.fail;
        Box::pin(async move {
            if fail {
                Err(AuthError::Transport("revoke endpoint down".into()))
            } else {
                Ok(())
            }
        })
    }
}

/// An outbound operation against a fake API that only accepts one token.
pub struct FakeOperation {
    pub kind: OperationKind,
    /// The only bearer the fake API accepts (`None` means "no bearer").
    pub accepted: Arc<Mutex<Option<String>>>,
    /// Bearer presented on each attempt, in order.
    pub attempts: Mutex<Vec<Option<String>>>,
    pub delay: Duration,
}

impl FakeOperation {
    pub fn new(kind: OperationKind, accepted: Arc<Mutex<Option<String>>>) -> Self {
        Self { kind, accepted, attempts: Mutex::new(Vec::new()), delay: Duration::ZERO }
    }

    pub fn attempts(&self) -> Vec<Option<String>> {
        self.attempts.lock().clone()
    }
}

/// Response from [`FakeOperation`]: HTTP-ish status plus the bearer it saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeResponse {
    pub status: u16,
    pub bearer: Option<String>,
}

impl Operation for FakeOperation {
    type Output = FakeResponse;

    fn kind(&self) -> OperationKind {
        self.kind
    }

    fn execute(
        &self,
        bearer: Option<String>,
    ) -> Pin<Box<dyn Future<Output = Result<FakeResponse, AuthError>> + Send + '_>> {
        self.attempts.lock().push(bearer.clone());
        Box::pin(async move {
            if self.delay > Duration::ZERO {
                tokio::time::sleep(self.delay).await;
            }
            let ok = *self.accepted.lock() == bearer;
            Ok(FakeResponse { status: if ok { 200 } else { 401 }, bearer })
        })
    }

    fn is_unauthorized(&self, output: &FakeResponse) -> bool {
        output.status == 401
    }
}

/// Core components wired together over a memory store.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub renewer: Arc<FakeRenewer>,
    pub revoker: Arc<FakeRevoker>,
    pub terminator: Arc<SessionTerminator>,
    pub coordinator: Arc<RefreshCoordinator>,
    pub events: broadcast::Receiver<SessionEvent>,
}

impl Harness {
    pub fn new(store: MemoryStore, renewer: FakeRenewer) -> Self {
        Self::with_timeout(store, renewer, Duration::from_secs(5))
    }

    pub fn with_timeout(store: MemoryStore, renewer: FakeRenewer, timeout: Duration) -> Self {
        let store = Arc::new(store);
        let renewer = Arc::new(renewer);
        let revoker = Arc::new(FakeRevoker::default());
        let (event_tx, events) = broadcast::channel(64);
        let terminator = SessionTerminator::new(
            Arc::clone(&store) as Arc<dyn TokenStore>,
            Some(Arc::clone(&revoker) as Arc<dyn Revoker>),
            event_tx.clone(),
            "/login".to_owned(),
        );
        let coordinator = RefreshCoordinator::new(
            Arc::clone(&store) as Arc<dyn TokenStore>,
            Arc::clone(&renewer) as Arc<dyn Renewer>,
            Arc::clone(&terminator),
            event_tx,
            timeout,
        );
        Self { store, renewer, revoker, terminator, coordinator, events }
    }

    /// Drain events received so far.
    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        while let Ok(e) = self.events.try_recv() {
            out.push(e);
        }
        out
    }
}
