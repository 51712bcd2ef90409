// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session facade: one instance of every component, wired together.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::claims;
use crate::coordinator::{Phase, RefreshCoordinator};
use crate::error::AuthError;
use crate::gateway::{HttpOperation, Operation, RequestGateway};
use crate::identity::{IdentityClient, IssueKind, IssueRequest, Principal, Renewer, Revoker};
use crate::store::{TokenKind, TokenStore};
use crate::terminator::{SessionTerminator, TerminationReason};
use crate::watcher::ExpirationWatcher;
use crate::SessionEvent;

/// Tunables for a [`Session`].
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub api_url: String,
    pub redirect: String,
    pub renew_timeout: Duration,
    pub request_timeout: Duration,
    pub watch_interval: Duration,
    pub renew_threshold: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            redirect: "/login".to_owned(),
            renew_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            watch_interval: Duration::from_secs(60),
            renew_threshold: Duration::from_secs(300),
        }
    }
}

/// Snapshot of session state.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionStatus {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<Principal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in_secs: Option<u64>,
    pub renewing: bool,
    pub renewals: u64,
}

pub struct Session {
    store: Arc<dyn TokenStore>,
    identity: Arc<IdentityClient>,
    coordinator: Arc<RefreshCoordinator>,
    gateway: RequestGateway,
    terminator: Arc<SessionTerminator>,
    event_tx: broadcast::Sender<SessionEvent>,
    http: Client,
    options: SessionOptions,
}

impl Session {
    pub fn new(
        store: Arc<dyn TokenStore>,
        identity: Arc<IdentityClient>,
        options: SessionOptions,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        let terminator = SessionTerminator::new(
            Arc::clone(&store),
            Some(Arc::clone(&identity) as Arc<dyn Revoker>),
            event_tx.clone(),
            options.redirect.clone(),
        );
        let coordinator = RefreshCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&identity) as Arc<dyn Renewer>,
            Arc::clone(&terminator),
            event_tx.clone(),
            options.renew_timeout,
        );
        let gateway = RequestGateway::new(Arc::clone(&store), Arc::clone(&coordinator));
        let http = Client::builder().timeout(options.request_timeout).build().unwrap_or_default();
        Self { store, identity, coordinator, gateway, terminator, event_tx, http, options }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    /// A session exists while a non-empty pair is stored.
    pub fn is_authenticated(&self) -> bool {
        let present = |kind: TokenKind| self.store.get(kind).is_some_and(|t| !t.is_empty());
        present(TokenKind::Access) && present(TokenKind::Refresh)
    }

    pub fn principal(&self) -> Option<Principal> {
        self.terminator.principal()
    }

    pub async fn login(&self, request: &IssueRequest) -> Result<Option<Principal>, AuthError> {
        self.issue(IssueKind::Login, request).await
    }

    pub async fn register(&self, request: &IssueRequest) -> Result<Option<Principal>, AuthError> {
        self.issue(IssueKind::Register, request).await
    }

    async fn issue(
        &self,
        kind: IssueKind,
        request: &IssueRequest,
    ) -> Result<Option<Principal>, AuthError> {
        let issued = self.identity.issue(kind, request).await?;
        self.terminator.start(&issued.tokens, issued.principal.clone());
        tracing::info!(?kind, user = %request.username, "session started");
        let _ = self.event_tx.send(SessionEvent::Started { principal: issued.principal.clone() });
        Ok(issued.principal)
    }

    /// End the session and revoke its refresh token in the background.
    pub fn logout(&self) -> bool {
        self.terminator.terminate(TerminationReason::Logout)
    }

    /// Revoke the refresh token at the identity provider, then end the
    /// session locally.
    ///
    /// The local teardown happens even if the provider call fails; that
    /// failure is returned afterwards. `Ok(false)` means there was no session.
    pub async fn revoke(&self) -> Result<bool, AuthError> {
        let revoked = match self.store.get(TokenKind::Refresh) {
            Some(token) => self.identity.revoke_token(&token).await,
            None => Ok(()),
        };
        let ended = self.terminator.terminate(TerminationReason::Revoked);
        if let Err(ref e) = revoked {
            tracing::warn!(err = %e, "revocation failed, session ended locally");
        }
        revoked.map(|()| ended)
    }

    /// Run any operation through the gateway.
    pub async fn execute<O>(&self, op: &O) -> Result<O::Output, AuthError>
    where
        O: Operation + ?Sized,
    {
        self.gateway.execute(op).await
    }

    /// Build an authenticated request against the API base URL.
    pub fn request(&self, method: Method, path: &str) -> HttpOperation {
        let url = format!("{}{}", self.options.api_url.trim_end_matches('/'), path);
        HttpOperation::new(self.http.clone(), method, url)
    }

    pub async fn send(&self, op: HttpOperation) -> Result<reqwest::Response, AuthError> {
        self.gateway.execute(&op).await
    }

    /// Start the preemptive renewal loop.
    pub fn spawn_watcher(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        ExpirationWatcher::new(
            Arc::clone(&self.store),
            Arc::clone(&self.coordinator),
            self.options.renew_threshold,
        )
        .spawn(self.options.watch_interval, shutdown)
    }

    pub fn status(&self) -> SessionStatus {
        let expires_in_secs = self
            .store
            .get(TokenKind::Access)
            .and_then(|token| claims::time_remaining(&token).ok())
            .map(|remaining| remaining.as_secs());
        SessionStatus {
            authenticated: self.is_authenticated(),
            principal: self.principal(),
            expires_in_secs,
            renewing: matches!(self.coordinator.phase(), Phase::Renewing { .. }),
            renewals: self.coordinator.renewals(),
        }
    }
}
