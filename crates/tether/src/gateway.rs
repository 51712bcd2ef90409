// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request gateway: attaches the access token and recovers from one 401.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use reqwest::{Client, Method, StatusCode};
use tracing::{debug, warn};

use crate::coordinator::RefreshCoordinator;
use crate::error::AuthError;
use crate::store::{TokenKind, TokenStore};

/// What an outbound operation targets.
///
/// `Issue` and `Renewal` are exempt: no bearer is attached and an
/// unauthorized answer never triggers a renewal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Regular,
    Issue,
    Renewal,
}

impl OperationKind {
    pub fn is_exempt(&self) -> bool {
        matches!(self, Self::Issue | Self::Renewal)
    }
}

/// An outbound call the gateway can decorate and replay.
///
/// `execute` may be called twice for one gateway invocation, so it must build
/// its request from scratch each time.
pub trait Operation: Send + Sync {
    type Output: Send;

    fn kind(&self) -> OperationKind {
        OperationKind::Regular
    }

    fn execute(
        &self,
        bearer: Option<String>,
    ) -> Pin<Box<dyn Future<Output = Result<Self::Output, AuthError>> + Send + '_>>;

    fn is_unauthorized(&self, output: &Self::Output) -> bool;
}

/// A reqwest-backed operation. Unauthorized means HTTP 401.
#[derive(Debug, Clone)]
pub struct HttpOperation {
    client: Client,
    method: Method,
    url: String,
    body: Option<serde_json::Value>,
    kind: OperationKind,
}

impl HttpOperation {
    pub fn new(client: Client, method: Method, url: impl Into<String>) -> Self {
        Self { client, method, url: url.into(), body: None, kind: OperationKind::Regular }
    }

    pub fn with_json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_kind(mut self, kind: OperationKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Operation for HttpOperation {
    type Output = reqwest::Response;

    fn kind(&self) -> OperationKind {
        self.kind
    }

    fn execute(
        &self,
        bearer: Option<String>,
    ) -> Pin<Box<dyn Future<Output = Result<reqwest::Response, AuthError>> + Send + '_>> {
        let mut req = self.client.request(self.method.clone(), &self.url);
        if let Some(ref body) = self.body {
            req = req.json(body);
        }
        if let Some(token) = bearer {
            req = req.bearer_auth(token);
        }
        Box::pin(async move { Ok(req.send().await?) })
    }

    fn is_unauthorized(&self, output: &reqwest::Response) -> bool {
        output.status() == StatusCode::UNAUTHORIZED
    }
}

/// Wraps every outbound call with credential attachment and one-shot recovery.
pub struct RequestGateway {
    store: Arc<dyn TokenStore>,
    coordinator: Arc<RefreshCoordinator>,
}

impl RequestGateway {
    pub fn new(store: Arc<dyn TokenStore>, coordinator: Arc<RefreshCoordinator>) -> Self {
        Self { store, coordinator }
    }

    /// Run `op` with the current access token.
    ///
    /// On an unauthorized answer, obtains a fresh token from the coordinator
    /// and replays `op` exactly once. A second unauthorized answer, or a
    /// failed renewal, surfaces as [`AuthError::Unauthorized`].
    pub async fn execute<O>(&self, op: &O) -> Result<O::Output, AuthError>
    where
        O: Operation + ?Sized,
    {
        let kind = op.kind();
        let bearer = if kind.is_exempt() { None } else { self.store.get(TokenKind::Access) };

        let output = op.execute(bearer.clone()).await?;
        if !op.is_unauthorized(&output) {
            return Ok(output);
        }
        if kind.is_exempt() {
            return Err(AuthError::Unauthorized);
        }

        debug!(had_token = bearer.is_some(), "request unauthorized, requesting fresh token");
        let fresh = match self.coordinator.ensure_fresh_token_for(kind, bearer.as_deref()).await {
            Ok(token) => token,
            Err(e) => {
                debug!(err = %e, "no fresh token, rejecting request");
                return Err(AuthError::Unauthorized);
            }
        };

        let retried = op.execute(Some(fresh)).await?;
        if op.is_unauthorized(&retried) {
            warn!("request unauthorized after renewal, giving up");
            return Err(AuthError::Unauthorized);
        }
        Ok(retried)
    }
}

#[cfg(test)]
#[path = "gateway_tests.rs"]
mod tests;
