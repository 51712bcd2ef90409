// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP client for the identity provider: issue, renew, revoke.
//!
//! Every request built here is flagged exempt ([`OperationKind::Issue`] or
//! [`OperationKind::Renewal`]) so it never carries the access token and never
//! re-enters the refresh coordinator.

use std::future::Future;
use std::pin::Pin;
use std::sync::Once;
use std::time::Duration;

use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::gateway::{HttpOperation, Operation, OperationKind};
use crate::store::TokenPair;

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
/// Safe to call multiple times; only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Exchanges a refresh token for a new pair. One network call, no retries.
///
/// Object-safe for use as `Arc<dyn Renewer>`.
pub trait Renewer: Send + Sync + 'static {
    fn renew(
        &self,
        refresh_token: &str,
    ) -> Pin<Box<dyn Future<Output = Result<TokenPair, AuthError>> + Send + '_>>;
}

/// Best-effort server-side invalidation of a refresh token.
pub trait Revoker: Send + Sync + 'static {
    fn revoke(
        &self,
        refresh_token: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AuthError>> + Send + '_>>;
}

/// Which issue endpoint to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    Login,
    Register,
}

/// Credentials presented to the issue endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct IssueRequest {
    pub username: String,
    pub password: String,
}

/// The authenticated user as described by the identity provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Successful issue response.
#[derive(Debug, Clone, Deserialize)]
pub struct IssuedSession {
    #[serde(flatten)]
    pub tokens: TokenPair,
    #[serde(default, alias = "user")]
    pub principal: Option<Principal>,
}

#[derive(Serialize)]
struct RefreshBody<'a> {
    refresh_token: &'a str,
}

/// Endpoint layout of the identity provider.
#[derive(Debug, Clone)]
pub struct IdentityEndpoints {
    pub base_url: String,
    pub login_path: String,
    pub register_path: String,
    pub refresh_path: String,
    pub revoke_path: String,
}

impl IdentityEndpoints {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            login_path: "/auth/login".to_owned(),
            register_path: "/auth/register".to_owned(),
            refresh_path: "/auth/refresh".to_owned(),
            revoke_path: "/auth/revoke".to_owned(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// HTTP client wrapper for the identity provider.
pub struct IdentityClient {
    endpoints: IdentityEndpoints,
    client: Client,
}

impl IdentityClient {
    pub fn new(endpoints: IdentityEndpoints, timeout: Duration) -> Self {
        ensure_crypto();
        let client = Client::builder().timeout(timeout).build().unwrap_or_default();
        Self { endpoints, client }
    }

    pub fn endpoints(&self) -> &IdentityEndpoints {
        &self.endpoints
    }

    fn exempt(&self, kind: OperationKind, path: &str, body: serde_json::Value) -> HttpOperation {
        HttpOperation::new(self.client.clone(), Method::POST, self.endpoints.url(path))
            .with_kind(kind)
            .with_json(body)
    }

    /// Login or register. The caller stores the returned pair.
    pub async fn issue(
        &self,
        kind: IssueKind,
        request: &IssueRequest,
    ) -> Result<IssuedSession, AuthError> {
        let path = match kind {
            IssueKind::Login => &self.endpoints.login_path,
            IssueKind::Register => &self.endpoints.register_path,
        };
        let body = serde_json::to_value(request).map_err(|e| AuthError::Issue(e.to_string()))?;
        let op = self.exempt(OperationKind::Issue, path, body);
        let resp = op.execute(None).await.map_err(|e| AuthError::Issue(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(AuthError::Issue(format!("{kind:?} rejected ({status}): {text}")));
        }
        resp.json::<IssuedSession>().await.map_err(|e| AuthError::Issue(e.to_string()))
    }

    /// Perform a single renewal request.
    ///
    /// Every failure mode collapses into [`AuthError::Renewal`].
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let body = serde_json::to_value(RefreshBody { refresh_token })
            .map_err(|e| AuthError::Renewal(e.to_string()))?;
        let op = self.exempt(OperationKind::Renewal, &self.endpoints.refresh_path, body);
        let resp = op.execute(None).await.map_err(|e| AuthError::Renewal(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(AuthError::Renewal(format!("rejected ({status}): {text}")));
        }
        resp.json::<TokenPair>().await.map_err(|e| AuthError::Renewal(e.to_string()))
    }

    /// Ask the provider to invalidate a refresh token.
    pub async fn revoke_token(&self, refresh_token: &str) -> Result<(), AuthError> {
        let body = serde_json::to_value(RefreshBody { refresh_token })
            .map_err(|e| AuthError::Transport(e.to_string()))?;
        let op = self.exempt(OperationKind::Renewal, &self.endpoints.revoke_path, body);
        let resp = op.execute(None).await?;
        resp.error_for_status()?;
        Ok(())
    }
}

impl Renewer for IdentityClient {
    fn renew(
        &self,
        refresh_token: &str,
    ) -> Pin<Box<dyn Future<Output = Result<TokenPair, AuthError>> + Send + '_>> {
        let refresh_token = refresh_token.to_owned();
        Box::pin(async move { self.refresh(&refresh_token).await })
    }
}

impl Revoker for IdentityClient {
    fn revoke(
        &self,
        refresh_token: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AuthError>> + Send + '_>> {
        let refresh_token = refresh_token.to_owned();
        Box::pin(async move { self.revoke_token(&refresh_token).await })
    }
}
