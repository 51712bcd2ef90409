// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tether: session token lifecycle manager.
//!
//! Keeps a client authenticated across concurrent requests. The gateway
//! attaches the access token, the coordinator renews it at most once at a
//! time when requests start failing, the watcher renews ahead of expiry, and
//! the terminator tears the session down when renewal is impossible.

pub mod claims;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod session;
pub mod store;
pub mod terminator;
pub mod watcher;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::{Command, CredentialArgs, TetherConfig};
use crate::identity::{IdentityClient, IssueRequest, Principal};
use crate::session::{Session, SessionOptions};
use crate::store::FileStore;
use crate::terminator::TerminationReason;

/// Lifecycle notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Issue succeeded and a pair is stored.
    Started { principal: Option<Principal> },
    /// The pair was replaced by a renewal.
    Renewed,
    /// The session ended; the UI should show `reason.notice()` and navigate
    /// to `redirect`.
    Terminated { reason: TerminationReason, redirect: String },
}

/// Build a session from CLI configuration.
pub fn build_session(config: &TetherConfig) -> anyhow::Result<Session> {
    let store = Arc::new(FileStore::open(config.store_path())?);
    let identity = Arc::new(IdentityClient::new(config.endpoints(), config.request_timeout()));
    let options = SessionOptions {
        api_url: config.api_url().to_owned(),
        redirect: config.redirect.clone(),
        renew_timeout: config.renew_timeout(),
        request_timeout: config.request_timeout(),
        watch_interval: config.watch_interval(),
        renew_threshold: config.renew_threshold(),
    };
    Ok(Session::new(store, identity, options))
}

/// Run one CLI command to completion.
pub async fn run(config: TetherConfig) -> anyhow::Result<()> {
    let session = build_session(&config)?;

    match config.command.unwrap_or(Command::Status) {
        Command::Login(args) => {
            let principal = session.login(&issue_request(args)).await?;
            print_json(&serde_json::json!({ "authenticated": true, "principal": principal }))?;
        }
        Command::Register(args) => {
            let principal = session.register(&issue_request(args)).await?;
            print_json(&serde_json::json!({ "authenticated": true, "principal": principal }))?;
        }
        Command::Logout => {
            let ended = session.logout();
            print_json(&serde_json::json!({ "logged_out": ended }))?;
            // Give the background revoke a moment before the runtime exits.
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        }
        Command::Revoke => {
            let ended = session.revoke().await?;
            print_json(&serde_json::json!({ "revoked": ended }))?;
        }
        Command::Status => {
            print_json(&session.status())?;
        }
        Command::Request { method, path, data } => {
            let method = Method::from_bytes(method.to_uppercase().as_bytes())?;
            let mut op = session.request(method, &path);
            if let Some(data) = data {
                op = op.with_json(serde_json::from_str(&data)?);
            }
            match session.send(op).await {
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().await?;
                    println!("{body}");
                    if !status.is_success() {
                        anyhow::bail!("request failed ({status})");
                    }
                }
                Err(e) if !session.is_authenticated() => {
                    anyhow::bail!("{e}: {}", TerminationReason::RenewalFailed.notice());
                }
                Err(e) => return Err(e.into()),
            }
        }
        Command::Watch => watch(&session).await?,
    }
    Ok(())
}

async fn watch(session: &Session) -> anyhow::Result<()> {
    if !session.is_authenticated() {
        anyhow::bail!("not signed in");
    }
    let shutdown = CancellationToken::new();
    let mut events = session.subscribe();
    let watcher = session.spawn_watcher(shutdown.clone());
    tracing::info!("watching session, ctrl-c to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(SessionEvent::Terminated { reason, redirect }) => {
                    tracing::warn!(?reason, %redirect, "{}", reason.notice());
                    break;
                }
                Ok(event) => tracing::info!(?event, "session event"),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(_) => break,
            },
        }
    }

    shutdown.cancel();
    let _ = watcher.await;
    Ok(())
}

fn issue_request(args: CredentialArgs) -> IssueRequest {
    IssueRequest { username: args.username, password: args.password }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
