// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::identity::IdentityEndpoints;

/// Keeps a client session authenticated against an identity provider.
#[derive(Debug, Clone, Parser)]
#[command(name = "tether", version, about)]
pub struct TetherConfig {
    /// Base URL of the identity provider.
    #[arg(long, default_value = "http://127.0.0.1:8080", env = "TETHER_IDENTITY_URL")]
    pub identity_url: String,

    /// Base URL prepended to `request` paths. Defaults to the identity URL.
    #[arg(long, env = "TETHER_API_URL")]
    pub api_url: Option<String>,

    /// Login (issue) endpoint path.
    #[arg(long, default_value = "/auth/login", env = "TETHER_LOGIN_PATH")]
    pub login_path: String,

    /// Registration (issue) endpoint path.
    #[arg(long, default_value = "/auth/register", env = "TETHER_REGISTER_PATH")]
    pub register_path: String,

    /// Renewal endpoint path.
    #[arg(long, default_value = "/auth/refresh", env = "TETHER_REFRESH_PATH")]
    pub refresh_path: String,

    /// Revocation endpoint path.
    #[arg(long, default_value = "/auth/revoke", env = "TETHER_REVOKE_PATH")]
    pub revoke_path: String,

    /// Token file. Defaults to `<state dir>/tokens.json`.
    #[arg(long, env = "TETHER_STORE")]
    pub store: Option<PathBuf>,

    /// Expiration watcher interval in seconds.
    #[arg(long, default_value_t = 60, env = "TETHER_WATCH_INTERVAL_SECS")]
    pub watch_interval_secs: u64,

    /// Renew preemptively once fewer than this many seconds remain.
    #[arg(long, default_value_t = 300, env = "TETHER_RENEW_THRESHOLD_SECS")]
    pub renew_threshold_secs: u64,

    /// Upper bound on a single renewal call in milliseconds.
    #[arg(long, default_value_t = 10000, env = "TETHER_RENEW_TIMEOUT_MS")]
    pub renew_timeout_ms: u64,

    /// HTTP request timeout in milliseconds.
    #[arg(long, default_value_t = 30000, env = "TETHER_REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: u64,

    /// Where to send the user after the session ends.
    #[arg(long, default_value = "/login", env = "TETHER_REDIRECT")]
    pub redirect: String,

    /// Emit logs as JSON.
    #[arg(long, env = "TETHER_LOG_JSON")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Sign in and store the issued tokens.
    Login(CredentialArgs),
    /// Create an account and store the issued tokens.
    Register(CredentialArgs),
    /// Forget the stored tokens and revoke them in the background.
    Logout,
    /// Revoke the refresh token at the identity provider, then forget it.
    Revoke,
    /// Show whether a session exists and when its access token expires.
    Status,
    /// Send an authenticated request, renewing the token if needed.
    Request {
        /// HTTP method.
        method: String,
        /// Path appended to the API URL.
        path: String,
        /// JSON request body.
        #[arg(long)]
        data: Option<String>,
    },
    /// Keep the session fresh until interrupted.
    Watch,
}

#[derive(Debug, Clone, clap::Args)]
pub struct CredentialArgs {
    #[arg(long, env = "TETHER_USERNAME")]
    pub username: String,

    #[arg(long, env = "TETHER_PASSWORD", hide_env_values = true)]
    pub password: String,
}

impl TetherConfig {
    pub fn endpoints(&self) -> IdentityEndpoints {
        IdentityEndpoints {
            base_url: self.identity_url.clone(),
            login_path: self.login_path.clone(),
            register_path: self.register_path.clone(),
            refresh_path: self.refresh_path.clone(),
            revoke_path: self.revoke_path.clone(),
        }
    }

    pub fn api_url(&self) -> &str {
        self.api_url.as_deref().unwrap_or(&self.identity_url)
    }

    pub fn store_path(&self) -> PathBuf {
        self.store.clone().unwrap_or_else(|| state_dir().join("tokens.json"))
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_secs(self.watch_interval_secs)
    }

    pub fn renew_threshold(&self) -> Duration {
        Duration::from_secs(self.renew_threshold_secs)
    }

    pub fn renew_timeout(&self) -> Duration {
        Duration::from_millis(self.renew_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Resolve the state directory for tether data.
///
/// Checks `TETHER_STATE_DIR`, then `$XDG_STATE_HOME/tether`,
/// then `$HOME/.local/state/tether`.
pub fn state_dir() -> PathBuf {
    state_dir_with(|name| std::env::var(name).ok())
}

fn state_dir_with(get_env: impl Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(dir) = get_env("TETHER_STATE_DIR") {
        return PathBuf::from(dir);
    }
    if let Some(xdg) = get_env("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("tether");
    }
    if let Some(home) = get_env("HOME") {
        return PathBuf::from(home).join(".local/state/tether");
    }
    PathBuf::from(".tether")
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
