// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::store::MemoryStore;
use crate::test_support::{pair, FakeRenewer, Harness};

const THRESHOLD: Duration = Duration::from_secs(300);

fn watcher(h: &Harness) -> ExpirationWatcher {
    ExpirationWatcher::new(
        Arc::clone(&h.store) as Arc<dyn TokenStore>,
        Arc::clone(&h.coordinator),
        THRESHOLD,
    )
}

#[tokio::test]
async fn near_expiry_starts_renewal() -> anyhow::Result<()> {
    let fresh = pair(3600, "new");
    let h = Harness::new(MemoryStore::with_pair(&pair(60, "old")), FakeRenewer::succeeding(fresh.clone()));

    let Tick::Renewing(handle) = watcher(&h).tick() else {
        anyhow::bail!("expected a renewal");
    };
    handle.await?;

    assert_eq!(h.renewer.calls(), 1);
    assert_eq!(h.store.get(TokenKind::Access), Some(fresh.access_token));
    Ok(())
}

#[tokio::test]
async fn fresh_token_is_left_alone() {
    let h = Harness::new(MemoryStore::with_pair(&pair(3600, "a")), FakeRenewer::failing("unused"));

    let tick = watcher(&h).tick();

    assert!(matches!(tick, Tick::Fresh(remaining) if remaining >= THRESHOLD), "{tick:?}");
    assert_eq!(h.renewer.calls(), 0);
}

#[tokio::test]
async fn empty_store_is_no_session() {
    let h = Harness::new(MemoryStore::new(), FakeRenewer::failing("unused"));
    assert!(matches!(watcher(&h).tick(), Tick::NoSession));
}

#[tokio::test]
async fn expired_or_malformed_tokens_are_skipped() {
    let h = Harness::new(MemoryStore::with_pair(&pair(-10, "old")), FakeRenewer::failing("unused"));
    assert!(matches!(watcher(&h).tick(), Tick::Expired));

    h.store.set(TokenKind::Access, "not-a-jwt".into());
    assert!(matches!(watcher(&h).tick(), Tick::Expired));

    assert_eq!(h.renewer.calls(), 0);
    assert!(h.store.has_credentials());
}

#[tokio::test]
async fn loop_renews_once_and_stops_on_cancel() -> anyhow::Result<()> {
    let h = Harness::new(
        MemoryStore::with_pair(&pair(60, "old")),
        FakeRenewer::succeeding(pair(3600, "new")),
    );
    let shutdown = CancellationToken::new();

    let handle = watcher(&h).spawn(Duration::from_millis(20), shutdown.clone());
    tokio::time::sleep(Duration::from_millis(150)).await;
    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle).await??;

    // The first tick renewed; later ticks saw the fresh token.
    assert_eq!(h.renewer.calls(), 1);
    Ok(())
}
