// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    decode = { AuthError::Decode("bad".into()), "DECODE_ERROR", false },
    renewal = { AuthError::Renewal("401".into()), "RENEWAL_FAILED", true },
    unauthorized = { AuthError::Unauthorized, "UNAUTHORIZED", false },
    no_refresh = { AuthError::NoRefreshCredential, "NO_REFRESH_CREDENTIAL", true },
    transport = { AuthError::Transport("refused".into()), "TRANSPORT_ERROR", false },
    issue = { AuthError::Issue("bad password".into()), "ISSUE_FAILED", false },
)]
fn code_and_terminality(err: AuthError, code: &str, terminal: bool) {
    assert_eq!(err.code(), code);
    assert_eq!(err.is_terminal(), terminal);
}

#[test]
fn display_includes_detail() {
    let err = AuthError::Renewal("timed out after 10s".into());
    assert_eq!(err.to_string(), "renewal failed: timed out after 10s");
}
