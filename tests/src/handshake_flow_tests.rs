//! Signer handshake driven through the Warpcast payload parsers, ending with
//! the approved signer persisted to an encrypted store.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use base64::Engine;
use herocast_core::metrics::METRICS;
use herocast_core::{AuthorizationState, Error, Handshake, HandshakeError, SignerStore};

use crate::utils::{fast_handshake_config, status_body, CannedWarpcast};

#[tokio::test(start_paused = true)]
async fn test_approved_signer_round_trips_through_store() -> Result<()> {
    let identity = Arc::new(CannedWarpcast::new(vec![
        Ok(status_body("pending", None)),
        Ok(status_body("completed", Some(9152))),
    ]));
    let handshake = Handshake::new(Arc::clone(&identity), fast_handshake_config());

    handshake.start();
    let mut states = handshake.subscribe();
    states
        .wait_for(|s| *s == AuthorizationState::AwaitingApproval)
        .await?;
    assert_eq!(
        handshake.approval_uri().as_deref(),
        Some("https://client.warpcast.com/deeplinks/signed-key-request?token=0xtoken1")
    );

    assert_eq!(handshake.settled().await, AuthorizationState::Approved);
    assert_eq!(identity.polls(), 2);
    assert!(handshake.approval_uri().is_none());

    let signer = handshake.take_credential().expect("credential after approval");
    assert!(handshake.take_credential().is_none());
    assert_eq!(signer.fid(), 9152);

    let path = std::env::temp_dir()
        .join(format!("herocast-it-{}", std::process::id()))
        .join("signers.json");
    let key = base64::engine::general_purpose::STANDARD.encode([9u8; 32]);
    let store = SignerStore::new_encrypted(path.clone(), &key)?;
    store.save(std::slice::from_ref(&signer))?;

    let loaded = store.load()?;
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].fid(), 9152);
    assert_eq!(loaded[0].public_key_hex(), signer.public_key_hex());
    let _ = std::fs::remove_file(&path);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_denied_then_retry_gets_new_request() -> Result<()> {
    let identity = Arc::new(CannedWarpcast::new(vec![Ok(status_body("rejected", None))]));
    let handshake = Handshake::new(Arc::clone(&identity), fast_handshake_config());

    handshake.start();
    assert_eq!(handshake.settled().await, AuthorizationState::Denied);
    assert_eq!(handshake.last_error(), Some(HandshakeError::Denied));

    assert_eq!(handshake.start(), AuthorizationState::Requesting);
    let mut states = handshake.subscribe();
    states
        .wait_for(|s| *s == AuthorizationState::AwaitingApproval)
        .await?;
    assert_eq!(identity.creates(), 2);
    assert!(handshake.last_error().is_none());
    assert_eq!(
        handshake.pending_request().map(|r| r.token),
        Some("0xtoken2".to_string())
    );
    handshake.cancel();
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_expires_at_service_deadline() -> Result<()> {
    // 60s lifetime, 2s interval: 29 pending polls, then the deadline tick.
    let identity = Arc::new(CannedWarpcast::new(vec![]));
    let handshake = Handshake::new(Arc::clone(&identity), fast_handshake_config());

    handshake.start();
    assert_eq!(handshake.settled().await, AuthorizationState::Expired);
    assert_eq!(handshake.last_error(), Some(HandshakeError::Expired));
    let polls = identity.polls();
    assert_eq!(polls, 29);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(identity.polls(), polls);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_malformed_replies_exhaust_polling() -> Result<()> {
    let identity = Arc::new(CannedWarpcast::new(vec![
        Ok("<html>502</html>".into()),
        Err(Error::Status {
            code: 503,
            body: String::new(),
        }),
        Ok(status_body("approved", None)),
        Err(Error::Transport("reset".into())),
    ]));
    let handshake = Handshake::new(Arc::clone(&identity), fast_handshake_config());
    let failed_before = METRICS.handshake_failed.load(std::sync::atomic::Ordering::Relaxed);

    handshake.start();
    assert_eq!(handshake.settled().await, AuthorizationState::Failed);
    assert_eq!(
        handshake.last_error(),
        Some(HandshakeError::NetworkExhausted { failures: 4 })
    );
    assert_eq!(identity.polls(), 4);
    assert!(METRICS.handshake_failed.load(std::sync::atomic::Ordering::Relaxed) > failed_before);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_polling() -> Result<()> {
    let identity = Arc::new(CannedWarpcast::new(vec![]));
    let handshake = Handshake::new(Arc::clone(&identity), fast_handshake_config());

    handshake.start();
    let mut states = handshake.subscribe();
    states
        .wait_for(|s| *s == AuthorizationState::AwaitingApproval)
        .await?;
    tokio::time::sleep(Duration::from_millis(4_500)).await;
    let polls = identity.polls();
    assert_eq!(polls, 2);

    assert_eq!(handshake.cancel(), AuthorizationState::Idle);
    assert!(handshake.pending_request().is_none());
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(identity.polls(), polls);
    assert_eq!(handshake.current_state(), AuthorizationState::Idle);
    Ok(())
}
