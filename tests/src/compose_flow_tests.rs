//! End-to-end compose path: draft → mention encoding → session gate →
//! submitter, with a scripted directory and identity service.

use std::sync::Arc;

use anyhow::Result;
use herocast_core::{
    AuthorizationState, ByteOffset, Config, EncodingError, Error, Handshake, MentionEncoder,
    MentionWarning, SessionGate, SubmitError,
};
use herocast_text::extract_mentions;
use serde_json::json;

use crate::utils::{
    account, fast_handshake_config, status_body, CannedWarpcast, MapDirectory, RecordingSubmitter,
};

fn encoder(directory: Arc<MapDirectory>) -> MentionEncoder<Arc<MapDirectory>> {
    let mut config = Config::default();
    config.resolver.retry_backoff_ms = 1;
    MentionEncoder::new(directory, &config)
}

async fn approved_gate() -> Result<SessionGate<Arc<CannedWarpcast>>> {
    let identity = Arc::new(CannedWarpcast::new(vec![Ok(status_body("approved", Some(9152)))]));
    let handshake = Handshake::new(identity, fast_handshake_config());
    handshake.start();
    assert_eq!(handshake.settled().await, AuthorizationState::Approved);
    Ok(SessionGate::new(handshake))
}

#[tokio::test(start_paused = true)]
async fn test_draft_is_submitted_with_byte_positions() -> Result<()> {
    let gate = approved_gate().await?;
    let directory = Arc::new(MapDirectory::new(&[("alice", 123), ("dwr", 3)]));
    let submitter = RecordingSubmitter::default();

    let receipt = gate
        .submit(
            &account(),
            "gm 🌅 @alice and @bob_2, cc @DWR",
            &encoder(Arc::clone(&directory)),
            &submitter,
        )
        .await?;

    assert_eq!(directory.calls(), 1);
    assert_eq!(
        receipt,
        json!({
            "text": "gm 🌅  and @bob_2, cc ",
            "mentions": [123, 3],
            "mentionsPositions": [8, 24],
        })
    );

    let posts = submitter.posts.lock().unwrap();
    let (who, message) = &posts[0];
    assert_eq!(who.fid, 9152);
    assert_eq!(
        message.warnings,
        vec![MentionWarning::Unresolved {
            handle: "bob_2".into()
        }]
    );
    // Spans still point into the original draft.
    assert_eq!(message.mentions[0].span.start, ByteOffset::new(8));
    assert_eq!(message.mentions[1].span.handle, "DWR");
    Ok(())
}

#[tokio::test]
async fn test_submit_blocked_without_signer() -> Result<()> {
    let identity = Arc::new(CannedWarpcast::new(vec![]));
    let gate = SessionGate::new(Handshake::new(identity, fast_handshake_config()));
    let submitter = RecordingSubmitter::default();

    let result = gate
        .submit(&account(), "hi @alice", &encoder(Arc::new(MapDirectory::new(&[]))), &submitter)
        .await;

    assert_eq!(
        result.unwrap_err(),
        SubmitError::NotAuthorized(AuthorizationState::Idle)
    );
    assert!(submitter.posts.lock().unwrap().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_directory_outage_still_posts_plain_text() -> Result<()> {
    let gate = approved_gate().await?;
    let directory = Arc::new(MapDirectory::new(&[("alice", 123)]));
    *directory.fail_with.lock().unwrap() = Some(Error::Transport("connection reset".into()));
    let submitter = RecordingSubmitter::default();

    let receipt = gate
        .submit(&account(), "hi @alice", &encoder(Arc::clone(&directory)), &submitter)
        .await?;

    // One retry, then degrade.
    assert_eq!(directory.calls(), 2);
    assert_eq!(receipt["text"], "hi @alice");
    assert_eq!(receipt["mentions"], json!([]));
    let posts = submitter.posts.lock().unwrap();
    assert!(matches!(
        posts[0].1.warnings.as_slice(),
        [MentionWarning::ResolutionUnavailable { .. }]
    ));
    Ok(())
}

#[tokio::test]
async fn test_malformed_utf8_draft_is_rejected() -> Result<()> {
    let directory = Arc::new(MapDirectory::new(&[]));
    let enc = encoder(Arc::clone(&directory));

    let err = enc.encode_utf8(b"gm \xf0\x9f @alice").await.unwrap_err();
    assert!(matches!(err, EncodingError::InvalidUtf8 { valid_up_to: 3 }));
    assert_eq!(directory.calls(), 0);
    Ok(())
}

#[test]
fn test_extraction_is_restartable() {
    let text = "@a @b_c email@x.com @d-e.";
    let first: Vec<_> = extract_mentions(text).collect();
    let second: Vec<_> = extract_mentions(text).collect();
    assert_eq!(first, second);
    let handles: Vec<_> = first.iter().map(|m| m.handle.as_str()).collect();
    assert_eq!(handles, ["a", "b_c", "d-e"]);
    assert!(first.windows(2).all(|w| w[0].end <= w[1].start));
}
