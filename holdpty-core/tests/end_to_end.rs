//! Cross-component scenarios that need a live accepted connection: start a
//! real holder, connect a real peer over the real endpoint, and watch frames
//! go by. Mirrors the split the teacher uses between `pty-shim`'s inline
//! unit tests and `daemon`'s `tests/*.rs` integration suite.

use std::time::Duration;

use holdpty_core::{start, HolderError, Mode, StartOptions};

fn posix_only() -> bool {
    cfg!(unix)
}

#[tokio::test]
async fn start_and_observe_output_and_exit() {
    if !posix_only() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let holder = start(StartOptions {
        command: vec!["sh".into(), "-c".into(), "echo hello-from-pty; exit 42".into()],
        dir: Some(dir.path().to_path_buf()),
        linger_ms: Some(50),
        ..Default::default()
    })
    .await
    .unwrap();

    let mut peer = holdpty_core::connect_peer(Some(dir.path()), holder.name(), Mode::View)
        .await
        .unwrap();

    let mut saw_output = false;
    let mut exit_code = None;
    for _ in 0..64 {
        match tokio::time::timeout(Duration::from_secs(2), peer.next_frame())
            .await
            .expect("frame within timeout")
            .unwrap()
        {
            Some(frame) if frame.opcode == holdpty_protocol::OP_DATA_OUT => {
                if String::from_utf8_lossy(&frame.payload).contains("hello-from-pty") {
                    saw_output = true;
                }
            }
            Some(frame) if frame.opcode == holdpty_protocol::OP_EXIT => {
                exit_code = holdpty_protocol::decode_exit_code(&frame.payload);
                break;
            }
            Some(_) => {}
            None => break,
        }
    }

    assert!(saw_output, "expected to observe child's stdout");
    assert_eq!(exit_code, Some(42));
    assert_eq!(holder.wait_for_exit().await, Some(42));
}

#[tokio::test]
async fn second_attach_is_rejected_while_first_holds_the_slot() {
    if !posix_only() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let holder = start(StartOptions {
        command: vec!["sh".into(), "-c".into(), "sleep 5".into()],
        dir: Some(dir.path().to_path_buf()),
        linger_ms: Some(50),
        ..Default::default()
    })
    .await
    .unwrap();

    let _first = holdpty_core::connect_peer(Some(dir.path()), holder.name(), Mode::Attach)
        .await
        .unwrap();
    let second = holdpty_core::connect_peer(Some(dir.path()), holder.name(), Mode::Attach).await;
    assert!(matches!(second, Err(HolderError::Exclusivity { name }) if name == holder.name()));

    holder.stop().unwrap();
    assert!(matches!(holder.stop(), Err(HolderError::ShuttingDown)));
}

#[tokio::test]
async fn logs_mode_closes_after_replay() {
    if !posix_only() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let holder = start(StartOptions {
        command: vec!["sh".into(), "-c".into(), "echo logged; sleep 5".into()],
        dir: Some(dir.path().to_path_buf()),
        linger_ms: Some(50),
        ..Default::default()
    })
    .await
    .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    let mut peer = holdpty_core::connect_peer(Some(dir.path()), holder.name(), Mode::Logs)
        .await
        .unwrap();

    let mut saw_replay_end = false;
    for _ in 0..16 {
        match peer.next_frame().await.unwrap() {
            Some(frame) if frame.opcode == holdpty_protocol::OP_REPLAY_END => {
                saw_replay_end = true;
            }
            Some(_) => {}
            None => break,
        }
    }
    assert!(saw_replay_end);

    holder.stop().unwrap();
}

#[tokio::test]
async fn logs_mode_stops_at_replay_end_even_after_child_exit() {
    if !posix_only() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let holder = start(StartOptions {
        command: vec!["sh".into(), "-c".into(), "echo logged; exit 7".into()],
        dir: Some(dir.path().to_path_buf()),
        linger_ms: Some(2000),
        ..Default::default()
    })
    .await
    .unwrap();

    // Give the child time to exit and the holder time to finish its
    // drain/broadcast-EXIT sequence, so `shared.exit_code()` is already
    // `Some` by the time the logs peer connects.
    holder.wait_for_exit().await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut peer = holdpty_core::connect_peer(Some(dir.path()), holder.name(), Mode::Logs)
        .await
        .unwrap();

    let mut saw_replay_end = false;
    loop {
        match peer.next_frame().await.unwrap() {
            Some(frame) if frame.opcode == holdpty_protocol::OP_REPLAY_END => {
                assert!(!saw_replay_end, "REPLAY_END sent twice");
                saw_replay_end = true;
            }
            Some(frame) if frame.opcode == holdpty_protocol::OP_DATA_OUT => {
                assert!(!saw_replay_end, "DATA_OUT sent after REPLAY_END");
            }
            Some(frame) => panic!(
                "unexpected opcode {} after replay (logs mode must stop at REPLAY_END)",
                frame.opcode
            ),
            None => break,
        }
    }
    assert!(saw_replay_end, "expected REPLAY_END before the connection closed");
}

#[tokio::test]
async fn enumeration_sees_running_session_and_reaps_after_linger() {
    if !posix_only() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let holder = start(StartOptions {
        command: vec!["sh".into(), "-c".into(), "exit 0".into()],
        dir: Some(dir.path().to_path_buf()),
        linger_ms: Some(100),
        ..Default::default()
    })
    .await
    .unwrap();

    let entries = holdpty_core::list_sessions(Some(dir.path())).unwrap();
    assert!(entries.iter().any(|e| e.name == holder.name()));

    holder.wait_for_exit().await;
    tokio::time::sleep(Duration::from_millis(400)).await;

    let entries = holdpty_core::list_sessions(Some(dir.path())).unwrap();
    assert!(!entries.iter().any(|e| e.name == holder.name()));
}
