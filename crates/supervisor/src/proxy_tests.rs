// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;
use tokio::net::TcpListener;

/// Minimal worker-side loop: answer every request with a canned reply.
async fn echo_worker(reply: WorkerReply) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            let reply = reply.clone();
            let _ = wire::read_request(&mut stream, Duration::from_secs(1)).await;
            let _ = wire::write_reply(&mut stream, &reply, Duration::from_secs(1)).await;
        }
    });
    port
}

#[tokio::test]
async fn roundtrips_a_successful_reply() {
    let port = echo_worker(WorkerReply::ok(json!({"status": "ready"}))).await;

    let reply = send_command(port, &CommandRequest::ping(), Duration::from_secs(1)).await;
    assert!(reply.is_success());
    assert_eq!(reply.result, Some(json!({"status": "ready"})));
}

#[tokio::test]
async fn engine_errors_pass_through_verbatim() {
    let port = echo_worker(WorkerReply::err_with_detail("bad twig", "trace")).await;

    let reply = send_command(
        port,
        &CommandRequest::new("get_value").with_arg("twig", "nope"),
        Duration::from_secs(1),
    )
    .await;
    assert!(!reply.is_success());
    assert_eq!(reply.error.as_deref(), Some("bad twig"));
    assert_eq!(reply.traceback.as_deref(), Some("trace"));
}

#[tokio::test]
async fn connection_refused_folds_into_error_envelope() {
    // bind then drop to get a port nothing is listening on
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let reply = send_command(port, &CommandRequest::ping(), Duration::from_millis(500)).await;
    assert!(!reply.is_success());
    assert!(reply.error.is_some());
}

#[tokio::test]
async fn silent_peer_times_out_as_error_envelope() {
    // listener that accepts but never replies
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let _guard = listener.accept().await;
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let reply = send_command(port, &CommandRequest::ping(), Duration::from_millis(100)).await;
    assert!(!reply.is_success());
}

#[tokio::test]
async fn try_send_surfaces_wire_errors() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let err = try_send_command(port, &CommandRequest::ping(), Duration::from_millis(200))
        .await
        .unwrap_err();
    assert!(matches!(err, WireError::Io(_) | WireError::Timeout));
}
