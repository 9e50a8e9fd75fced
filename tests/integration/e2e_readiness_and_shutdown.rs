//! End-to-end: readiness gating and the shutdown sequence draining the
//! deferred queue with `cancelled` replies.

use std::time::Duration;

use store_core::MetaTree;
use store_test_utils::TestServer;

#[tokio::test]
async fn server_reaches_ready_and_serves_requests() {
    let server = TestServer::start().await;
    let client = server.connect_rpc().await;

    let status = client.instance_status().expect("instance_status succeeds");
    assert_eq!(status.ipc_connections, 0);
    assert_eq!(status.rpc_connections, 1);

    server.stop().await;
}

#[tokio::test]
async fn stop_cancels_outstanding_deferred_requests_with_cancelled_error() {
    let server = TestServer::start().await;
    let socket_path = server.ipc_socket_path();

    let wait_result = tokio::task::spawn_blocking(move || {
        use std::io::{Read, Write};
        use std::os::unix::net::UnixStream;

        let mut stream = UnixStream::connect(&socket_path).expect("connect to ipc socket");
        let register = object_protocol::encode_frame(&object_protocol::Request::Register {
            version: "1".to_string(),
        })
        .unwrap();
        stream.write_all(&register).unwrap();
        let mut buf = vec![0u8; 4096];
        let n = stream.read(&mut buf).expect("read registered reply");
        buf.truncate(n);

        let get_data = object_protocol::encode_frame(&object_protocol::Request::GetData {
            ids: vec![store_core::ObjectID(999)],
            sync_remote: false,
            wait: true,
        })
        .unwrap();
        stream.write_all(&get_data).unwrap();

        // Block reading the deferred reply; the server's shutdown sequence
        // should cancel it rather than hang forever.
        let mut reply_buf = vec![0u8; 4096];
        let n = stream.read(&mut reply_buf).expect("read cancelled reply");
        reply_buf.truncate(n);
        match object_protocol::decode_frame::<object_protocol::Reply>(&reply_buf) {
            object_protocol::DecodeOutcome::Frame { value, .. } => value,
            other => panic!("expected a decoded reply frame, got {other:?}"),
        }
    });

    // Let the deferred request land in the queue before stopping.
    tokio::time::sleep(Duration::from_millis(100)).await;
    server.stop().await;

    let reply = wait_result.await.expect("spawn_blocking join");
    match reply {
        object_protocol::Reply::Error { code, .. } => {
            assert_eq!(code, object_protocol::error_codes::CANCELLED);
        }
        other => panic!("expected a cancelled error reply, got {other:?}"),
    }
}

#[tokio::test]
async fn get_data_for_unknown_id_without_wait_returns_empty_content() {
    let server = TestServer::start().await;
    let client = server.connect_rpc().await;

    let result = client
        .get_data(vec![store_core::ObjectID(12345)], false, false)
        .expect("get_data succeeds");
    assert!(result.is_empty());

    server.stop().await;
}

#[tokio::test]
async fn create_data_allocates_from_bulk_capacity() {
    let server = TestServer::start().await;
    let client = server.connect_rpc().await;

    let mut content = MetaTree::new();
    content.set_nbytes(1024);
    client.create_data(content).expect("create_data succeeds");

    let status = client.instance_status().expect("instance_status succeeds");
    assert_eq!(status.memory_usage, 1024);

    server.stop().await;
}
