//! End-to-end: a `get_data(wait=true)` call blocks until a matching object
//! shows up, and drops silently if the caller disconnects first.

use std::time::Duration;

use store_core::MetaTree;
use store_test_utils::TestServer;

#[tokio::test]
async fn deferred_get_fires_once_the_object_is_created_scenario_s2() {
    let server = TestServer::start().await;
    let waiter = server.connect_rpc().await;
    let creator = server.connect_rpc().await;

    // Ids are assigned sequentially starting at 1, so the first object
    // created against a freshly started server is always id 1 — wait on
    // that id before it exists.
    let awaited_id = store_core::ObjectID(1);
    let wait_handle =
        tokio::task::spawn_blocking(move || waiter.get_data(vec![awaited_id], false, true));

    // Give the blocking waiter a moment to land in the dispatcher's
    // deferred queue before the matching object exists.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut content = MetaTree::new();
    content.insert("typename", "Awaited");
    let (id, ..) = tokio::task::spawn_blocking(move || creator.create_data(content))
        .await
        .expect("spawn_blocking join")
        .expect("create_data succeeds");
    assert_eq!(id, awaited_id);

    let result = wait_handle
        .await
        .expect("spawn_blocking join")
        .expect("deferred get_data eventually succeeds");
    assert!(result.contains_key(&id));

    server.stop().await;
}

#[tokio::test]
async fn connection_close_cancels_its_deferred_request_scenario_s3() {
    let server = TestServer::start().await;
    let socket_path = server.ipc_socket_path();

    // Drive the wire protocol directly so the deferred request can be left
    // outstanding and the socket dropped out from under it, without the
    // client library's own `disconnect` sending a clean `exit` frame.
    tokio::task::spawn_blocking(move || {
        use std::io::{Read, Write};
        use std::os::unix::net::UnixStream;

        let mut stream = UnixStream::connect(&socket_path).expect("connect to ipc socket");
        let register = object_protocol::encode_frame(&object_protocol::Request::Register {
            version: "1".to_string(),
        })
        .unwrap();
        stream.write_all(&register).unwrap();
        let mut buf = [0u8; 4096];
        stream.read(&mut buf).expect("read registered reply");

        let get_data = object_protocol::encode_frame(&object_protocol::Request::GetData {
            ids: vec![store_core::ObjectID(1)],
            sync_remote: false,
            wait: true,
        })
        .unwrap();
        stream.write_all(&get_data).unwrap();
        // Drop without reading the (never-arriving) reply.
    })
    .await
    .expect("spawn_blocking join");

    // Give the server a moment to notice the half-close and drop the
    // deferred entry from the queue.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let client = server.connect_rpc().await;
    let status = tokio::task::spawn_blocking(move || client.instance_status())
        .await
        .expect("spawn_blocking join")
        .expect("instance_status succeeds");
    assert_eq!(status.deferred_requests, 0);

    server.stop().await;
}
