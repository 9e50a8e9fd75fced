//! End-to-end: create an object over one endpoint, fetch it back over the
//! other, through a real server process and real synchronous clients.

use store_core::MetaTree;
use store_test_utils::TestServer;

#[tokio::test]
async fn create_then_get_round_trips_over_rpc_scenario_s1() {
    let server = TestServer::start().await;
    let client = server.connect_rpc().await;

    let mut content = MetaTree::new();
    content.insert("typename", "Blob");
    content.insert("nbytes", 16u64);
    let (id, signature, instance_id) = client
        .create_data(content)
        .expect("create_data succeeds");

    let fetched = client
        .get_data(vec![id], false, false)
        .expect("get_data succeeds");
    let tree = fetched.get(&id).expect("created id is present");
    assert_eq!(tree.id(), Some(id));
    assert_eq!(tree.signature(), Some(signature));
    assert_eq!(tree.instance_id(), Some(instance_id));
    assert_eq!(tree.typename(), Some("Blob"));
    assert_eq!(tree.nbytes(), 16);

    server.stop().await;
}

#[tokio::test]
async fn create_over_ipc_is_visible_over_rpc() {
    let server = TestServer::start().await;
    let ipc_client = server.connect_ipc().await;
    let rpc_client = server.connect_rpc().await;

    let mut content = MetaTree::new();
    content.insert("typename", "Widget");
    let (id, ..) = ipc_client
        .create_data(content)
        .expect("create_data over ipc succeeds");

    assert!(rpc_client.exists(id).expect("exists succeeds"));

    server.stop().await;
}

#[tokio::test]
async fn del_data_removes_the_object() {
    let server = TestServer::start().await;
    let client = server.connect_rpc().await;

    let (id, ..) = client
        .create_data(MetaTree::new())
        .expect("create_data succeeds");
    client.del_data(vec![id], false, false).expect("del_data succeeds");
    assert!(!client.exists(id).expect("exists succeeds"));

    server.stop().await;
}
