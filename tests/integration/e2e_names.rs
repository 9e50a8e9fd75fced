//! End-to-end: name binding, collision, and idempotent rebinding.

use store_core::MetaTree;
use store_test_utils::TestServer;

#[tokio::test]
async fn put_name_then_get_name_round_trips() {
    let server = TestServer::start().await;
    let client = server.connect_rpc().await;

    let (id, ..) = client
        .create_data(MetaTree::new())
        .expect("create_data succeeds");
    client.put_name(id, "widget").expect("put_name succeeds");

    assert_eq!(client.get_name("widget", false).expect("get_name succeeds"), id);

    server.stop().await;
}

#[tokio::test]
async fn name_collision_then_idempotent_rebind_scenario_s4() {
    let server = TestServer::start().await;
    let client = server.connect_rpc().await;

    let (id_a, ..) = client.create_data(MetaTree::new()).expect("create_data succeeds");
    let (id_b, ..) = client.create_data(MetaTree::new()).expect("create_data succeeds");

    client.put_name(id_a, "a").expect("first binding succeeds");

    let err = client.put_name(id_b, "a").expect_err("colliding binding fails");
    assert_eq!(err.code(), object_protocol::error_codes::ALREADY_EXISTS);

    client
        .put_name(id_a, "a")
        .expect("identical rebinding is idempotent");

    server.stop().await;
}

#[tokio::test]
async fn drop_name_then_get_name_fails_not_found() {
    let server = TestServer::start().await;
    let client = server.connect_rpc().await;

    let (id, ..) = client.create_data(MetaTree::new()).expect("create_data succeeds");
    client.put_name(id, "temp").expect("put_name succeeds");
    client.drop_name("temp").expect("drop_name succeeds");

    let err = client.get_name("temp", false).expect_err("dropped name is gone");
    assert_eq!(err.code(), object_protocol::error_codes::NOT_FOUND);

    server.stop().await;
}

#[tokio::test]
async fn cluster_meta_reports_this_instance_scenario_s5() {
    let server = TestServer::start().await;
    let client = server.connect_rpc().await;

    client.create_data(MetaTree::new()).expect("create_data succeeds");

    let meta = client.cluster_meta().expect("cluster_meta succeeds");
    assert!(meta.contains_key(&client.instance_id()));

    server.stop().await;
}
