//! End-to-end live query tests through client sessions

mod common;

use common::*;
use serde_json::json;
use skyfeed_commons::{ChangeType, ClientId, DbType, FeedEvent, Message, QueryId};
use skyfeed_configs::RealtimeSettings;
use skyfeed_realtime::serve_client;
use std::sync::Arc;
use std::time::Duration;

fn order(doc_id: &str, change_type: ChangeType, status: Option<&str>) -> FeedEvent {
    FeedEvent::new(
        "orders",
        doc_id,
        change_type,
        status.map(|s| json!({ "_id": doc_id, "status": s })),
        DbType::Mongo,
    )
}

#[tokio::test]
async fn test_orders_feed_end_to_end() {
    let t = enabled_module(2).await;
    let (connection, mut client) = connection("client-c");
    tokio::spawn(serve_client(Arc::clone(&t.module), connection));

    client.send(subscribe_message("sub-1", "orders", json!({"status": "shipped"})));
    let ack = client.next().await.unwrap();
    assert_eq!(ack.id, "sub-1");
    assert_eq!(ack.message_type, "realtime-subscribe");
    assert_eq!(ack.data["ack"], true);
    assert_eq!(ack.data["group"], "orders");
    assert_eq!(ack.data["docs"], json!([]));

    assert!(t.module.submit(order("42", ChangeType::Write, Some("shipped"))).await);
    let feed = feed_of(&client.next().await.unwrap());
    assert_eq!(feed.doc_id, "42");
    assert_eq!(feed.query_id, Some(QueryId::new("sub-1")));

    assert!(t.module.submit(order("43", ChangeType::Write, Some("pending"))).await);
    client.assert_silent().await;

    t.module.shutdown().await;
}

#[tokio::test]
async fn test_subscribe_returns_filtered_snapshot() {
    let t = enabled_module(1).await;
    t.storage.insert("orders", json!({"_id": "1", "status": "shipped"}));
    t.storage.insert("orders", json!({"_id": "2", "status": "pending"}));
    t.storage.insert("orders", json!({"status": "shipped"}));

    let (connection, mut client) = connection("client-c");
    tokio::spawn(serve_client(Arc::clone(&t.module), connection));

    client.send(subscribe_message("sub-1", "orders", json!({"status": "shipped"})));
    let ack = client.next().await.unwrap();
    let docs = ack.data["docs"].as_array().unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0]["docId"], "1");
    assert_eq!(docs[0]["type"], "write");
    assert_eq!(docs[0]["queryId"], "sub-1");

    t.module.shutdown().await;
}

#[tokio::test]
async fn test_update_without_payload_is_read_back() {
    let t = enabled_module(1).await;
    t.storage.insert("orders", json!({"_id": "42", "status": "shipped"}));
    t.storage.insert("orders", json!({"_id": "43", "status": "pending"}));
    let (connection, mut client) = connection("client-c");
    tokio::spawn(serve_client(Arc::clone(&t.module), connection));

    client.send(subscribe_message("sub-1", "orders", json!({"status": "shipped"})));
    client.next().await.unwrap();

    // stored doc is sent, then filtered as usual
    assert!(t.module.submit(order("42", ChangeType::Update, None)).await);
    assert!(t.module.submit(order("43", ChangeType::Update, None)).await);
    // gone from storage: reported as a delete
    assert!(t.module.submit(order("44", ChangeType::Update, None)).await);

    let updated = feed_of(&client.next().await.unwrap());
    assert_eq!(updated.doc_id, "42");
    assert_eq!(updated.change_type, ChangeType::Update);
    assert_eq!(updated.payload, Some(json!({"_id": "42", "status": "shipped"})));

    let deleted = feed_of(&client.next().await.unwrap());
    assert_eq!(deleted.doc_id, "44");
    assert!(deleted.is_delete());
    client.assert_silent().await;

    t.module.shutdown().await;
}

#[tokio::test]
async fn test_delete_reaches_every_query_in_group() {
    let t = enabled_module(1).await;
    let (connection, mut client) = connection("client-c");
    tokio::spawn(serve_client(Arc::clone(&t.module), connection));

    client.send(subscribe_message("shipped", "orders", json!({"status": "shipped"})));
    client.next().await.unwrap();
    client.send(subscribe_message("never", "orders", json!({"status": {"$eq": 99}})));
    client.next().await.unwrap();

    assert!(t.module.submit(order("42", ChangeType::Delete, None)).await);

    let mut queries = vec![
        feed_of(&client.next().await.unwrap()).query_id.unwrap(),
        feed_of(&client.next().await.unwrap()).query_id.unwrap(),
    ];
    queries.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    assert_eq!(queries, vec![QueryId::new("never"), QueryId::new("shipped")]);

    t.module.shutdown().await;
}

#[tokio::test]
async fn test_failed_subscribe_keeps_session_open() {
    let t = enabled_module(1).await;
    let (connection, mut client) = connection("client-c");
    tokio::spawn(serve_client(Arc::clone(&t.module), connection));

    let mut bad_token = subscribe_message("sub-1", "orders", json!({}));
    bad_token.data["token"] = json!("expired");
    client.send(bad_token);
    let response = client.next().await.unwrap();
    assert_eq!(response.data["ack"], false);
    assert!(response.data["error"].as_str().unwrap().contains("invalid token"));
    assert!(response.data.get("docs").is_none());

    client.send(subscribe_message("sub-2", "secrets", json!({})));
    let response = client.next().await.unwrap();
    assert_eq!(response.data["ack"], false);

    client.send(subscribe_message("sub-3", "orders", json!({})));
    assert_eq!(client.next().await.unwrap().data["ack"], true);

    t.module.shutdown().await;
}

#[tokio::test]
async fn test_unsubscribe_and_unknown_message_type() {
    let t = enabled_module(1).await;
    let (connection, mut client) = connection("client-c");
    tokio::spawn(serve_client(Arc::clone(&t.module), connection));

    client.send(subscribe_message("sub-1", "orders", json!({})));
    client.next().await.unwrap();

    client.send(unsubscribe_message("sub-1", "orders"));
    let response = client.next().await.unwrap();
    assert_eq!(response.message_type, "realtime-unsubscribe");
    assert_eq!(response.data, json!({"group": "orders", "id": "sub-1", "ack": true}));

    // unsubscribing twice still acks
    client.send(unsubscribe_message("sub-1", "orders"));
    assert_eq!(client.next().await.unwrap().data["ack"], true);

    client.send(Message::new("m9", "realtime-bogus", json!({})));
    let response = client.next().await.unwrap();
    assert_eq!(response.id, "m9");
    assert_eq!(response.data, json!({"error": "Invalid message type"}));

    assert!(t.module.submit(order("1", ChangeType::Write, Some("x"))).await);
    client.assert_silent().await;

    t.module.shutdown().await;
}

#[tokio::test]
async fn test_disconnect_removes_client_queries() {
    let t = enabled_module(1).await;
    let (connection, mut client) = connection("client-c");
    let served = tokio::spawn(serve_client(Arc::clone(&t.module), connection));

    client.send(subscribe_message("a", "orders", json!({})));
    client.next().await.unwrap();
    client.send(subscribe_message("b", "users", json!({})));
    client.next().await.unwrap();
    assert_eq!(t.module.registry().total_queries(), 2);

    client.disconnect.cancel();
    tokio::time::timeout(Duration::from_secs(2), served)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(t.module.registry().total_queries(), 0);
    assert!(!t
        .module
        .registry()
        .contains("orders", &ClientId::new("client-c"), &QueryId::new("a")));

    t.module.shutdown().await;
}

#[tokio::test]
async fn test_disable_then_reenable() {
    let t = enabled_module(3).await;
    let (connection, mut client) = connection("client-c");
    tokio::spawn(serve_client(Arc::clone(&t.module), connection));

    client.send(subscribe_message("sub-1", "orders", json!({})));
    client.next().await.unwrap();

    t.module.set_config(RealtimeSettings::default()).await;
    assert!(!t.module.submit(order("1", ChangeType::Write, Some("x"))).await);

    client.send(subscribe_message("sub-2", "orders", json!({})));
    let response = client.next().await.unwrap();
    assert_eq!(response.data["ack"], false);
    client.assert_silent().await;

    t.module.set_config(RealtimeSettings::enabled(2)).await;
    assert!(t.module.submit(order("2", ChangeType::Write, Some("x"))).await);
    let feed = feed_of(&client.next().await.unwrap());
    assert_eq!(feed.doc_id, "2");

    t.module.shutdown().await;
}
