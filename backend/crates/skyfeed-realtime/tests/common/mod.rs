//! Shared fixtures for skyfeed-realtime integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value as JsonValue};
use skyfeed_bus::InMemoryBus;
use skyfeed_commons::{ClientId, DbType, FeedEvent, Message};
use skyfeed_configs::RealtimeSettings;
use skyfeed_realtime::{
    AuthContext, AuthOperation, Authenticator, ClientConnection, RealtimeError, RealtimeModule,
    ReadOperation, ReadRequest, Result, StorageReader,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub const PROJECT: &str = "shop";
pub const TOKEN: &str = "valid-token";

/// Collection name → documents
#[derive(Default)]
pub struct MockStorage {
    collections: Mutex<HashMap<String, Vec<JsonValue>>>,
}

impl MockStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, collection: &str, doc: JsonValue) {
        self.collections
            .lock()
            .entry(collection.to_string())
            .or_default()
            .push(doc);
    }

    pub fn remove(&self, collection: &str, field: &str, id: &str) {
        if let Some(docs) = self.collections.lock().get_mut(collection) {
            docs.retain(|doc| doc.get(field).and_then(JsonValue::as_str) != Some(id));
        }
    }
}

#[async_trait]
impl StorageReader for MockStorage {
    async fn read(
        &self,
        _project: &str,
        _db_type: DbType,
        collection: &str,
        request: ReadRequest,
    ) -> Result<JsonValue> {
        let collections = self.collections.lock();
        let docs = collections.get(collection).cloned().unwrap_or_default();
        let matching: Vec<JsonValue> = docs
            .into_iter()
            .filter(|doc| skyfeed_realtime::matches(&request.find, doc))
            .collect();

        match request.operation {
            ReadOperation::All => Ok(JsonValue::Array(matching)),
            ReadOperation::One => matching
                .into_iter()
                .next()
                .ok_or_else(|| RealtimeError::Storage("document not found".to_string())),
        }
    }
}

/// Accepts [`TOKEN`] and denies the `secrets` collection
pub struct MockAuth;

#[async_trait]
impl Authenticator for MockAuth {
    async fn is_authenticated(
        &self,
        token: &str,
        _db_type: DbType,
        _collection: &str,
        _operation: AuthOperation,
    ) -> Result<AuthContext> {
        if token == TOKEN {
            Ok(AuthContext::new(json!({"id": "user-1"})))
        } else {
            Err(RealtimeError::Unauthenticated("invalid token".to_string()))
        }
    }

    async fn is_authorized(
        &self,
        _project: &str,
        _db_type: DbType,
        collection: &str,
        _operation: AuthOperation,
        _args: &JsonValue,
    ) -> Result<()> {
        if collection == "secrets" {
            Err(RealtimeError::Unauthorized("access denied".to_string()))
        } else {
            Ok(())
        }
    }
}

/// In-memory client transport
pub struct ChannelConnection {
    client_id: ClientId,
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Message>>,
    outbound: mpsc::UnboundedSender<Message>,
    disconnected: CancellationToken,
}

/// Client side of a [`ChannelConnection`]
pub struct ClientHandle {
    pub to_server: mpsc::UnboundedSender<Message>,
    pub from_server: mpsc::UnboundedReceiver<Message>,
    pub disconnect: CancellationToken,
}

impl ClientHandle {
    pub fn send(&self, message: Message) {
        self.to_server.send(message).unwrap();
    }

    pub async fn next(&mut self) -> Option<Message> {
        tokio::time::timeout(Duration::from_secs(2), self.from_server.recv())
            .await
            .ok()
            .flatten()
    }

    /// Wait briefly and assert nothing more arrives
    pub async fn assert_silent(&mut self) {
        let next = tokio::time::timeout(Duration::from_millis(100), self.from_server.recv()).await;
        assert!(next.is_err(), "unexpected message: {:?}", next);
    }
}

pub fn connection(client_id: &str) -> (Arc<ChannelConnection>, ClientHandle) {
    let (to_server, inbound) = mpsc::unbounded_channel();
    let (outbound, from_server) = mpsc::unbounded_channel();
    let disconnect = CancellationToken::new();
    let connection = Arc::new(ChannelConnection {
        client_id: ClientId::new(client_id),
        inbound: tokio::sync::Mutex::new(inbound),
        outbound,
        disconnected: disconnect.clone(),
    });
    (
        connection,
        ClientHandle {
            to_server,
            from_server,
            disconnect,
        },
    )
}

#[async_trait]
impl ClientConnection for ChannelConnection {
    fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    fn write(&self, message: Message) -> Result<()> {
        self.outbound
            .send(message)
            .map_err(|_| RealtimeError::Transport("client gone".to_string()))
    }

    async fn recv(&self) -> Option<Message> {
        self.inbound.lock().await.recv().await
    }

    async fn close(&self) {
        self.disconnected.cancel();
    }

    fn disconnected(&self) -> CancellationToken {
        self.disconnected.clone()
    }
}

pub struct TestModule {
    pub bus: InMemoryBus,
    pub storage: Arc<MockStorage>,
    pub module: Arc<RealtimeModule>,
}

/// Enabled module with `workers` dispatcher workers over an in-memory bus
pub async fn enabled_module(workers: usize) -> TestModule {
    let bus = InMemoryBus::new();
    let storage = MockStorage::new();
    let module = Arc::new(RealtimeModule::new(
        PROJECT,
        Arc::new(bus.clone()),
        storage.clone(),
        Arc::new(MockAuth),
    ));
    module.set_config(RealtimeSettings::enabled(workers)).await;
    TestModule {
        bus,
        storage,
        module,
    }
}

pub fn subscribe_message(id: &str, group: &str, filter: JsonValue) -> Message {
    Message::new(
        id,
        "realtime-subscribe",
        json!({
            "id": id,
            "token": TOKEN,
            "dbType": "mongo",
            "group": group,
            "where": filter,
        }),
    )
}

pub fn unsubscribe_message(id: &str, group: &str) -> Message {
    Message::new(
        id,
        "realtime-unsubscribe",
        json!({ "id": id, "dbType": "mongo", "group": group }),
    )
}

pub fn feed_of(message: &Message) -> FeedEvent {
    assert_eq!(message.message_type, "realtime-feed");
    serde_json::from_value(message.data.clone()).unwrap()
}
