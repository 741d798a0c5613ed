//! Client session: turns wire messages into module calls and responses.

use crate::module::RealtimeModule;
use crate::sink::{ClientConnection, ClientFeedSink};
use log::debug;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use skyfeed_commons::constants::{TYPE_REALTIME_SUBSCRIBE, TYPE_REALTIME_UNSUBSCRIBE};
use skyfeed_commons::{Message, QueryId, RealtimeRequest, RealtimeResponse};
use std::sync::Arc;

pub struct RealtimeSession {
    module: Arc<RealtimeModule>,
    connection: Arc<dyn ClientConnection>,
}

impl RealtimeSession {
    pub fn new(module: Arc<RealtimeModule>, connection: Arc<dyn ClientConnection>) -> Self {
        Self { module, connection }
    }

    /// Handle one inbound message and build the response to send back.
    ///
    /// A failed subscribe is answered with `ack: false`; the session stays
    /// usable so the client can retry.
    pub async fn handle(&self, message: Message) -> Message {
        match message.message_type.as_str() {
            TYPE_REALTIME_SUBSCRIBE => {
                let response = self.subscribe(&message.data).await;
                Self::reply(message.id, TYPE_REALTIME_SUBSCRIBE, &response)
            },
            TYPE_REALTIME_UNSUBSCRIBE => {
                let response = self.unsubscribe(&message.data);
                Self::reply(message.id, TYPE_REALTIME_UNSUBSCRIBE, &response)
            },
            _ => Message::new(
                message.id,
                message.message_type,
                json!({ "error": "Invalid message type" }),
            ),
        }
    }

    async fn subscribe(&self, data: &JsonValue) -> RealtimeResponse {
        let request = match RealtimeRequest::deserialize(data) {
            Ok(request) => request,
            Err(e) => return Self::malformed(data, e),
        };

        let client_id = self.connection.client_id();
        let sink = ClientFeedSink::new(Arc::clone(&self.connection));
        match self.module.subscribe(client_id, &request, sink).await {
            Ok(docs) => RealtimeResponse::ok(request.group, request.id, Some(docs)),
            Err(e) => {
                debug!(
                    "Subscribe of client {} to '{}' failed: {}",
                    client_id, request.group, e
                );
                RealtimeResponse::failed(request.group, request.id, e.to_string())
            },
        }
    }

    fn unsubscribe(&self, data: &JsonValue) -> RealtimeResponse {
        let request = match RealtimeRequest::deserialize(data) {
            Ok(request) => request,
            Err(e) => return Self::malformed(data, e),
        };
        self.module.unsubscribe(self.connection.client_id(), &request);
        RealtimeResponse::ok(request.group, request.id, None)
    }

    fn malformed(data: &JsonValue, error: serde_json::Error) -> RealtimeResponse {
        let group = data.get("group").and_then(JsonValue::as_str).unwrap_or_default();
        let id = data
            .get("id")
            .and_then(JsonValue::as_str)
            .map(QueryId::new)
            .unwrap_or_default();
        RealtimeResponse::failed(group, id, format!("Invalid request: {}", error))
    }

    fn reply(id: String, message_type: &str, response: &RealtimeResponse) -> Message {
        let data = serde_json::to_value(response)
            .unwrap_or_else(|e| json!({ "ack": false, "error": e.to_string() }));
        Message::new(id, message_type, data)
    }
}

/// Serve one client until it disconnects, then drop its live queries.
pub async fn serve_client(module: Arc<RealtimeModule>, connection: Arc<dyn ClientConnection>) {
    let session = RealtimeSession::new(Arc::clone(&module), Arc::clone(&connection));
    let disconnected = connection.disconnected();

    loop {
        let message = tokio::select! {
            _ = disconnected.cancelled() => break,
            message = connection.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        let response = session.handle(message).await;
        if let Err(e) = connection.write(response) {
            debug!("Client {} write failed: {}", connection.client_id(), e);
            break;
        }
    }

    let removed = module.remove_client(connection.client_id());
    debug!(
        "Client {} disconnected, removed {} live queries",
        connection.client_id(),
        removed
    );
    connection.close().await;
}
