//! Document lookups by id for feeds that carry no usable payload

use crate::error::Result;
use crate::traits::{ReadRequest, StorageReader};
use log::trace;
use serde_json::{Map, Value as JsonValue};
use skyfeed_commons::{ChangeType, DbType, FeedEvent};
use std::sync::Arc;

pub struct DocumentResolver {
    project: String,
    storage: Arc<dyn StorageReader>,
}

impl DocumentResolver {
    pub fn new(project: impl Into<String>, storage: Arc<dyn StorageReader>) -> Self {
        Self {
            project: project.into(),
            storage,
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// Read one document of `group` by the id field of `db_type`
    pub async fn fetch(&self, db_type: DbType, group: &str, doc_id: &str) -> Result<JsonValue> {
        let mut find = Map::new();
        find.insert(
            db_type.id_field().to_string(),
            JsonValue::String(doc_id.to_string()),
        );
        self.storage
            .read(&self.project, db_type, group, ReadRequest::one(JsonValue::Object(find)))
            .await
    }

    /// Fill in an update that arrived without a payload.
    ///
    /// Found: the stored document becomes the payload. Missing: the feed
    /// turns into a delete. Any other event is returned as is.
    pub async fn hydrate(&self, mut event: FeedEvent) -> FeedEvent {
        if event.change_type != ChangeType::Update || event.payload.is_some() {
            return event;
        }

        match self.fetch(event.db_type, &event.group, &event.doc_id).await {
            Ok(doc) => event.payload = Some(doc),
            Err(e) => {
                trace!("Doc {} unreadable after update ({}), sending delete", event.doc_id, e);
                event.change_type = ChangeType::Delete;
            },
        }
        event.touch();
        event
    }
}
