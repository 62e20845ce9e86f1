use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::*;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopicUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// `Some("")` clears the link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl TopicUpdate {
    pub fn from_topic(topic: &Topic) -> Self {
        Self {
            name: Some(topic.name.clone()),
            link: Some(topic.link.clone()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.link.is_none()
    }
}

#[allow(async_fn_in_trait)]
pub trait ContentStore {
    /// Topics sorted by `order`, without the layout sentinel record.
    async fn list_topics(&self) -> Result<Vec<Topic>, StoreError>;

    async fn update_topic(&self, source_record_id: &str, update: &TopicUpdate) -> Result<(), StoreError>;

    /// Reassembled layout blob, or `None` when nothing was saved yet.
    async fn read_layout_blob(&self) -> Result<Option<String>, StoreError>;

    /// Fails with [`StoreError::NotFound`] when the sentinel record is missing;
    /// it is never created implicitly.
    async fn write_layout_blob(&self, json: &str) -> Result<(), StoreError>;

    /// Parsed saved layout. An unreadable blob is reported and treated as
    /// absent so the session still starts from the catalog defaults.
    async fn load_layout(&self) -> Result<Option<LayoutSnapshot>, StoreError> {
        let Some(blob) = self.read_layout_blob().await? else {
            return Ok(None);
        };
        Ok(parse_layout_blob(&blob))
    }

    async fn fetch_roadmap(&self) -> Result<(Vec<Topic>, Option<LayoutSnapshot>), StoreError> {
        let topics = self.list_topics().await?;
        let layout = self.load_layout().await?;
        Ok((topics, layout))
    }
}

pub(crate) fn parse_layout_blob(blob: &str) -> Option<LayoutSnapshot> {
    if blob.trim().is_empty() {
        return None;
    }
    match normalize_import(blob) {
        Ok(snapshot) => Some(snapshot),
        Err(err) => {
            warn!("ignoring unreadable saved layout: {err}");
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishReceipt {
    pub id: String,
    pub url: String,
    pub expires_at: DateTime<Utc>,
    pub expires_in_days: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedRoadmap {
    #[serde(default)]
    pub id: String,
    pub title: String,
    pub nodes: Vec<Topic>,
    #[serde(flatten)]
    pub layout: LayoutSnapshot,
    pub created_at: DateTime<Utc>,
}

impl PublishedRoadmap {
    pub fn into_parts(self) -> (Vec<Topic>, LayoutSnapshot) {
        (self.nodes, self.layout)
    }
}

#[allow(async_fn_in_trait)]
pub trait PublishStore {
    /// Stores topics and layout under a fresh short id. `title` defaults to
    /// "Roadmap"; an empty topic list is rejected.
    async fn publish(
        &self,
        title: Option<&str>,
        topics: &[Topic],
        layout: &LayoutSnapshot,
    ) -> Result<PublishReceipt, StoreError>;

    async fn fetch_published(&self, id: &str) -> Result<PublishedRoadmap, StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryContentStore {
    topics: Mutex<Vec<Topic>>,
    layout_chunks: Mutex<Option<Vec<String>>>,
    layout_writes: AtomicUsize,
}

impl MemoryContentStore {
    pub fn new(topics: Vec<Topic>) -> Self {
        Self {
            topics: Mutex::new(topics),
            layout_chunks: Mutex::new(Some(Vec::new())),
            layout_writes: AtomicUsize::new(0),
        }
    }

    pub fn without_layout_record(topics: Vec<Topic>) -> Self {
        Self {
            topics: Mutex::new(topics),
            ..Self::default()
        }
    }

    pub fn layout_writes(&self) -> usize {
        self.layout_writes.load(Ordering::SeqCst)
    }

    pub fn layout_chunks(&self) -> Option<Vec<String>> {
        lock(&self.layout_chunks).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ContentStore for MemoryContentStore {
    async fn list_topics(&self) -> Result<Vec<Topic>, StoreError> {
        let mut topics: Vec<Topic> = lock(&self.topics)
            .iter()
            .filter(|topic| topic.id != LAYOUT_RECORD_ID)
            .cloned()
            .collect();
        sort_topics(&mut topics);
        Ok(topics)
    }

    async fn update_topic(&self, source_record_id: &str, update: &TopicUpdate) -> Result<(), StoreError> {
        let mut topics = lock(&self.topics);
        let topic = topics
            .iter_mut()
            .find(|topic| topic.source_record_id.as_deref() == Some(source_record_id))
            .ok_or_else(|| StoreError::NotFound(format!("record '{source_record_id}'")))?;
        if let Some(name) = &update.name {
            topic.name = name.clone();
        }
        if let Some(link) = &update.link {
            topic.link = link.trim().to_string();
        }
        Ok(())
    }

    async fn read_layout_blob(&self) -> Result<Option<String>, StoreError> {
        Ok(lock(&self.layout_chunks)
            .as_ref()
            .map(join_chunks)
            .filter(|blob| !blob.is_empty()))
    }

    async fn write_layout_blob(&self, json: &str) -> Result<(), StoreError> {
        let mut chunks = lock(&self.layout_chunks);
        let Some(chunks) = chunks.as_mut() else {
            return Err(StoreError::NotFound(format!(
                "layout record '{LAYOUT_RECORD_ID}' does not exist"
            )));
        };
        *chunks = chunk_text(json, LAYOUT_CHUNK_CHARS);
        self.layout_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic(id: &str, order: f64) -> Topic {
        let mut topic = Topic::new(id, id);
        topic.order = order;
        topic.source_record_id = Some(format!("page-{id}"));
        topic
    }

    #[tokio::test]
    async fn memory_store_sorts_and_hides_the_sentinel() {
        let store = MemoryContentStore::new(vec![topic("b", 2.0), topic(LAYOUT_RECORD_ID, 0.0), topic("a", 1.0)]);
        let ids: Vec<String> = store.list_topics().await.unwrap().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn layout_blob_is_chunked_and_reassembled() {
        let store = MemoryContentStore::new(Vec::new());
        assert_eq!(store.load_layout().await.unwrap(), None);

        let mut snapshot = LayoutSnapshot::default();
        for i in 0..200 {
            snapshot
                .positions
                .insert(format!("node-with-a-long-identifier-{i}"), Point::new(i as f64, 1.0));
        }
        let json = snapshot.to_json().unwrap();
        assert!(json.len() > LAYOUT_CHUNK_CHARS);

        store.write_layout_blob(&json).await.unwrap();
        assert!(store.layout_chunks().unwrap().len() > 1);
        assert_eq!(store.load_layout().await.unwrap(), Some(snapshot));
    }

    #[tokio::test]
    async fn missing_sentinel_is_not_created() {
        let store = MemoryContentStore::without_layout_record(Vec::new());
        let err = store.write_layout_blob("{}").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.layout_chunks(), None);
    }

    #[tokio::test]
    async fn unreadable_blob_reads_as_absent() {
        let store = MemoryContentStore::new(Vec::new());
        store.write_layout_blob("{not json").await.unwrap();
        assert_eq!(store.load_layout().await.unwrap(), None);
    }

    #[tokio::test]
    async fn updates_address_the_source_record() {
        let store = MemoryContentStore::new(vec![topic("a", 1.0)]);
        let update = TopicUpdate {
            name: Some("Renamed".into()),
            link: Some(String::new()),
        };
        store.update_topic("page-a", &update).await.unwrap();
        let topics = store.list_topics().await.unwrap();
        assert_eq!(topics[0].name, "Renamed");
        assert!(!topics[0].has_link());
        assert!(store.update_topic("page-z", &update).await.unwrap_err().is_not_found());
    }
}
