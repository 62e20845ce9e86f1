use log::{debug, info};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{Map, Value, json};
use std::time::Duration;

use crate::store::parse_layout_blob;
use crate::*;

pub const DEFAULT_NOTION_API_URL: &str = "https://api.notion.com/v1";
pub const NOTION_VERSION: &str = "2022-06-28";
const REQUEST_TIMEOUT_SECS: u64 = 30;
const PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone)]
pub struct NotionConfig {
    pub token: String,
    pub database_id: String,
    pub api_url: String,
    pub timeout: Duration,
}

impl NotionConfig {
    /// Reads `NOTION_TOKEN`, `NOTION_DATABASE_ID` and the optional
    /// `NOTION_API_URL`.
    pub fn from_env() -> Result<Self, StoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, StoreError> {
        let required = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or_else(|| StoreError::Config(format!("{key} is not set")))
        };
        Ok(Self {
            token: required("NOTION_TOKEN")?,
            database_id: required("NOTION_DATABASE_ID")?,
            api_url: lookup("NOTION_API_URL")
                .filter(|url| !url.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_NOTION_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        })
    }
}

#[derive(Debug, Clone)]
pub struct NotionStore {
    client: Client,
    config: NotionConfig,
}

/// One row of the database, decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedPage {
    Topic(Topic),
    /// The sentinel record with its reassembled `StateJSON` text, if any.
    Layout { page_id: String, state_json: Option<String> },
}

impl NotionStore {
    pub fn new(config: NotionConfig) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| StoreError::Config(format!("failed to build HTTP client: {err}")))?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self, StoreError> {
        Self::new(NotionConfig::from_env()?)
    }

    pub fn config(&self) -> &NotionConfig {
        &self.config
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("Authorization", format!("Bearer {}", self.config.token))
            .header("Notion-Version", NOTION_VERSION)
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Value, StoreError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|err| StoreError::Transient(format!("{what}: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_for_status(
                status,
                format!("{what} failed with status {status}: {body}"),
            ));
        }

        response
            .json()
            .await
            .map_err(|err| StoreError::Serialization(format!("{what}: {err}")))
    }

    /// Runs a database query, following `next_cursor` until exhausted.
    async fn query_all(&self, body: Map<String, Value>) -> Result<Vec<Value>, StoreError> {
        let url = format!("{}/databases/{}/query", self.config.api_url, self.config.database_id);
        let mut pages = Vec::new();
        let mut body = body;
        body.insert("page_size".into(), json!(PAGE_SIZE));

        loop {
            let response = self
                .send(self.client.post(&url).json(&body), "database query")
                .await?;
            if let Some(results) = response.get("results").and_then(Value::as_array) {
                pages.extend(results.iter().cloned());
            }

            match next_page_body(&body, &response) {
                Some(next) => body = next,
                None => break,
            }
        }

        debug!("database query returned {} page(s)", pages.len());
        Ok(pages)
    }

    async fn find_layout_page(&self) -> Result<Value, StoreError> {
        let mut body = Map::new();
        body.insert(
            "filter".into(),
            json!({ "property": "NodeID", "rich_text": { "equals": LAYOUT_RECORD_ID } }),
        );
        self.query_all(body).await?.into_iter().next().ok_or_else(|| {
            StoreError::NotFound(format!(
                "no '{LAYOUT_RECORD_ID}' record; add a page with NodeID = \"{LAYOUT_RECORD_ID}\" to the database"
            ))
        })
    }

    async fn update_page(&self, page_id: &str, properties: Value) -> Result<(), StoreError> {
        let url = format!("{}/pages/{}", self.config.api_url, page_id);
        self.send(
            self.client.patch(&url).json(&json!({ "properties": properties })),
            "page update",
        )
        .await?;
        Ok(())
    }
}

fn error_for_status(status: StatusCode, message: String) -> StoreError {
    match status {
        StatusCode::NOT_FOUND => StoreError::NotFound(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::Config(message),
        StatusCode::BAD_REQUEST => StoreError::Validation(message),
        _ => StoreError::Transient(message),
    }
}

/// Query body for the following page, or `None` once `has_more` is false.
fn next_page_body(body: &Map<String, Value>, response: &Value) -> Option<Map<String, Value>> {
    if !response.get("has_more").and_then(Value::as_bool).unwrap_or(false) {
        return None;
    }
    let cursor = response.get("next_cursor").and_then(Value::as_str)?;
    let mut next = body.clone();
    next.insert("start_cursor".into(), json!(cursor));
    Some(next)
}

impl ContentStore for NotionStore {
    async fn list_topics(&self) -> Result<Vec<Topic>, StoreError> {
        Ok(self.fetch_roadmap().await?.0)
    }

    async fn update_topic(&self, source_record_id: &str, update: &TopicUpdate) -> Result<(), StoreError> {
        if update.is_empty() {
            return Ok(());
        }
        self.update_page(source_record_id, topic_update_properties(update))
            .await
    }

    async fn read_layout_blob(&self) -> Result<Option<String>, StoreError> {
        let page = match self.find_layout_page().await {
            Ok(page) => page,
            Err(StoreError::NotFound(_)) => return Ok(None),
            Err(err) => return Err(err),
        };
        match decode_page(&page) {
            DecodedPage::Layout { state_json, .. } => Ok(state_json),
            DecodedPage::Topic(_) => Ok(None),
        }
    }

    async fn write_layout_blob(&self, json: &str) -> Result<(), StoreError> {
        let page = self.find_layout_page().await?;
        let page_id = page
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| StoreError::Serialization("layout record has no id".into()))?;
        let key = page
            .get("properties")
            .and_then(Value::as_object)
            .and_then(|properties| find_property_key(properties, "StateJSON"))
            .ok_or_else(|| {
                StoreError::Validation(
                    "the database has no 'StateJSON' column; add one of type Text".into(),
                )
            })?
            .to_string();

        let chunks = chunk_text(json, LAYOUT_CHUNK_CHARS);
        let mut properties = Map::new();
        properties.insert(key, state_json_property(&chunks));
        self.update_page(page_id, Value::Object(properties)).await?;
        info!("saved layout: {} chars in {} chunk(s)", json.chars().count(), chunks.len());
        Ok(())
    }

    /// One query for both the topics and the sentinel record.
    async fn fetch_roadmap(&self) -> Result<(Vec<Topic>, Option<LayoutSnapshot>), StoreError> {
        let mut body = Map::new();
        body.insert(
            "sorts".into(),
            json!([{ "property": "Order", "direction": "ascending" }]),
        );

        let mut topics = Vec::new();
        let mut layout = None;
        for page in self.query_all(body).await? {
            match decode_page(&page) {
                DecodedPage::Topic(topic) => topics.push(topic),
                DecodedPage::Layout { state_json, .. } => {
                    layout = state_json.as_deref().and_then(parse_layout_blob);
                }
            }
        }
        sort_topics(&mut topics);
        Ok((topics, layout))
    }
}

/// Decodes a query result page. Property names match case-insensitively and
/// missing values fall back to defaults.
pub fn decode_page(page: &Value) -> DecodedPage {
    let page_id = page
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let empty = Map::new();
    let properties = page
        .get("properties")
        .and_then(Value::as_object)
        .unwrap_or(&empty);
    let property = |name: &str| find_property_key(properties, name).and_then(|key| properties.get(key));

    let node_id = property("NodeID")
        .and_then(rich_text)
        .unwrap_or_else(|| page_id.clone());

    if node_id == LAYOUT_RECORD_ID {
        return DecodedPage::Layout {
            page_id,
            state_json: property("StateJSON").and_then(rich_text),
        };
    }

    DecodedPage::Topic(Topic {
        id: node_id,
        name: property("Name")
            .and_then(title)
            .unwrap_or_else(|| "Untitled".to_string()),
        link: property("Link").and_then(url).unwrap_or_default(),
        group: property("Group")
            .and_then(select_name)
            .unwrap_or_else(|| "misc".to_string()),
        section: property("Section")
            .and_then(select_name)
            .map(|label| Section::from_label(&label))
            .unwrap_or_default(),
        order: property("Order").and_then(number).unwrap_or(0.0),
        source_record_id: Some(page_id).filter(|id| !id.is_empty()),
    })
}

fn find_property_key<'a>(properties: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
    properties
        .keys()
        .find(|key| key.eq_ignore_ascii_case(name))
        .map(String::as_str)
}

fn typed<'a>(property: &'a Value, kind: &str) -> Option<&'a Value> {
    (property.get("type").and_then(Value::as_str) == Some(kind))
        .then(|| property.get(kind))
        .flatten()
}

fn title(property: &Value) -> Option<String> {
    typed(property, "title")?
        .as_array()?
        .first()?
        .get("plain_text")?
        .as_str()
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

fn rich_text(property: &Value) -> Option<String> {
    let text: String = typed(property, "rich_text")?
        .as_array()?
        .iter()
        .filter_map(|part| part.get("plain_text").and_then(Value::as_str))
        .collect();
    (!text.is_empty()).then_some(text)
}

fn url(property: &Value) -> Option<String> {
    typed(property, "url")?
        .as_str()
        .filter(|link| !link.is_empty())
        .map(str::to_string)
}

fn select_name(property: &Value) -> Option<String> {
    typed(property, "select")?
        .get("name")?
        .as_str()
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

fn number(property: &Value) -> Option<f64> {
    typed(property, "number")?.as_f64()
}

/// `rich_text` payload carrying the chunks in order.
pub fn state_json_property(chunks: &[String]) -> Value {
    let parts: Vec<Value> = chunks
        .iter()
        .map(|chunk| json!({ "text": { "content": chunk } }))
        .collect();
    json!({ "rich_text": parts })
}

/// Page properties for a topic edit. An empty link is sent as `null`.
pub fn topic_update_properties(update: &TopicUpdate) -> Value {
    let mut properties = Map::new();
    if let Some(name) = &update.name {
        properties.insert("Name".into(), json!({ "title": [{ "text": { "content": name } }] }));
    }
    if let Some(link) = &update.link {
        let link = link.trim();
        let value = if link.is_empty() { Value::Null } else { json!(link) };
        properties.insert("Link".into(), json!({ "url": value }));
    }
    Value::Object(properties)
}
