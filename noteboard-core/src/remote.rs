//! Remote document API client
//!
//! Thin client over a hosted document API (Atlas Data API style): every
//! action is a JSON `POST {base_url}/action/{action}` authenticated with an
//! `api-key` header. It gives the board a durable path over plain HTTPS when
//! the database's own wire protocol is blocked.
//!
//! The client is active only when both base URL and API key are set.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::config::RemoteConfig;
use crate::error::{ConnectionError, TierError, TierResult};
use crate::model::{Note, NoteDraft, NoteId, NoteKind, DEFAULT_COORDINATE};
use crate::tier::{DurableTier, TierKind, UpdateStatus};

/// Error bodies are cut to this many bytes before they reach a log line
const MAX_ERROR_BODY: usize = 500;

/// Counts reported by `updateOne`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCounts {
    #[serde(default)]
    pub matched_count: u64,
    #[serde(default)]
    pub modified_count: u64,
}

#[derive(Debug, Deserialize)]
struct FindResponse {
    #[serde(default)]
    documents: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct InsertResponse {
    #[serde(rename = "insertedId")]
    inserted_id: Value,
}

pub struct RemoteDocumentClient {
    client: Client,
    config: RemoteConfig,
    timeout: Duration,
}

impl RemoteDocumentClient {
    /// Build a client whose requests are bounded by `timeout` and whose
    /// connection setup is bounded by `connect_timeout`.
    pub fn new(
        config: RemoteConfig,
        connect_timeout: Duration,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            config,
            timeout,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    /// Every document in the collection, ids unwrapped to plain strings.
    pub async fn list_all(&self) -> TierResult<Vec<Value>> {
        self.find(json!({})).await
    }

    pub async fn find(&self, filter: Value) -> TierResult<Vec<Value>> {
        let response: FindResponse = self.send("find", json!({ "filter": filter })).await?;
        Ok(response
            .documents
            .into_iter()
            .map(|mut doc| {
                normalize_id(&mut doc);
                doc
            })
            .collect())
    }

    /// Submit a document; returns the id the backend assigned.
    pub async fn insert_one(&self, document: Value) -> TierResult<NoteId> {
        let response: InsertResponse = self
            .send("insertOne", json!({ "document": document }))
            .await?;
        unwrap_id(&response.inserted_id)
            .map(NoteId::new)
            .ok_or_else(|| TierError::Backend("insertOne returned no usable id".into()))
    }

    pub async fn update_one(&self, filter: Value, update: Value) -> TierResult<UpdateCounts> {
        self.send("updateOne", json!({ "filter": filter, "update": update }))
            .await
    }

    async fn send<T>(&self, action: &'static str, body: Value) -> TierResult<T>
    where
        T: DeserializeOwned,
    {
        let (base_url, api_key) = self
            .config
            .credentials()
            .ok_or(TierError::Unavailable("remote document API not configured"))?;

        let url = format!("{}/action/{}", base_url.trim_end_matches('/'), action);
        let payload = self.payload(body);

        debug!(action, "remote document API request");
        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("api-key", api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| self.request_error(action, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(TierError::Backend(format!(
                "Data API {} failed ({}): {}",
                action,
                status,
                truncate_body(&error_text)
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| self.request_error(action, e))
    }

    /// Scope a request body to the configured data source and collection.
    fn payload(&self, body: Value) -> Value {
        let mut payload = Map::new();
        payload.insert("dataSource".into(), json!(self.config.data_source));
        payload.insert("database".into(), json!(self.config.database));
        payload.insert("collection".into(), json!(self.config.collection));
        if let Value::Object(fields) = body {
            payload.extend(fields);
        }
        Value::Object(payload)
    }

    fn request_error(&self, action: &'static str, e: reqwest::Error) -> TierError {
        if e.is_timeout() {
            TierError::Timeout {
                operation: action,
                elapsed: self.timeout,
            }
        } else if e.is_connect() {
            TierError::Connection(ConnectionError::new(1, e.to_string()))
        } else {
            TierError::Backend(format!("Data API {}: {}", action, e))
        }
    }
}

#[async_trait]
impl DurableTier for RemoteDocumentClient {
    fn kind(&self) -> TierKind {
        TierKind::Remote
    }

    fn is_configured(&self) -> bool {
        RemoteDocumentClient::is_configured(self)
    }

    async fn list(&self) -> TierResult<Vec<Note>> {
        let docs = self.list_all().await?;
        Ok(docs.iter().filter_map(note_from_document).collect())
    }

    async fn latest_with_text(&self, text: &str) -> TierResult<Option<Note>> {
        let docs = self.find(json!({ "note": text })).await?;
        Ok(docs
            .iter()
            .filter_map(note_from_document)
            .max_by_key(|note| note.created_at))
    }

    async fn insert(&self, draft: &NoteDraft) -> TierResult<Note> {
        let created_at = Utc::now();
        let id = self.insert_one(document_for(draft, created_at)).await?;
        Ok(draft.clone().into_note(id, created_at))
    }

    async fn update_position(&self, id: &NoteId, x: f64, y: f64) -> TierResult<UpdateStatus> {
        let counts = self
            .update_one(id_filter(id.as_str()), json!({ "$set": { "x": x, "y": y } }))
            .await?;
        Ok(if counts.matched_count == 0 {
            debug!(id = %id, "no remote document with this id");
            UpdateStatus::Missed
        } else {
            UpdateStatus::Applied
        })
    }
}

/// Replace a `{"$oid": "..."}` envelope in `_id` with the bare string.
pub fn normalize_id(doc: &mut Value) {
    if let Some(id) = doc.get_mut("_id") {
        if let Some(plain) = unwrap_id(id) {
            *id = Value::String(plain);
        }
    }
}

fn unwrap_id(id: &Value) -> Option<String> {
    match id {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(map) => map.get("$oid").and_then(Value::as_str).map(str::to_owned),
        _ => None,
    }
}

fn is_object_id(id: &str) -> bool {
    id.len() == 24 && id.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Filter matching `id` the way it was stored: 24-hex ids as typed
/// ObjectIds, anything else as a plain string `_id`.
fn id_filter(id: &str) -> Value {
    if is_object_id(id) {
        json!({ "_id": { "$oid": id } })
    } else {
        json!({ "_id": id })
    }
}

/// Build the stored document for a draft.
pub fn document_for(draft: &NoteDraft, created_at: DateTime<Utc>) -> Value {
    json!({
        "note": draft.text,
        "type": draft.kind.as_str(),
        "x": draft.x,
        "y": draft.y,
        "createdAt": { "$date": created_at.to_rfc3339() },
    })
}

/// Convert a normalized document into a note, skipping unusable ones.
pub fn note_from_document(doc: &Value) -> Option<Note> {
    let id = doc.get("_id").and_then(unwrap_id);
    let text = doc.get("note").and_then(Value::as_str).filter(|t| !t.is_empty());
    let (Some(id), Some(text)) = (id, text) else {
        warn!("skipping malformed remote document");
        return None;
    };

    Some(Note {
        id: NoteId::new(id),
        text: text.to_owned(),
        kind: NoteKind::from_input(doc.get("type").and_then(Value::as_str)),
        x: coordinate(doc.get("x")),
        y: coordinate(doc.get("y")),
        created_at: doc
            .get("createdAt")
            .and_then(parse_date)
            .unwrap_or(DateTime::UNIX_EPOCH),
    })
}

fn coordinate(value: Option<&Value>) -> f64 {
    value
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite())
        .unwrap_or(DEFAULT_COORDINATE)
}

/// Accepts `"2024-..."`, `{"$date": "2024-..."}`, `{"$date": millis}` and
/// `{"$date": {"$numberLong": "millis"}}`.
fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        Value::Object(map) => {
            if let Some(inner) = map.get("$date") {
                parse_date(inner)
            } else {
                map.get("$numberLong")
                    .and_then(Value::as_str)
                    .and_then(|s| s.parse().ok())
                    .and_then(DateTime::from_timestamp_millis)
            }
        }
        _ => None,
    }
}

fn truncate_body(text: &str) -> String {
    if text.len() <= MAX_ERROR_BODY {
        return text.to_owned();
    }
    let mut end = MAX_ERROR_BODY;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
