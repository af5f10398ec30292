//! REST client for the hosted diary backend.
//!
//! Talks to a Supabase-style API: a PostgREST table (`diary_entries`)
//! scoped by `user_id`, plus object storage for entry images. The backend
//! is trusted to reject cross-owner access; every request still carries
//! the owner filter so a misconfigured key cannot read another user's
//! rows by accident.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use super::error::RemoteError;
use crate::models::{DiaryEntry, Mood};

const ENTRIES_TABLE: &str = "diary_entries";
const HEALTH_TIMEOUT_SECS: u64 = 5;
const MAX_ERROR_BODY_CHARS: usize = 512;

/// An entry row as the backend returns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub content: String,
    pub mood: Option<Mood>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub date: NaiveDate,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl RemoteEntry {
    /// Last-known-modification time. The backend conflates "created" and
    /// "last modified" for rows that were never updated.
    pub fn last_modified(&self) -> DateTime<Utc> {
        self.updated_at.unwrap_or(self.created_at)
    }
}

#[derive(Serialize)]
struct EntryPayload<'a> {
    user_id: Uuid,
    title: &'a str,
    content: &'a str,
    mood: Option<Mood>,
    tags: &'a [String],
    date: NaiveDate,
    image: Option<&'a str>,
    updated_at: DateTime<Utc>,
}

impl<'a> EntryPayload<'a> {
    fn from_entry(entry: &'a DiaryEntry, owner_id: Uuid) -> Self {
        Self {
            user_id: owner_id,
            title: &entry.title,
            content: &entry.content,
            mood: entry.mood,
            tags: &entry.tags,
            date: entry.date,
            image: entry.image.as_deref(),
            updated_at: entry.updated_at,
        }
    }
}

/// Seam between the data service and the network.
///
/// The production implementation is [`RemoteClient`]; tests drive the
/// service with an in-memory fake.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Creates an entry remotely; returns the backend-assigned id.
    async fn create_entry(&self, entry: &DiaryEntry, owner_id: Uuid) -> Result<Uuid, RemoteError>;

    /// Fetches all entries for an owner.
    async fn fetch_entries(&self, owner_id: Uuid) -> Result<Vec<RemoteEntry>, RemoteError>;

    /// Updates an existing remote entry.
    async fn update_entry(
        &self,
        entry: &DiaryEntry,
        owner_id: Uuid,
        remote_id: Uuid,
    ) -> Result<(), RemoteError>;

    /// Deletes a remote entry.
    async fn delete_entry(&self, remote_id: Uuid, owner_id: Uuid) -> Result<(), RemoteError>;

    /// Uploads an image to object storage; returns its public URL.
    async fn upload_image(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        owner_id: Uuid,
    ) -> Result<String, RemoteError>;

    /// Deletes an uploaded image by its public URL.
    async fn delete_image(&self, url: &str) -> Result<(), RemoteError>;

    /// Quick reachability probe with a short timeout.
    async fn check_health(&self) -> bool;
}

/// Client for the hosted diary backend.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    bucket: String,
}

impl RemoteClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            bucket: bucket.into(),
        }
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(key) = HeaderValue::from_str(&self.api_key) {
            headers.insert("apikey", key);
        }
        if let Ok(bearer) = HeaderValue::from_str(&format!("Bearer {}", self.api_key)) {
            headers.insert(AUTHORIZATION, bearer);
        }
        headers
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, ENTRIES_TABLE)
    }

    fn storage_object_url(&self, object_path: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url, self.bucket, object_path
        )
    }

    fn public_image_url(&self, object_path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.bucket, object_path
        )
    }

    /// Extracts the object path from a public storage URL, or None when
    /// the URL does not belong to this bucket.
    fn object_path_from_url(&self, url: &str) -> Option<String> {
        let prefix = format!(
            "{}/storage/v1/object/public/{}/",
            self.base_url, self.bucket
        );
        url.strip_prefix(&prefix).map(|path| path.to_string())
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY_CHARS {
            body.truncate(MAX_ERROR_BODY_CHARS);
            body.push_str("...");
        }
        Err(RemoteError::api(status.as_u16(), body))
    }
}

#[async_trait]
impl RemoteStore for RemoteClient {
    async fn create_entry(&self, entry: &DiaryEntry, owner_id: Uuid) -> Result<Uuid, RemoteError> {
        // TODO: send the local entry id as a client-generated idempotency
        // key once the backend accepts one; a retried create whose success
        // response was lost can currently duplicate the remote record.
        let response = self
            .http
            .post(self.table_url())
            .headers(self.headers())
            .header("Prefer", "return=representation")
            .json(&[EntryPayload::from_entry(entry, owner_id)])
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        let rows: Vec<RemoteEntry> = response.json().await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| RemoteError::InvalidResponse("insert returned no rows".to_string()))?;

        debug!(remote_id = %row.id, "created remote entry");
        Ok(row.id)
    }

    async fn fetch_entries(&self, owner_id: Uuid) -> Result<Vec<RemoteEntry>, RemoteError> {
        let response = self
            .http
            .get(self.table_url())
            .headers(self.headers())
            .query(&[
                ("select", "*".to_string()),
                ("user_id", format!("eq.{}", owner_id)),
                ("order", "date.desc".to_string()),
            ])
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        let rows: Vec<RemoteEntry> = response.json().await?;
        debug!(count = rows.len(), "fetched remote entries");
        Ok(rows)
    }

    async fn update_entry(
        &self,
        entry: &DiaryEntry,
        owner_id: Uuid,
        remote_id: Uuid,
    ) -> Result<(), RemoteError> {
        let response = self
            .http
            .patch(self.table_url())
            .headers(self.headers())
            .query(&[
                ("id", format!("eq.{}", remote_id)),
                ("user_id", format!("eq.{}", owner_id)),
            ])
            .json(&EntryPayload::from_entry(entry, owner_id))
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn delete_entry(&self, remote_id: Uuid, owner_id: Uuid) -> Result<(), RemoteError> {
        let response = self
            .http
            .delete(self.table_url())
            .headers(self.headers())
            .query(&[
                ("id", format!("eq.{}", remote_id)),
                ("user_id", format!("eq.{}", owner_id)),
            ])
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn upload_image(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        owner_id: Uuid,
    ) -> Result<String, RemoteError> {
        let ext = file_name.rsplit('.').next().unwrap_or("bin");
        let object_path = format!("{}/{}.{}", owner_id, Utc::now().timestamp_millis(), ext);

        let response = self
            .http
            .post(self.storage_object_url(&object_path))
            .headers(self.headers())
            .header(CONTENT_TYPE, "application/octet-stream")
            .header("cache-control", "3600")
            .body(bytes)
            .send()
            .await?;
        Self::check_status(response).await?;

        Ok(self.public_image_url(&object_path))
    }

    async fn delete_image(&self, url: &str) -> Result<(), RemoteError> {
        let object_path = self.object_path_from_url(url).ok_or_else(|| {
            RemoteError::InvalidResponse(format!("not a storage URL for this bucket: {}", url))
        })?;

        let response = self
            .http
            .delete(self.storage_object_url(&object_path))
            .headers(self.headers())
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn check_health(&self) -> bool {
        let result = self
            .http
            .get(format!("{}/rest/v1/", self.base_url))
            .headers(self.headers())
            .timeout(Duration::from_secs(HEALTH_TIMEOUT_SECS))
            .send()
            .await;

        match result {
            Ok(response) => !response.status().is_server_error(),
            Err(_) => false,
        }
    }
}
