use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::{DiaryEntry, EntryPatch, Mood};

/// Local store for diary entries.
///
/// Single-record operations only; callers get no cross-record transaction
/// guarantees beyond what one statement provides.
pub struct EntryRepository {
    pool: SqlitePool,
}

// Row type for database queries
#[derive(sqlx::FromRow)]
struct EntryRow {
    id: String,
    remote_id: Option<String>,
    title: String,
    content: String,
    mood: Option<String>,
    tags: String,
    date: String,
    image: Option<String>,
    created_at: String,
    updated_at: String,
    needs_sync: i64,
}

impl EntryRow {
    fn hydrate(self) -> Result<DiaryEntry, sqlx::Error> {
        let id = Uuid::parse_str(&self.id).map_err(decode_err)?;
        let remote_id = self
            .remote_id
            .as_deref()
            .map(Uuid::parse_str)
            .transpose()
            .map_err(decode_err)?;
        let mood = self
            .mood
            .as_deref()
            .map(|m| m.parse::<Mood>())
            .transpose()
            .map_err(|e| sqlx::Error::Decode(e.into()))?;
        let tags: Vec<String> = serde_json::from_str(&self.tags).map_err(decode_err)?;
        let date = NaiveDate::parse_from_str(&self.date, "%Y-%m-%d").map_err(decode_err)?;
        let created_at = parse_timestamp(&self.created_at)?;
        let updated_at = parse_timestamp(&self.updated_at)?;

        Ok(DiaryEntry {
            id,
            remote_id,
            title: self.title,
            content: self.content,
            mood,
            tags,
            date,
            image: self.image,
            created_at,
            updated_at,
            needs_sync: self.needs_sync != 0,
        })
    }
}

fn decode_err<E: std::error::Error + Send + Sync + 'static>(e: E) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(e))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(decode_err)
}

impl EntryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, entry: &DiaryEntry) -> Result<DiaryEntry, sqlx::Error> {
        let tags = serde_json::to_string(&entry.tags).unwrap_or_else(|_| "[]".to_string());

        sqlx::query(
            r#"
            INSERT INTO entries (id, remote_id, title, content, mood, tags, date, image, created_at, updated_at, needs_sync)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.remote_id.map(|id| id.to_string()))
        .bind(&entry.title)
        .bind(&entry.content)
        .bind(entry.mood.map(|m| m.to_string()))
        .bind(&tags)
        .bind(entry.date.format("%Y-%m-%d").to_string())
        .bind(&entry.image)
        .bind(entry.created_at.to_rfc3339())
        .bind(entry.updated_at.to_rfc3339())
        .bind(entry.needs_sync as i64)
        .execute(&self.pool)
        .await?;

        self.get_by_id(entry.id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<DiaryEntry>, sqlx::Error> {
        let row: Option<EntryRow> = sqlx::query_as("SELECT * FROM entries WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(EntryRow::hydrate).transpose()
    }

    pub async fn get_by_remote_id(&self, remote_id: Uuid) -> Result<Option<DiaryEntry>, sqlx::Error> {
        let row: Option<EntryRow> = sqlx::query_as("SELECT * FROM entries WHERE remote_id = ?")
            .bind(remote_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(EntryRow::hydrate).transpose()
    }

    /// Lists all entries, newest creation first.
    pub async fn list(&self) -> Result<Vec<DiaryEntry>, sqlx::Error> {
        let rows: Vec<EntryRow> =
            sqlx::query_as("SELECT * FROM entries ORDER BY created_at DESC, id DESC")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(EntryRow::hydrate).collect()
    }

    /// Merges a patch into the stored record. Returns false when no row
    /// with this id exists (the record may have been deleted in the
    /// meantime; callers treat that as a no-op).
    pub async fn update(&self, id: Uuid, patch: &EntryPatch) -> Result<bool, sqlx::Error> {
        let Some(mut entry) = self.get_by_id(id).await? else {
            return Ok(false);
        };
        patch.apply(&mut entry);

        let tags = serde_json::to_string(&entry.tags).unwrap_or_else(|_| "[]".to_string());

        let result = sqlx::query(
            r#"
            UPDATE entries
            SET remote_id = ?, title = ?, content = ?, mood = ?, tags = ?,
                date = ?, image = ?, updated_at = ?, needs_sync = ?
            WHERE id = ?
            "#,
        )
        .bind(entry.remote_id.map(|rid| rid.to_string()))
        .bind(&entry.title)
        .bind(&entry.content)
        .bind(entry.mood.map(|m| m.to_string()))
        .bind(&tags)
        .bind(entry.date.format("%Y-%m-%d").to_string())
        .bind(&entry.image)
        .bind(entry.updated_at.to_rfc3339())
        .bind(entry.needs_sync as i64)
        .bind(entry.id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Stamps the backend identifier onto a record and clears its sync flag.
    pub async fn mark_synced(&self, id: Uuid, remote_id: Uuid) -> Result<bool, sqlx::Error> {
        let patch = EntryPatch {
            remote_id: Some(Some(remote_id)),
            needs_sync: Some(false),
            ..Default::default()
        };
        self.update(id, &patch).await
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM entries WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
