//! Database tier: notes in PostgreSQL behind the connection cache
//!
//! Every operation first obtains the cached pool and confirms it answers a
//! readiness query; a failure at either step makes the tier unavailable for
//! this call only. Statements run under the socket timeout.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::debug;
use uuid::Uuid;

use super::cache::ConnectionCache;
use super::pool::PgConnector;
use crate::error::{TierError, TierResult};
use crate::model::{Note, NoteDraft, NoteId, NoteKind};
use crate::tier::{DurableTier, TierKind, UpdateStatus};

/// Note row from `board_notes`
#[derive(Debug, Clone, FromRow)]
struct NoteRow {
    id: Uuid,
    text: String,
    kind: String,
    x: f64,
    y: f64,
    created_at: DateTime<Utc>,
}

impl From<NoteRow> for Note {
    fn from(row: NoteRow) -> Self {
        Note {
            id: NoteId::new(row.id.to_string()),
            text: row.text,
            kind: NoteKind::from_input(Some(row.kind.as_str())),
            x: row.x,
            y: row.y,
            created_at: row.created_at,
        }
    }
}

pub struct DatabaseTier {
    cache: Arc<ConnectionCache<PgConnector>>,
    socket_timeout: Duration,
}

impl DatabaseTier {
    pub fn new(cache: Arc<ConnectionCache<PgConnector>>) -> Self {
        let socket_timeout = cache.connector().socket_timeout();
        Self {
            cache,
            socket_timeout,
        }
    }

    /// Cached pool, confirmed live by a readiness query.
    async fn live_pool(&self) -> TierResult<PgPool> {
        let pool = self.cache.get_connection().await?;
        self.ping(&pool).await?;
        Ok(pool)
    }

    async fn ping(&self, pool: &PgPool) -> TierResult<()> {
        self.bounded("readiness query", async {
            sqlx::query("SELECT 1").execute(pool).await.map(|_| ())
        })
        .await
    }

    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> TierResult<T>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.socket_timeout, fut).await {
            Ok(result) => result.map_err(TierError::from),
            Err(_) => Err(TierError::Timeout {
                operation,
                elapsed: self.socket_timeout,
            }),
        }
    }
}

#[async_trait]
impl DurableTier for DatabaseTier {
    fn kind(&self) -> TierKind {
        TierKind::Database
    }

    async fn list(&self) -> TierResult<Vec<Note>> {
        let pool = self.live_pool().await?;
        let rows: Vec<NoteRow> = self
            .bounded(
                "list notes",
                sqlx::query_as::<_, NoteRow>(
                    r#"
                    SELECT id, text, kind, x, y, created_at
                    FROM board_notes
                    ORDER BY created_at, id
                    "#,
                )
                .fetch_all(&pool),
            )
            .await?;
        Ok(rows.into_iter().map(Note::from).collect())
    }

    async fn latest_with_text(&self, text: &str) -> TierResult<Option<Note>> {
        let pool = self.live_pool().await?;
        let row: Option<NoteRow> = self
            .bounded(
                "find note by text",
                sqlx::query_as::<_, NoteRow>(
                    r#"
                    SELECT id, text, kind, x, y, created_at
                    FROM board_notes
                    WHERE text = $1
                    ORDER BY created_at DESC
                    LIMIT 1
                    "#,
                )
                .bind(text)
                .fetch_optional(&pool),
            )
            .await?;
        Ok(row.map(Note::from))
    }

    async fn insert(&self, draft: &NoteDraft) -> TierResult<Note> {
        let pool = self.live_pool().await?;
        let row: NoteRow = self
            .bounded(
                "insert note",
                sqlx::query_as::<_, NoteRow>(
                    r#"
                    INSERT INTO board_notes (text, kind, x, y)
                    VALUES ($1, $2, $3, $4)
                    RETURNING id, text, kind, x, y, created_at
                    "#,
                )
                .bind(&draft.text)
                .bind(draft.kind.as_str())
                .bind(draft.x)
                .bind(draft.y)
                .fetch_one(&pool),
            )
            .await?;
        Ok(row.into())
    }

    async fn update_position(&self, id: &NoteId, x: f64, y: f64) -> TierResult<UpdateStatus> {
        // Ids from other tiers can never match a UUID primary key.
        let Ok(uuid) = Uuid::parse_str(id.as_str()) else {
            debug!(id = %id, "not a database id");
            return Ok(UpdateStatus::Missed);
        };

        let pool = self.live_pool().await?;
        let result = self
            .bounded(
                "update note position",
                sqlx::query("UPDATE board_notes SET x = $2, y = $3 WHERE id = $1")
                    .bind(uuid)
                    .bind(x)
                    .bind(y)
                    .execute(&pool),
            )
            .await?;

        Ok(if result.rows_affected() == 0 {
            UpdateStatus::Missed
        } else {
            UpdateStatus::Applied
        })
    }

    async fn is_live(&self) -> bool {
        match self.cache.peek() {
            Some(pool) if !pool.is_closed() => self.ping(&pool).await.is_ok(),
            _ => false,
        }
    }
}
