//! Ticket spam metadata repository

use async_trait::async_trait;
use chrono::Utc;
use spamblock_common::config::DatabaseConfig;
use spamblock_common::types::TicketId;
use spamblock_common::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::db::DatabasePool;
use crate::models::{TicketSpamMeta, UpsertTicketSpamMeta};

/// Ticket spam metadata repository trait
#[async_trait]
pub trait TicketSpamMetaRepository: Send + Sync {
    /// Insert or replace the row for a ticket
    async fn upsert(&self, input: UpsertTicketSpamMeta) -> Result<TicketSpamMeta>;

    /// Look up the row for a ticket
    async fn lookup(&self, ticket_id: TicketId) -> Result<Option<TicketSpamMeta>>;

    /// Flag a ticket as spam, creating the row if needed
    async fn mark_spam(&self, ticket_id: TicketId, email: &str) -> Result<TicketSpamMeta>;

    /// Check backend health
    async fn health_check(&self) -> Result<()>;
}

fn validate_ticket_id(ticket_id: TicketId) -> Result<()> {
    if ticket_id <= 0 {
        return Err(Error::Validation(format!(
            "Invalid ticket id: {}",
            ticket_id
        )));
    }
    Ok(())
}

/// Database ticket spam metadata repository
pub struct DbTicketSpamMetaRepository {
    pool: DatabasePool,
}

impl DbTicketSpamMetaRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TicketSpamMetaRepository for DbTicketSpamMetaRepository {
    async fn upsert(&self, input: UpsertTicketSpamMeta) -> Result<TicketSpamMeta> {
        validate_ticket_id(input.ticket_id)?;

        sqlx::query_as::<_, TicketSpamMeta>(
            r#"
            INSERT INTO ticket_spam_meta
                (ticket_id, email, is_spam, postmark_score, sfs_confidence, spf_result, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW())
            ON CONFLICT (ticket_id) DO UPDATE SET
                email = EXCLUDED.email,
                is_spam = EXCLUDED.is_spam,
                postmark_score = EXCLUDED.postmark_score,
                sfs_confidence = EXCLUDED.sfs_confidence,
                spf_result = EXCLUDED.spf_result,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(input.ticket_id)
        .bind(&input.email)
        .bind(input.is_spam)
        .bind(input.postmark_score)
        .bind(input.sfs_confidence)
        .bind(&input.spf_result)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn lookup(&self, ticket_id: TicketId) -> Result<Option<TicketSpamMeta>> {
        if ticket_id <= 0 {
            return Ok(None);
        }

        sqlx::query_as::<_, TicketSpamMeta>("SELECT * FROM ticket_spam_meta WHERE ticket_id = $1")
            .bind(ticket_id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn mark_spam(&self, ticket_id: TicketId, email: &str) -> Result<TicketSpamMeta> {
        validate_ticket_id(ticket_id)?;

        sqlx::query_as::<_, TicketSpamMeta>(
            r#"
            INSERT INTO ticket_spam_meta (ticket_id, email, is_spam, created_at, updated_at)
            VALUES ($1, $2, TRUE, NOW(), NOW())
            ON CONFLICT (ticket_id) DO UPDATE SET
                is_spam = TRUE,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(ticket_id)
        .bind(email)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn health_check(&self) -> Result<()> {
        self.pool.health_check().await
    }
}

/// In-memory ticket spam metadata repository
#[derive(Default)]
pub struct MemoryTicketSpamMetaRepository {
    rows: RwLock<HashMap<TicketId, TicketSpamMeta>>,
}

impl MemoryTicketSpamMetaRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TicketSpamMetaRepository for MemoryTicketSpamMetaRepository {
    async fn upsert(&self, input: UpsertTicketSpamMeta) -> Result<TicketSpamMeta> {
        validate_ticket_id(input.ticket_id)?;

        let now = Utc::now();
        let mut rows = self.rows.write().await;
        let created_at = rows
            .get(&input.ticket_id)
            .map(|existing| existing.created_at)
            .unwrap_or(now);

        let row = TicketSpamMeta {
            ticket_id: input.ticket_id,
            email: input.email,
            is_spam: input.is_spam,
            postmark_score: input.postmark_score,
            sfs_confidence: input.sfs_confidence,
            spf_result: input.spf_result,
            created_at,
            updated_at: now,
        };
        rows.insert(row.ticket_id, row.clone());

        debug!(ticket_id = row.ticket_id, "Stored ticket spam metadata");
        Ok(row)
    }

    async fn lookup(&self, ticket_id: TicketId) -> Result<Option<TicketSpamMeta>> {
        Ok(self.rows.read().await.get(&ticket_id).cloned())
    }

    async fn mark_spam(&self, ticket_id: TicketId, email: &str) -> Result<TicketSpamMeta> {
        validate_ticket_id(ticket_id)?;

        let now = Utc::now();
        let mut rows = self.rows.write().await;
        let row = rows.entry(ticket_id).or_insert_with(|| TicketSpamMeta {
            ticket_id,
            email: email.to_string(),
            is_spam: true,
            postmark_score: None,
            sfs_confidence: None,
            spf_result: None,
            created_at: now,
            updated_at: now,
        });
        row.is_spam = true;
        row.updated_at = now;

        Ok(row.clone())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// Create the repository selected by configuration
pub async fn create_repository(
    config: &DatabaseConfig,
) -> Result<Arc<dyn TicketSpamMetaRepository>> {
    match config.backend.as_str() {
        "postgres" => {
            let pool = DatabasePool::new(config).await?;
            pool.migrate().await?;
            Ok(Arc::new(DbTicketSpamMetaRepository::new(pool)))
        }
        "memory" => {
            info!("Using in-memory ticket spam metadata storage");
            Ok(Arc::new(MemoryTicketSpamMetaRepository::new()))
        }
        other => Err(Error::Config(format!(
            "Unsupported database backend: {}",
            other
        ))),
    }
}
