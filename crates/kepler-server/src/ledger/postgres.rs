//! PostgreSQL-backed job ledger

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kepler_common::AccessLevel;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use super::JobLedger;
use crate::db::{DbError, DbResult};
use crate::models::{Item, Job, JobStatus};

const ITEM_COLUMNS: &str =
    "id, uri, access, layer_id, handle, tiff_url, record, created_at";
const JOB_COLUMNS: &str = "id, item_id, status, import_url, error_message, time";

#[derive(Debug, sqlx::FromRow)]
struct ItemRow {
    id: Uuid,
    uri: String,
    access: String,
    layer_id: Option<String>,
    handle: Option<String>,
    tiff_url: Option<String>,
    record: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ItemRow> for Item {
    type Error = DbError;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        let access = row
            .access
            .parse::<AccessLevel>()
            .map_err(|e| DbError::Corrupt(format!("item {}: {}", row.id, e)))?;
        Ok(Item {
            id: row.id,
            uri: row.uri,
            access,
            layer_id: row.layer_id,
            handle: row.handle,
            tiff_url: row.tiff_url,
            record: row.record,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    item_id: Uuid,
    status: String,
    import_url: Option<String>,
    error_message: Option<String>,
    time: DateTime<Utc>,
}

impl TryFrom<JobRow> for Job {
    type Error = DbError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<JobStatus>()
            .map_err(|e| DbError::Corrupt(format!("job {}: {}", row.id, e)))?;
        Ok(Job {
            id: row.id,
            item_id: row.item_id,
            status,
            import_url: row.import_url,
            error_message: row.error_message,
            time: row.time,
        })
    }
}

fn into_jobs(rows: Vec<JobRow>) -> DbResult<Vec<Job>> {
    rows.into_iter().map(Job::try_from).collect()
}

/// A [`JobLedger`] over the `items` and `jobs` tables.
#[derive(Debug, Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn set_item_column(
        &self,
        id: Uuid,
        column: &'static str,
        value: &str,
    ) -> DbResult<()> {
        let sql = format!("UPDATE items SET {} = $2 WHERE id = $1", column);
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(value)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Item", id));
        }
        debug!(item_id = %id, column, "Updated item");
        Ok(())
    }
}

#[async_trait]
impl JobLedger for PgLedger {
    async fn get_or_create_item(&self, uri: &str) -> DbResult<Item> {
        // The no-op update makes RETURNING yield the existing row on conflict
        let sql = format!(
            r#"
            INSERT INTO items (id, uri, access, created_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (uri) DO UPDATE SET uri = EXCLUDED.uri
            RETURNING {}
            "#,
            ITEM_COLUMNS
        );
        let row = sqlx::query_as::<_, ItemRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(uri)
            .bind(AccessLevel::default().as_str())
            .fetch_one(&self.pool)
            .await?;
        Item::try_from(row)
    }

    async fn get_item(&self, id: Uuid) -> DbResult<Item> {
        let sql = format!("SELECT {} FROM items WHERE id = $1", ITEM_COLUMNS);
        let row = sqlx::query_as::<_, ItemRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Item", id))?;
        Item::try_from(row)
    }

    async fn find_item_by_uri(&self, uri: &str) -> DbResult<Option<Item>> {
        let sql = format!("SELECT {} FROM items WHERE uri = $1", ITEM_COLUMNS);
        sqlx::query_as::<_, ItemRow>(&sql)
            .bind(uri)
            .fetch_optional(&self.pool)
            .await?
            .map(Item::try_from)
            .transpose()
    }

    async fn set_item_access(&self, id: Uuid, access: AccessLevel) -> DbResult<()> {
        self.set_item_column(id, "access", access.as_str()).await
    }

    async fn set_item_layer_id(&self, id: Uuid, layer_id: &str) -> DbResult<()> {
        self.set_item_column(id, "layer_id", layer_id).await
    }

    async fn set_item_handle(&self, id: Uuid, handle: &str) -> DbResult<String> {
        sqlx::query("UPDATE items SET handle = $2 WHERE id = $1 AND handle IS NULL")
            .bind(id)
            .bind(handle)
            .execute(&self.pool)
            .await?;

        let stored: Option<Option<String>> =
            sqlx::query_scalar("SELECT handle FROM items WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        stored
            .ok_or_else(|| DbError::not_found("Item", id))?
            .ok_or_else(|| DbError::Corrupt(format!("item {} has no handle after update", id)))
    }

    async fn set_item_tiff_url(&self, id: Uuid, tiff_url: &str) -> DbResult<()> {
        self.set_item_column(id, "tiff_url", tiff_url).await
    }

    async fn set_item_record(&self, id: Uuid, record: &str) -> DbResult<()> {
        self.set_item_column(id, "record", record).await
    }

    async fn insert_job(&self, job: &Job) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs (id, item_id, status, import_url, error_message, time)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(job.id)
        .bind(job.item_id)
        .bind(job.status.as_str())
        .bind(&job.import_url)
        .bind(&job.error_message)
        .bind(job.time)
        .execute(&self.pool)
        .await?;

        debug!(job_id = %job.id, item_id = %job.item_id, "Inserted job");
        Ok(())
    }

    async fn update_job(&self, job: &Job) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = $2, import_url = $3, error_message = $4
            WHERE id = $1 AND status NOT IN ('COMPLETED', 'FAILED')
            "#,
        )
        .bind(job.id)
        .bind(job.status.as_str())
        .bind(&job.import_url)
        .bind(&job.error_message)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            debug!(job_id = %job.id, status = %job.status, "Updated job");
            return Ok(true);
        }

        // Distinguish a missing job from one that is already terminal
        self.get_job(job.id).await?;
        Ok(false)
    }

    async fn get_job(&self, id: Uuid) -> DbResult<Job> {
        let sql = format!("SELECT {} FROM jobs WHERE id = $1", JOB_COLUMNS);
        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Job", id))?;
        Job::try_from(row)
    }

    async fn jobs_for_item(&self, item_id: Uuid) -> DbResult<Vec<Job>> {
        let sql = format!(
            "SELECT {} FROM jobs WHERE item_id = $1 ORDER BY time DESC, seq DESC",
            JOB_COLUMNS
        );
        let rows = sqlx::query_as::<_, JobRow>(&sql)
            .bind(item_id)
            .fetch_all(&self.pool)
            .await?;
        into_jobs(rows)
    }

    async fn latest_job_for_item(&self, item_id: Uuid) -> DbResult<Option<Job>> {
        let sql = format!(
            "SELECT {} FROM jobs WHERE item_id = $1 ORDER BY time DESC, seq DESC LIMIT 1",
            JOB_COLUMNS
        );
        sqlx::query_as::<_, JobRow>(&sql)
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Job::try_from)
            .transpose()
    }

    async fn latest_pending_jobs(&self) -> DbResult<Vec<Job>> {
        let sql = format!(
            r#"
            SELECT {cols} FROM (
                SELECT DISTINCT ON (item_id) {cols}, seq
                FROM jobs
                ORDER BY item_id, time DESC, seq DESC
            ) latest
            WHERE status = 'PENDING'
            ORDER BY time DESC, seq DESC
            "#,
            cols = JOB_COLUMNS
        );
        let rows = sqlx::query_as::<_, JobRow>(&sql)
            .fetch_all(&self.pool)
            .await?;

        debug!(count = rows.len(), "Loaded pending jobs");
        into_jobs(rows)
    }
}
