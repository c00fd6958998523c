//! PostgreSQL ledger tests using testcontainers
//!
//! These tests require Docker. Run with:
//!
//! ```bash
//! cargo test --test ledger_pg_tests -- --ignored --nocapture
//! ```

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use kepler_common::AccessLevel;
use kepler_server::db::{self, DbError};
use kepler_server::ledger::{JobLedger, PgLedger};
use kepler_server::models::{Job, JobStatus};
use serial_test::serial;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use testcontainers::{core::IntoContainerPort, runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;

const ITEM_URI: &str = "c8921f5a-eac7-509b-bac5-bd1b2cb202dc";

// ============================================================================
// PostgreSQL Test Container
// ============================================================================

struct TestPostgres {
    _container: ContainerAsync<Postgres>,
    pool: PgPool,
}

impl TestPostgres {
    async fn start() -> Result<Self> {
        let container = Postgres::default()
            .with_tag("16-alpine")
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container.get_host().await?;
        let port = container.get_host_port_ipv4(5432.tcp()).await?;
        let url = format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .context("Failed to connect to PostgreSQL")?;
        db::run_migrations(&pool).await?;

        Ok(Self {
            _container: container,
            pool,
        })
    }

    fn ledger(&self) -> PgLedger {
        PgLedger::new(self.pool.clone())
    }
}

fn job_at(item_id: uuid::Uuid, status: JobStatus, minutes_ago: i64) -> Job {
    Job {
        status,
        time: Utc::now() - Duration::minutes(minutes_ago),
        ..Job::new(item_id)
    }
}

// ============================================================================
// Items
// ============================================================================

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_items_are_unique_by_uri() -> Result<()> {
    let pg = TestPostgres::start().await?;
    let ledger = pg.ledger();

    let first = ledger.get_or_create_item(ITEM_URI).await?;
    let second = ledger.get_or_create_item(ITEM_URI).await?;
    assert_eq!(first.id, second.id);
    assert_eq!(first.access, AccessLevel::Public);

    ledger.set_item_access(first.id, AccessLevel::Restricted).await?;
    ledger.set_item_layer_id(first.id, "mit:roads").await?;
    let item = ledger.find_item_by_uri(ITEM_URI).await?.expect("item");
    assert_eq!(item.access, AccessLevel::Restricted);
    assert_eq!(item.layer_id.as_deref(), Some("mit:roads"));

    assert!(ledger.find_item_by_uri("unknown").await?.is_none());
    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_handle_is_written_once() -> Result<()> {
    let pg = TestPostgres::start().await?;
    let ledger = pg.ledger();
    let item = ledger.get_or_create_item(ITEM_URI).await?;

    let stored = ledger.set_item_handle(item.id, "http://hdl.handle.net/1721.1/1").await?;
    assert_eq!(stored, "http://hdl.handle.net/1721.1/1");

    let stored = ledger.set_item_handle(item.id, "http://hdl.handle.net/1721.1/2").await?;
    assert_eq!(stored, "http://hdl.handle.net/1721.1/1");
    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_missing_item_is_not_found() -> Result<()> {
    let pg = TestPostgres::start().await?;
    let ledger = pg.ledger();

    let err = ledger.set_item_record(uuid::Uuid::new_v4(), "{}").await.unwrap_err();
    assert!(matches!(err, DbError::NotFound(_)));
    Ok(())
}

// ============================================================================
// Jobs
// ============================================================================

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_terminal_jobs_are_not_rewritten() -> Result<()> {
    let pg = TestPostgres::start().await?;
    let ledger = pg.ledger();
    let item = ledger.get_or_create_item(ITEM_URI).await?;

    let mut job = Job::new(item.id);
    ledger.insert_job(&job).await?;
    job.fail("Missing CRS")?;
    assert!(ledger.update_job(&job).await?);

    let mut stale = ledger.get_job(job.id).await?;
    stale.status = JobStatus::Completed;
    stale.error_message = None;
    assert!(!ledger.update_job(&stale).await?);

    let stored = ledger.get_job(job.id).await?;
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(stored.error_message.as_deref(), Some("Missing CRS"));
    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_latest_pending_jobs_skips_superseded() -> Result<()> {
    let pg = TestPostgres::start().await?;
    let ledger = pg.ledger();
    let roads = ledger.get_or_create_item(ITEM_URI).await?;
    let marc = ledger
        .get_or_create_item("db1b972e-5f34-5957-a520-d8b4eb565314")
        .await?;

    // roads: an old PENDING attempt superseded by a newer FAILED one
    ledger.insert_job(&job_at(roads.id, JobStatus::Pending, 30)).await?;
    ledger.insert_job(&job_at(roads.id, JobStatus::Failed, 5)).await?;
    // marc: newest attempt is PENDING
    ledger.insert_job(&job_at(marc.id, JobStatus::Completed, 30)).await?;
    let outstanding = job_at(marc.id, JobStatus::Pending, 1);
    ledger.insert_job(&outstanding).await?;

    let pending = ledger.latest_pending_jobs().await?;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, outstanding.id);

    let latest = ledger.latest_job_for_item(roads.id).await?.expect("latest");
    assert_eq!(latest.status, JobStatus::Failed);
    assert_eq!(ledger.jobs_for_item(roads.id).await?.len(), 2);
    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_job_requires_item() -> Result<()> {
    let pg = TestPostgres::start().await?;
    let ledger = pg.ledger();

    let job = Job::new(uuid::Uuid::new_v4());
    assert!(ledger.insert_job(&job).await.is_err());
    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_later_insert_wins_timestamp_tie() -> Result<()> {
    let pg = TestPostgres::start().await?;
    let ledger = pg.ledger();
    let item = ledger.get_or_create_item(ITEM_URI).await?;

    let first = job_at(item.id, JobStatus::Failed, 5);
    let second = Job {
        status: JobStatus::Pending,
        time: first.time,
        ..Job::new(item.id)
    };
    ledger.insert_job(&first).await?;
    ledger.insert_job(&second).await?;

    let latest = ledger.latest_job_for_item(item.id).await?.expect("latest");
    assert_eq!(latest.id, second.id);

    let pending = ledger.latest_pending_jobs().await?;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, second.id);
    Ok(())
}
