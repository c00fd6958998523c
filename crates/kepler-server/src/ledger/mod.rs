//! Job ledger: durable record of items and jobs
//!
//! The ledger is the single source of truth for job state. Every mutation
//! commits on its own; there is no unit of work spanning several calls.
//!
//! Two guards are enforced by every implementation:
//!
//! - a job stored as COMPLETED or FAILED is never rewritten
//!   ([`JobLedger::update_job`] reports `false` instead)
//! - an item's `handle` is written at most once
//!   ([`JobLedger::set_item_handle`] returns the handle that is stored)

pub mod memory;
pub mod postgres;

pub use memory::MemoryLedger;
pub use postgres::PgLedger;

use async_trait::async_trait;
use kepler_common::AccessLevel;
use uuid::Uuid;

use crate::db::DbResult;
use crate::models::{Item, Job};

#[async_trait]
pub trait JobLedger: Send + Sync {
    /// Item for `uri`, created with default access on first use
    async fn get_or_create_item(&self, uri: &str) -> DbResult<Item>;

    async fn get_item(&self, id: Uuid) -> DbResult<Item>;

    async fn find_item_by_uri(&self, uri: &str) -> DbResult<Option<Item>>;

    async fn set_item_access(&self, id: Uuid, access: AccessLevel) -> DbResult<()>;

    async fn set_item_layer_id(&self, id: Uuid, layer_id: &str) -> DbResult<()>;

    /// Store `handle` unless one is already set. Returns the stored handle.
    async fn set_item_handle(&self, id: Uuid, handle: &str) -> DbResult<String>;

    async fn set_item_tiff_url(&self, id: Uuid, tiff_url: &str) -> DbResult<()>;

    async fn set_item_record(&self, id: Uuid, record: &str) -> DbResult<()>;

    async fn insert_job(&self, job: &Job) -> DbResult<()>;

    /// Persist status, import URL and error message. Returns `false` when
    /// the stored job is already terminal and was left unchanged.
    async fn update_job(&self, job: &Job) -> DbResult<bool>;

    async fn get_job(&self, id: Uuid) -> DbResult<Job>;

    /// All jobs of an item, newest first
    async fn jobs_for_item(&self, item_id: Uuid) -> DbResult<Vec<Job>>;

    async fn latest_job_for_item(&self, item_id: Uuid) -> DbResult<Option<Job>>;

    /// For every item whose newest job is PENDING, that job. Older pending
    /// jobs of the same item are not returned. Newest first.
    async fn latest_pending_jobs(&self) -> DbResult<Vec<Job>>;
}
