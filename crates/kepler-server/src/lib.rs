//! Kepler Server Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Publishes geospatial submissions to a hosting service, a preservation
//! archive and a search catalog, and tracks each attempt as a job.
//!
//! # Overview
//!
//! - **Ledger**: items and jobs in PostgreSQL (or memory), the single
//!   source of truth for job state
//! - **Package inspection**: unpacks submitted bags and classifies them
//! - **Pipeline**: a fixed list of steps per payload type
//! - **Reconciliation**: a periodic pass that settles jobs waiting on
//!   asynchronous remote imports, then publishes their catalog records
//!
//! # Job lifecycle
//!
//! A job starts CREATED. When its steps succeed it becomes PENDING if the
//! hosting service still has to finish importing, or COMPLETED otherwise.
//! Reconciliation moves PENDING jobs to COMPLETED or FAILED. A step failure
//! moves the job to FAILED straight away.
//!
//! # Example
//!
//! ```no_run
//! use kepler_server::{config::Config, db, ingest::IngestService, ledger::PgLedger, services::Services};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let pool = db::create_pool(&(&config.database).into()).await?;
//!     let service = IngestService::new(
//!         Arc::new(PgLedger::new(pool)),
//!         Services::from_config(&config)?,
//!         config.ingest.uuid_namespace.clone(),
//!     );
//!     let report = service.reconcile().await?;
//!     println!("{} jobs examined", report.examined);
//!     Ok(())
//! }
//! ```

pub mod bag;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod ledger;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use error::{IngestError, IngestResult};
pub use ingest::{IngestService, ReconcileReport, ReconcileScheduler};
pub use models::{Item, Job, JobStatus};
