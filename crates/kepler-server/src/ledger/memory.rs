//! In-memory ledger for tests and dry runs

use async_trait::async_trait;
use kepler_common::AccessLevel;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::JobLedger;
use crate::db::{DbError, DbResult};
use crate::models::{Item, Job, JobStatus};

#[derive(Debug, Default)]
struct State {
    items: HashMap<Uuid, Item>,
    /// Insertion order breaks ties between equal timestamps
    jobs: Vec<Job>,
}

/// A [`JobLedger`] kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<State>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| DbError::config("in-memory ledger lock poisoned"))
    }

    fn update_item<F>(&self, id: Uuid, f: F) -> DbResult<()>
    where
        F: FnOnce(&mut Item),
    {
        let mut state = self.lock()?;
        let item = state
            .items
            .get_mut(&id)
            .ok_or_else(|| DbError::not_found("Item", id))?;
        f(item);
        Ok(())
    }
}

/// Newest first; later insertion wins a timestamp tie
fn newest_first(jobs: impl Iterator<Item = (usize, Job)>) -> Vec<Job> {
    let mut jobs: Vec<_> = jobs.collect();
    jobs.sort_by(|(ia, a), (ib, b)| b.time.cmp(&a.time).then(ib.cmp(ia)));
    jobs.into_iter().map(|(_, job)| job).collect()
}

#[async_trait]
impl JobLedger for MemoryLedger {
    async fn get_or_create_item(&self, uri: &str) -> DbResult<Item> {
        let mut state = self.lock()?;
        if let Some(item) = state.items.values().find(|i| i.uri == uri) {
            return Ok(item.clone());
        }
        let item = Item::new(uri);
        state.items.insert(item.id, item.clone());
        Ok(item)
    }

    async fn get_item(&self, id: Uuid) -> DbResult<Item> {
        self.lock()?
            .items
            .get(&id)
            .cloned()
            .ok_or_else(|| DbError::not_found("Item", id))
    }

    async fn find_item_by_uri(&self, uri: &str) -> DbResult<Option<Item>> {
        Ok(self.lock()?.items.values().find(|i| i.uri == uri).cloned())
    }

    async fn set_item_access(&self, id: Uuid, access: AccessLevel) -> DbResult<()> {
        self.update_item(id, |item| item.access = access)
    }

    async fn set_item_layer_id(&self, id: Uuid, layer_id: &str) -> DbResult<()> {
        self.update_item(id, |item| item.layer_id = Some(layer_id.to_string()))
    }

    async fn set_item_handle(&self, id: Uuid, handle: &str) -> DbResult<String> {
        let mut stored = String::new();
        self.update_item(id, |item| {
            stored = item
                .handle
                .get_or_insert_with(|| handle.to_string())
                .clone();
        })?;
        Ok(stored)
    }

    async fn set_item_tiff_url(&self, id: Uuid, tiff_url: &str) -> DbResult<()> {
        self.update_item(id, |item| item.tiff_url = Some(tiff_url.to_string()))
    }

    async fn set_item_record(&self, id: Uuid, record: &str) -> DbResult<()> {
        self.update_item(id, |item| item.record = Some(record.to_string()))
    }

    async fn insert_job(&self, job: &Job) -> DbResult<()> {
        let mut state = self.lock()?;
        if !state.items.contains_key(&job.item_id) {
            return Err(DbError::not_found("Item", job.item_id));
        }
        state.jobs.push(job.clone());
        Ok(())
    }

    async fn update_job(&self, job: &Job) -> DbResult<bool> {
        let mut state = self.lock()?;
        let stored = state
            .jobs
            .iter_mut()
            .find(|j| j.id == job.id)
            .ok_or_else(|| DbError::not_found("Job", job.id))?;
        if stored.status.is_terminal() {
            return Ok(false);
        }
        stored.status = job.status;
        stored.import_url = job.import_url.clone();
        stored.error_message = job.error_message.clone();
        Ok(true)
    }

    async fn get_job(&self, id: Uuid) -> DbResult<Job> {
        self.lock()?
            .jobs
            .iter()
            .find(|j| j.id == id)
            .cloned()
            .ok_or_else(|| DbError::not_found("Job", id))
    }

    async fn jobs_for_item(&self, item_id: Uuid) -> DbResult<Vec<Job>> {
        let state = self.lock()?;
        Ok(newest_first(
            state
                .jobs
                .iter()
                .cloned()
                .enumerate()
                .filter(|(_, j)| j.item_id == item_id),
        ))
    }

    async fn latest_job_for_item(&self, item_id: Uuid) -> DbResult<Option<Job>> {
        Ok(self.jobs_for_item(item_id).await?.into_iter().next())
    }

    async fn latest_pending_jobs(&self) -> DbResult<Vec<Job>> {
        let state = self.lock()?;
        let mut latest: HashMap<Uuid, (usize, Job)> = HashMap::new();
        for (index, job) in state.jobs.iter().cloned().enumerate() {
            let newer = latest
                .get(&job.item_id)
                .map_or(true, |(_, current)| job.time >= current.time);
            if newer {
                latest.insert(job.item_id, (index, job));
            }
        }
        Ok(newest_first(
            latest
                .into_values()
                .filter(|(_, job)| job.status == JobStatus::Pending),
        ))
    }
}
