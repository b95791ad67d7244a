//! Job cache

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock as AsyncRwLock;
use tracing::debug;

use crate::models::deployment::DeploymentJob;

/// Shared, live view of a job. The executor writes, pollers read.
pub type JobHandle = Arc<AsyncRwLock<DeploymentJob>>;

/// Job cache entry
#[derive(Debug, Clone)]
pub struct JobCacheEntry {
    pub job: JobHandle,
    pub cached_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// In-memory job cache.
///
/// Queued and running jobs are always kept. Finished jobs stay pollable
/// until more than `retention` of them accumulate, then the oldest finished
/// job is evicted. The most recently finished job is always kept.
pub struct JobCache {
    inner: RwLock<Inner>,
    retention: usize,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, JobCacheEntry>,
    /// Finished job ids, oldest first
    finished: VecDeque<String>,
}

impl JobCache {
    pub fn new(retention: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            retention: retention.max(1),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, job_id: &str) -> Option<JobHandle> {
        self.read().entries.get(job_id).map(|e| e.job.clone())
    }

    pub fn insert(&self, job_id: String, job: JobHandle) {
        self.write().entries.insert(
            job_id,
            JobCacheEntry {
                job,
                cached_at: Utc::now(),
                finished_at: None,
            },
        );
    }

    /// Flag a job as finished, making it eligible for eviction
    pub fn mark_finished(&self, job_id: &str) {
        let mut inner = self.write();
        match inner.entries.get_mut(job_id) {
            Some(entry) if entry.finished_at.is_none() => {
                entry.finished_at = Some(Utc::now());
                inner.finished.push_back(job_id.to_string());
            }
            _ => return,
        }

        while inner.finished.len() > self.retention {
            if let Some(oldest) = inner.finished.pop_front() {
                debug!("Evicting finished job {}", oldest);
                inner.entries.remove(&oldest);
            }
        }
    }

    pub fn remove(&self, job_id: &str) -> Option<JobCacheEntry> {
        let mut inner = self.write();
        let entry = inner.entries.remove(job_id)?;
        if entry.finished_at.is_some() {
            inner.finished.retain(|id| id != job_id);
        }
        Some(entry)
    }

    pub fn keys(&self) -> Vec<String> {
        self.read().entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
