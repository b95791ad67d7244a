//! Push-style job notifications

use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::deployment::{JobStatus, StageName, StageStatus};

/// Progress notification for subscribers. Polling `get_job` remains the
/// source of truth; lagging subscribers simply miss notifications.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobNotification {
    StatusChanged {
        job_id: String,
        status: JobStatus,
    },
    StageStarted {
        job_id: String,
        stage: StageName,
    },
    StageFinished {
        job_id: String,
        stage: StageName,
        status: StageStatus,
    },
}

/// Broadcast fan-out of job notifications
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<JobNotification>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobNotification> {
        self.tx.subscribe()
    }

    pub fn send(&self, notification: JobNotification) {
        // No subscribers is not an error
        let _ = self.tx.send(notification);
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(256)
    }
}
