//! Finite State Machine for deployment job status

use crate::models::deployment::JobStatus;

/// Job event
#[derive(Debug, Clone)]
pub enum JobEvent {
    /// Processor began executing the first stage
    Start,

    /// Deploy stage is starting
    EnterDeploy,

    /// Post-deploy verification (health check, canary) is starting
    EnterVerification,

    /// Every stage completed
    Complete,

    /// A stage failed
    Fail(String),

    /// Rollback restored the previous version
    RollbackSucceeded,

    /// Rollback itself failed; the job stays failed
    RollbackFailed(String),
}

/// Job status FSM
#[derive(Debug, Clone)]
pub struct JobFsm {
    status: JobStatus,
    error: Option<String>,
}

impl JobFsm {
    /// Create a new FSM in pending status
    pub fn new() -> Self {
        Self {
            status: JobStatus::Pending,
            error: None,
        }
    }

    /// Resume an FSM at a job's recorded status
    pub fn resume(status: JobStatus, error: Option<String>) -> Self {
        Self { status, error }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Process an event and transition status
    pub fn process(&mut self, event: JobEvent) -> Result<JobStatus, String> {
        use JobStatus::*;

        let new_status = match (self.status, &event) {
            (Pending, JobEvent::Start) => Building,

            (Building, JobEvent::EnterDeploy) => Deploying,
            (Deploying, JobEvent::EnterVerification) => Testing,

            // Verification always runs before finalize, but tolerate a
            // pipeline whose later stages were skipped.
            (Building | Deploying | Testing, JobEvent::Complete) => Completed,

            (Building | Deploying | Testing, JobEvent::Fail(err)) => {
                self.error = Some(err.clone());
                Failed
            }

            (Failed, JobEvent::RollbackSucceeded) => RolledBack,
            (Failed, JobEvent::RollbackFailed(err)) => {
                self.error = Some(format!(
                    "{}; rollback failed: {}",
                    self.error.as_deref().unwrap_or("stage failed"),
                    err
                ));
                Failed
            }

            (status, event) => {
                return Err(format!("Invalid transition: {} -> {:?}", status, event));
            }
        };

        self.status = new_status;
        Ok(new_status)
    }
}

impl Default for JobFsm {
    fn default() -> Self {
        Self::new()
    }
}
