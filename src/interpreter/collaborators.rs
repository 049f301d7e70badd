//! Interfaces to external collaborator subsystems.
//!
//! The interpreter core does not own scheduled-job persistence; a
//! daemon-backed job tracker is consumed through this narrow interface
//! by the `job-*` builtin aliases. When no service is attached those
//! builtins fail cleanly.

use async_trait::async_trait;
use thiserror::Error;

/// A job known to the external tracking service.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: String,
    pub name: String,
    pub status: String,
}

#[derive(Debug, Clone, Error)]
pub enum JobServiceError {
    #[error("job service unavailable")]
    Unavailable,
    #[error("unknown job: {0}")]
    UnknownJob(String),
    #[error("{0}")]
    Other(String),
}

/// Externally-scheduled job tracking: create/start/stop/list. The
/// implementation (socket protocol, persistence) lives outside this
/// crate.
#[async_trait]
pub trait JobService: Send + Sync {
    async fn create(&self, name: &str, command: &str) -> Result<String, JobServiceError>;
    async fn start(&self, id: &str) -> Result<(), JobServiceError>;
    async fn stop(&self, id: &str) -> Result<(), JobServiceError>;
    async fn list(&self) -> Result<Vec<JobRecord>, JobServiceError>;
}

#[cfg(test)]
pub mod testing {
    //! In-memory job service used by engine tests.

    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MemoryJobService {
        jobs: Mutex<HashMap<String, JobRecord>>,
        next_id: Mutex<usize>,
    }

    #[async_trait]
    impl JobService for MemoryJobService {
        async fn create(&self, name: &str, command: &str) -> Result<String, JobServiceError> {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            let id = format!("job-{}", next);
            let _ = command;
            self.jobs.lock().unwrap().insert(
                id.clone(),
                JobRecord {
                    id: id.clone(),
                    name: name.to_string(),
                    status: "created".to_string(),
                },
            );
            Ok(id)
        }

        async fn start(&self, id: &str) -> Result<(), JobServiceError> {
            let mut jobs = self.jobs.lock().unwrap();
            match jobs.get_mut(id) {
                Some(job) => {
                    job.status = "running".to_string();
                    Ok(())
                }
                None => Err(JobServiceError::UnknownJob(id.to_string())),
            }
        }

        async fn stop(&self, id: &str) -> Result<(), JobServiceError> {
            let mut jobs = self.jobs.lock().unwrap();
            match jobs.get_mut(id) {
                Some(job) => {
                    job.status = "stopped".to_string();
                    Ok(())
                }
                None => Err(JobServiceError::UnknownJob(id.to_string())),
            }
        }

        async fn list(&self) -> Result<Vec<JobRecord>, JobServiceError> {
            let jobs = self.jobs.lock().unwrap();
            let mut records: Vec<_> = jobs.values().cloned().collect();
            records.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(records)
        }
    }
}
