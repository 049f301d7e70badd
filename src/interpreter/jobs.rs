//! Background job table.
//!
//! Tracks jobs launched with `&`. Each entry records the job id, the
//! (virtual) pid, the command text, the status, and the start time.
//! The table is shared between the shell, its subshells, and the
//! detached tasks that run the jobs; every mutation is a serialized
//! upsert behind one async mutex. Job ids are unique and each is
//! written by its own completion callback only, so upserts never
//! conflict.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Local};
use indexmap::IndexMap;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::interpreter::types::ExecResult;

/// Lifecycle of a background job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Stopped,
    Done,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "Running",
            JobStatus::Stopped => "Stopped",
            JobStatus::Done => "Done",
        }
    }
}

/// One tracked background job.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: usize,
    pub pid: u32,
    pub command: String,
    pub status: JobStatus,
    pub started: DateTime<Local>,
    /// Exit code once the job reaches Done
    pub exit_code: Option<i32>,
}

/// Insertion-ordered job table. Listing order matches launch order.
#[derive(Debug)]
pub struct JobTable {
    jobs: IndexMap<usize, Job>,
    handles: HashMap<usize, JoinHandle<ExecResult>>,
    next_id: usize,
}

impl Default for JobTable {
    fn default() -> Self {
        Self::new()
    }
}

impl JobTable {
    pub fn new() -> Self {
        Self {
            jobs: IndexMap::new(),
            handles: HashMap::new(),
            next_id: 1,
        }
    }

    /// Register a new job in Running state, returning its id.
    pub fn register(&mut self, pid: u32, command: impl Into<String>) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        self.jobs.insert(
            id,
            Job {
                id,
                pid,
                command: command.into(),
                status: JobStatus::Running,
                started: Local::now(),
                exit_code: None,
            },
        );
        id
    }

    /// Attach the task handle driving a registered job.
    pub fn attach_handle(&mut self, id: usize, handle: JoinHandle<ExecResult>) {
        self.handles.insert(id, handle);
    }

    /// Upsert a job to Done with its exit code. Called exactly once,
    /// from the job's own completion callback.
    pub fn mark_done(&mut self, id: usize, exit_code: i32) {
        if let Some(job) = self.jobs.get_mut(&id) {
            job.status = JobStatus::Done;
            job.exit_code = Some(exit_code);
        }
    }

    pub fn mark_stopped(&mut self, id: usize) {
        if let Some(job) = self.jobs.get_mut(&id) {
            job.status = JobStatus::Stopped;
        }
    }

    pub fn mark_running(&mut self, id: usize) {
        if let Some(job) = self.jobs.get_mut(&id) {
            job.status = JobStatus::Running;
        }
    }

    pub fn get(&self, id: usize) -> Option<&Job> {
        self.jobs.get(&id)
    }

    /// Find a job by its pid (the value `$!` reports).
    pub fn find_by_pid(&self, pid: u32) -> Option<&Job> {
        self.jobs.values().find(|j| j.pid == pid)
    }

    pub fn list(&self) -> Vec<Job> {
        self.jobs.values().cloned().collect()
    }

    /// Remove and return the task handle for a job, if any. Callers
    /// await the handle outside the table lock.
    pub fn take_handle(&mut self, id: usize) -> Option<JoinHandle<ExecResult>> {
        self.handles.remove(&id)
    }

    /// Remove and return all task handles, paired with their job ids.
    pub fn take_all_handles(&mut self) -> Vec<(usize, JoinHandle<ExecResult>)> {
        self.handles.drain().collect()
    }

    /// Drop finished jobs from the listing (after `jobs` reports them).
    pub fn reap_done(&mut self) {
        self.jobs.retain(|_, job| job.status != JobStatus::Done);
    }

    pub fn has_jobs(&self) -> bool {
        !self.jobs.is_empty()
    }
}

/// Shared handle to the job table.
pub type SharedJobTable = Arc<Mutex<JobTable>>;

pub fn new_shared_job_table() -> SharedJobTable {
    Arc::new(Mutex::new(JobTable::new()))
}
