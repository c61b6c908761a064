//! Test doubles for the scheduler's collaborators

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use crate::domain::{Job, Trigger};
use crate::process::{ExitOutcome, ProcessWatcher};
use crate::scheduler::{JobRecorder, StoreConnection, TriggerSource, WorkspaceCleaner};

/// Trigger whose process name equals its id
pub fn trigger(id: &str, blocking: bool) -> Arc<Trigger> {
    Arc::new(Trigger::single(id, id, "true", Utc::now()).blocking(blocking))
}

#[derive(Debug, Default)]
struct FakeState {
    exit: Option<i32>,
    poll_error: bool,
    detail: Option<String>,
}

/// Controls a `FakeProcess` from the test body
#[derive(Debug, Clone)]
pub struct ExitControl {
    state: Arc<Mutex<FakeState>>,
    polls: Arc<AtomicUsize>,
}

impl ExitControl {
    pub fn finish(&self, code: i32) {
        self.state.lock().unwrap().exit = Some(code);
    }

    pub fn fail_polls(&self, fail: bool) {
        self.state.lock().unwrap().poll_error = fail;
    }

    pub fn set_detail(&self, detail: &str) {
        self.state.lock().unwrap().detail = Some(detail.to_string());
    }

    pub fn poll_count(&self) -> Arc<AtomicUsize> {
        self.polls.clone()
    }
}

/// Process stand-in whose exit is decided by the test
#[derive(Debug)]
pub struct FakeProcess {
    state: Arc<Mutex<FakeState>>,
    polls: Arc<AtomicUsize>,
}

impl FakeProcess {
    pub fn pending() -> (Self, ExitControl) {
        let state = Arc::new(Mutex::new(FakeState::default()));
        let polls = Arc::new(AtomicUsize::new(0));
        let control = ExitControl {
            state: state.clone(),
            polls: polls.clone(),
        };
        (Self { state, polls }, control)
    }
}

impl ProcessWatcher for FakeProcess {
    fn pid(&self) -> Option<u32> {
        Some(4242)
    }

    fn try_exit(&mut self) -> io::Result<Option<ExitOutcome>> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        if state.poll_error {
            return Err(io::Error::other("status query failed"));
        }
        Ok(state.exit.map(ExitOutcome::from_code))
    }

    fn failure_detail(&self) -> Option<String> {
        self.state.lock().unwrap().detail.clone()
    }
}

/// Running job plus the handle that finishes it
pub fn running_job(id: &str, blocking: bool) -> (Job, ExitControl) {
    let (process, control) = FakeProcess::pending();
    let mut job = Job::with_id(format!("job-{}", id), trigger(id, blocking), Box::new(process));
    job.mark_running();
    (job, control)
}

/// A recorded terminal callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    Success(String),
    Failure(String),
}

/// Recorder that remembers every call
#[derive(Debug, Default)]
pub struct RecordingRecorder {
    calls: Mutex<Vec<Recorded>>,
    fail: AtomicBool,
}

impl RecordingRecorder {
    pub fn calls(&self) -> Vec<Recorded> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fail_with_error(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl JobRecorder for RecordingRecorder {
    async fn record_success(&self, job: &Job) -> eyre::Result<()> {
        self.calls.lock().unwrap().push(Recorded::Success(job.id().to_string()));
        if self.fail.load(Ordering::SeqCst) {
            return Err(eyre::eyre!("store unavailable"));
        }
        Ok(())
    }

    async fn record_failure(&self, job: &Job) -> eyre::Result<()> {
        self.calls.lock().unwrap().push(Recorded::Failure(job.id().to_string()));
        if self.fail.load(Ordering::SeqCst) {
            return Err(eyre::eyre!("store unavailable"));
        }
        Ok(())
    }
}

/// Trigger source handing out pre-built jobs in order
#[derive(Debug, Default)]
pub struct QueueSource {
    jobs: Mutex<VecDeque<Job>>,
    polls: AtomicUsize,
    fail: AtomicBool,
}

impl QueueSource {
    pub fn push(&self, job: Job) {
        self.jobs.lock().unwrap().push_back(job);
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn fail_with_error(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl TriggerSource for QueueSource {
    async fn poll_next_due_trigger(&self) -> eyre::Result<Option<Job>> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(eyre::eyre!("store query failed"));
        }
        Ok(self.jobs.lock().unwrap().pop_front())
    }
}

/// Cleaner that counts its calls
#[derive(Debug, Default)]
pub struct CountingCleaner {
    calls: AtomicUsize,
}

impl CountingCleaner {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkspaceCleaner for CountingCleaner {
    async fn reclaim_workspace(&self) -> eyre::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Connection with a fixed answer
#[derive(Debug)]
pub struct FixedConnection(pub bool);

impl StoreConnection for FixedConnection {
    fn is_configured(&self) -> bool {
        self.0
    }
}
