use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::orchestrator::RunSummary;
use super::progress::{ChannelProgress, ProgressSink, ProgressSnapshot};
use crate::error::RunError;

/// Runs sync jobs on a worker thread, at most one at a time
#[derive(Clone, Default)]
pub struct EtlRunner {
    active: Arc<AtomicBool>,
}

/// Clears the active flag when the worker exits, panics included
struct ActiveGuard(Arc<AtomicBool>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl EtlRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Start `job` on a new thread, or fail if a run is already in flight
    pub fn spawn<F>(&self, job: F) -> Result<RunHandle>
    where
        F: FnOnce(&mut dyn ProgressSink) -> Result<RunSummary> + Send + 'static,
    {
        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(RunError::AlreadyRunning.into());
        }

        let guard = ActiveGuard(Arc::clone(&self.active));
        let (tx, rx) = channel();
        let worker = thread::Builder::new()
            .name("pokedex-sync".into())
            .spawn(move || {
                let _guard = guard;
                let mut sink = ChannelProgress(tx);
                job(&mut sink)
            });

        // On spawn failure the closure, and with it the guard, is dropped
        let worker = worker.map_err(|e| anyhow!("Failed to start sync worker: {}", e))?;

        Ok(RunHandle {
            worker: Some(worker),
            snapshots: rx,
            latest: None,
        })
    }
}

/// Caller side of a background run
#[derive(Debug)]
pub struct RunHandle {
    worker: Option<JoinHandle<Result<RunSummary>>>,
    snapshots: Receiver<ProgressSnapshot>,
    latest: Option<ProgressSnapshot>,
}

impl RunHandle {
    /// Drain pending snapshots without blocking, returning them in order
    pub fn poll(&mut self) -> Vec<ProgressSnapshot> {
        let fresh: Vec<_> = self.snapshots.try_iter().collect();
        if let Some(last) = fresh.last() {
            self.latest = Some(last.clone());
        }
        fresh
    }

    /// Most recent snapshot seen by `poll`
    pub fn latest(&self) -> Option<&ProgressSnapshot> {
        self.latest.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().map_or(true, |w| w.is_finished())
    }

    /// Wait for the run to end and return its outcome
    pub fn join(mut self) -> Result<RunSummary> {
        let worker = self
            .worker
            .take()
            .ok_or_else(|| anyhow!("Sync worker already joined"))?;
        worker
            .join()
            .map_err(|_| anyhow!("Sync worker panicked"))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::sync_channel;

    #[test]
    fn test_snapshots_reach_caller() {
        let runner = EtlRunner::new();
        let mut handle = runner
            .spawn(|sink| {
                sink.report(&ProgressSnapshot::started(2));
                sink.report(&ProgressSnapshot::working(2, 0, 1, "bulbasaur"));
                sink.report(&ProgressSnapshot::finished(2, 2));
                Ok(RunSummary {
                    missing_total: 2,
                    written: 2,
                    failed: 0,
                })
            })
            .unwrap();

        while !handle.is_finished() {
            thread::yield_now();
        }
        let snapshots = handle.poll();
        assert_eq!(snapshots.len(), 3);
        assert!(handle.latest().unwrap().done);
        assert_eq!(handle.join().unwrap().written, 2);
        assert!(!runner.is_active());
    }

    #[test]
    fn test_second_run_is_rejected() {
        let runner = EtlRunner::new();
        let (release_tx, release_rx) = sync_channel::<()>(0);

        let first = runner
            .spawn(move |_| {
                release_rx.recv().ok();
                Ok(RunSummary::default())
            })
            .unwrap();

        let err = runner.spawn(|_| Ok(RunSummary::default())).unwrap_err();
        assert!(matches!(err.downcast_ref::<RunError>(), Some(RunError::AlreadyRunning)));

        release_tx.send(()).unwrap();
        first.join().unwrap();
        assert!(runner.spawn(|_| Ok(RunSummary::default())).unwrap().join().is_ok());
    }

    #[test]
    fn test_panicking_job_releases_runner() {
        let runner = EtlRunner::new();
        let handle = runner.spawn(|_| panic!("boom")).unwrap();
        assert!(handle.join().is_err());
        assert!(!runner.is_active());
    }
}
