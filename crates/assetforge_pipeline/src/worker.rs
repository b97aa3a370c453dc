// SPDX-License-Identifier: MIT OR Apache-2.0
//! Background-worker bridge.
//!
//! One long-lived worker thread per executive, fed through a channel. A
//! dispatched unit of work is wrapped so that an error (or panic) is
//! captured into the bridge's single fault slot before the completion
//! signal is set; the driving thread re-raises the fault at its next poll
//! point instead of the process crashing on the worker.

use assetforge_graph::{BackgroundWorker, TaskError, WaitHandle};
use parking_lot::Mutex;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};

type Work = Box<dyn FnOnce() -> Result<(), TaskError> + Send + 'static>;

struct Job {
    work: Work,
    signal: WaitHandle,
    fault: Arc<Mutex<Option<TaskError>>>,
    outstanding: Arc<AtomicBool>,
}

/// Bridge between the single-threaded step loop and a worker thread.
///
/// Single-flight: the signal and fault slot are singular, so at most one
/// operation may be outstanding at a time. A second dispatch before the
/// first handle signals is refused with [`TaskError::WorkerBusy`];
/// concurrent background work from two nodes must instead be serialized
/// by node ordering.
pub struct WorkerBridge {
    sender: mpsc::Sender<Job>,
    signal: WaitHandle,
    fault: Arc<Mutex<Option<TaskError>>>,
    outstanding: Arc<AtomicBool>,
}

impl WorkerBridge {
    /// Spawn the worker thread and create its bridge
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel::<Job>();
        let spawned = std::thread::Builder::new()
            .name("assetforge-worker".into())
            .spawn(move || worker_loop(receiver));
        if let Err(e) = spawned {
            tracing::error!("failed to spawn worker thread: {e}");
        }
        Self {
            sender,
            signal: WaitHandle::new(),
            fault: Arc::new(Mutex::new(None)),
            outstanding: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Take the recorded background fault, clearing the slot
    pub fn take_fault(&self) -> Option<TaskError> {
        self.fault.lock().take()
    }

    /// Whether no operation is currently outstanding
    pub fn is_idle(&self) -> bool {
        !self.outstanding.load(Ordering::SeqCst)
    }
}

impl Default for WorkerBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl BackgroundWorker for WorkerBridge {
    fn dispatch(&self, work: Work) -> Result<WaitHandle, TaskError> {
        if self.outstanding.swap(true, Ordering::SeqCst) {
            return Err(TaskError::WorkerBusy);
        }
        *self.fault.lock() = None;
        self.signal.reset();
        let job = Job {
            work,
            signal: self.signal.clone(),
            fault: Arc::clone(&self.fault),
            outstanding: Arc::clone(&self.outstanding),
        };
        if self.sender.send(job).is_err() {
            self.outstanding.store(false, Ordering::SeqCst);
            return Err(TaskError::Failed("background worker thread is gone".into()));
        }
        Ok(self.signal.clone())
    }
}

fn worker_loop(receiver: mpsc::Receiver<Job>) {
    while let Ok(job) = receiver.recv() {
        let Job {
            work,
            signal,
            fault,
            outstanding,
        } = job;
        let outcome = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(work)) {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(panic) => Some(TaskError::Failed(panic_message(&panic))),
        };
        if let Some(error) = outcome {
            tracing::debug!("background work faulted: {error}");
            *fault.lock() = Some(error);
        }
        outstanding.store(false, Ordering::SeqCst);
        signal.signal();
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("background worker panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("background worker panicked: {message}")
    } else {
        "background worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_dispatch_runs_and_signals() {
        let bridge = WorkerBridge::new();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let handle = bridge
            .dispatch(Box::new(move || {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            }))
            .unwrap();

        assert!(handle.wait_timeout(Duration::from_secs(2)));
        assert!(ran.load(Ordering::SeqCst));
        assert!(bridge.take_fault().is_none());
        assert!(bridge.is_idle());
    }

    #[test]
    fn test_error_captured_as_fault() {
        let bridge = WorkerBridge::new();
        let handle = bridge
            .dispatch(Box::new(|| Err(TaskError::Failed("boom".into()))))
            .unwrap();

        assert!(handle.wait_timeout(Duration::from_secs(2)));
        match bridge.take_fault() {
            Some(TaskError::Failed(message)) => assert_eq!(message, "boom"),
            other => panic!("expected recorded fault, got {other:?}"),
        }
        // Taking the fault clears the slot.
        assert!(bridge.take_fault().is_none());
    }

    #[test]
    fn test_panic_captured_as_fault() {
        let bridge = WorkerBridge::new();
        let handle = bridge
            .dispatch(Box::new(|| panic!("worker exploded")))
            .unwrap();

        assert!(handle.wait_timeout(Duration::from_secs(2)));
        match bridge.take_fault() {
            Some(TaskError::Failed(message)) => {
                assert!(message.contains("worker exploded"));
            }
            other => panic!("expected recorded fault, got {other:?}"),
        }
    }

    #[test]
    fn test_second_dispatch_refused_while_outstanding() {
        let bridge = WorkerBridge::new();
        let gate = WaitHandle::new();
        let release = gate.clone();
        let first = bridge
            .dispatch(Box::new(move || {
                release.wait_timeout(Duration::from_secs(5));
                Ok(())
            }))
            .unwrap();

        assert!(matches!(
            bridge.dispatch(Box::new(|| Ok(()))),
            Err(TaskError::WorkerBusy)
        ));

        gate.signal();
        assert!(first.wait_timeout(Duration::from_secs(2)));
        assert!(bridge.is_idle());
    }
}
