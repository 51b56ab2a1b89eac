//! Background work lane.
//!
//! A bounded queue drained by a single worker thread, used for work that
//! must never block the pull/index cycle (link checking). Submissions to a
//! full queue are dropped, not queued elsewhere. Shutdown is deterministic:
//! the job in flight finishes, queued jobs are discarded.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{info, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct BackgroundLane {
    sender: Option<SyncSender<(String, Job)>>,
    worker: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl BackgroundLane {
    /// Spawns the worker thread with room for `capacity` queued jobs.
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = sync_channel::<(String, Job)>(capacity);
        let shutdown = Arc::new(AtomicBool::new(false));

        let worker_shutdown = Arc::clone(&shutdown);
        let worker = std::thread::spawn(move || {
            while let Ok((name, job)) = receiver.recv() {
                if worker_shutdown.load(Ordering::Acquire) {
                    info!(job = %name, "discarding queued job on shutdown");
                    continue;
                }
                info!(job = %name, "background job started");
                job();
                info!(job = %name, "background job finished");
            }
        });

        BackgroundLane {
            sender: Some(sender),
            worker: Some(worker),
            shutdown,
        }
    }

    /// Enqueues a job unless the queue is full. Returns whether the job was
    /// accepted.
    pub fn try_submit(&self, name: &str, job: impl FnOnce() + Send + 'static) -> bool {
        let sender = match &self.sender {
            Some(sender) => sender,
            None => return false,
        };

        match sender.try_send((name.to_string(), Box::new(job))) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(job = %name, "background lane full, job dropped");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

impl Drop for BackgroundLane {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        // Disconnect the channel so the worker's recv loop ends once the
        // queue is drained (remaining jobs are discarded via the flag).
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
