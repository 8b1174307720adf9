//! Bounded thread pool for detection, scoring and signal tasks.
//!
//! Jobs are closures pushed through a bounded crossbeam channel. Submission
//! never blocks: when the queue is full the job is handed back as rejected,
//! which is how the frame path stays drop-on-busy.

use crossbeam_channel::{bounded, Sender, TrySendError};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Cooperative cancellation flag, checked by tasks at their own boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

pub struct Workers {
    name: String,
    sender: Option<Sender<Job>>,
    handles: Vec<thread::JoinHandle<()>>,
}

impl Workers {
    /// Spawn `num_threads` workers sharing a queue of `queue_len` pending jobs.
    pub fn new(name: &str, num_threads: usize, queue_len: usize) -> std::io::Result<Self> {
        let (tx, rx) = bounded::<Job>(queue_len.max(1));
        let mut handles = Vec::with_capacity(num_threads);

        for worker_id in 0..num_threads.max(1) {
            let rx = rx.clone();
            let thread_name = format!("{name}-{worker_id}");
            let handle = thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || {
                    debug!("Worker {} started", thread_name);
                    while let Ok(job) = rx.recv() {
                        if catch_unwind(AssertUnwindSafe(job)).is_err() {
                            error!("Job panicked on {}", thread_name);
                        }
                    }
                    debug!("Worker {} stopped", thread_name);
                })?;
            handles.push(handle);
        }

        debug!("{} pool initialized: {} threads", name, handles.len());

        Ok(Self {
            name: name.to_string(),
            sender: Some(tx),
            handles,
        })
    }

    /// Queue a job. Returns `false` when the queue is full or shut down.
    pub fn try_execute<F>(&self, f: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(sender) = &self.sender else {
            return false;
        };
        match sender.try_send(Box::new(f)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("{} queue full, job dropped", self.name);
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                error!("{} pool is gone, job dropped", self.name);
                false
            }
        }
    }

    pub fn threads(&self) -> usize {
        self.handles.len()
    }
}

impl Drop for Workers {
    fn drop(&mut self) {
        debug!("{} shutting down ({} threads)", self.name, self.handles.len());
        // Closing the channel ends every worker loop once the queue drains.
        self.sender.take();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}
