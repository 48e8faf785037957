use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::error::WorkshopError;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed set of long-lived threads pulling jobs off one channel. Dropping the
/// pool closes the channel; workers finish their current job and exit.
pub struct WorkerPool {
    sender: Option<Sender<Job>>,
}

impl WorkerPool {
    pub fn new(name: &str, size: usize) -> Result<Self, WorkshopError> {
        let size = size.max(1);
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        for index in 0..size {
            let receiver = receiver.clone();
            thread::Builder::new()
                .name(format!("{name}-{index}"))
                .spawn(move || worker_loop(receiver))
                .map_err(|err| WorkshopError::Filesystem(format!("spawn worker: {err}")))?;
        }
        Ok(Self {
            sender: Some(sender),
        })
    }

    pub fn execute<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(sender) = &self.sender else {
            return;
        };
        if sender.send(Box::new(job)).is_err() {
            tracing::warn!("worker pool is shut down; job dropped");
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.sender.take();
    }
}

fn worker_loop(receiver: Arc<Mutex<Receiver<Job>>>) {
    loop {
        let job = {
            let Ok(guard) = receiver.lock() else {
                return;
            };
            guard.recv()
        };
        let Ok(job) = job else {
            return;
        };
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            tracing::warn!("background job panicked; worker continues");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    #[test]
    fn runs_jobs_and_survives_panics() {
        let pool = WorkerPool::new("test-pool", 2).unwrap();
        let done = Arc::new(AtomicUsize::new(0));

        pool.execute(|| panic!("boom"));
        for _ in 0..8 {
            let done = done.clone();
            pool.execute(move || {
                done.fetch_add(1, Ordering::SeqCst);
            });
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        while done.load(Ordering::SeqCst) < 8 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(done.load(Ordering::SeqCst), 8);
    }
}
