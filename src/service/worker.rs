use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

/// Runs jobs on background threads and only ever yields the result of the
/// most recent submission. Older results are dropped when they arrive.
pub struct LatestRequest<T> {
    generation: u64,
    pending: bool,
    tx: Sender<(u64, T)>,
    rx: Receiver<(u64, T)>,
}

impl<T: Send + 'static> Default for LatestRequest<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> LatestRequest<T> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            generation: 0,
            pending: false,
            tx,
            rx,
        }
    }

    /// Starts `job` and returns its generation. Any earlier job still in
    /// flight becomes stale.
    pub fn submit<F>(&mut self, job: F) -> u64
    where
        F: FnOnce() -> T + Send + 'static,
    {
        self.generation += 1;
        self.pending = true;
        let generation = self.generation;
        let tx = self.tx.clone();
        thread::spawn(move || {
            let _ = tx.send((generation, job()));
        });
        generation
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Invalidates whatever is in flight without starting anything new.
    pub fn cancel(&mut self) {
        self.generation += 1;
        self.pending = false;
    }

    /// Non-blocking: the current generation's result if it has arrived.
    pub fn poll(&mut self) -> Option<T> {
        let mut latest = None;
        while let Ok((generation, value)) = self.rx.try_recv() {
            if let Some(value) = self.accept(generation, value) {
                latest = Some(value);
            }
        }
        latest
    }

    /// Blocks up to `timeout` for the current generation's result.
    pub fn wait(&mut self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.checked_duration_since(Instant::now())?;
            match self.rx.recv_timeout(remaining) {
                Ok((generation, value)) => {
                    if let Some(value) = self.accept(generation, value) {
                        return Some(value);
                    }
                }
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    fn accept(&mut self, generation: u64, value: T) -> Option<T> {
        if generation != self.generation {
            debug!(
                generation,
                current = self.generation,
                "discarded stale background result"
            );
            return None;
        }
        self.pending = false;
        Some(value)
    }
}
