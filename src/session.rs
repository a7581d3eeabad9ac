use crate::generator::{GenerationParams, GenerationRequest, PatternGenerator};
use crate::grid::Grid;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Result of polling a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPoll {
    Pending,
    Ready(Grid),
    /// Cancelled, or the worker went away without a result.
    Abandoned,
}

/// One in-flight generation on the rayon pool.
///
/// The worker never touches editor state; it sends the finished grid back over
/// a channel. Cancelling (or dropping the session) raises a flag the worker
/// checks between rows, and a cancelled session never yields a grid.
#[derive(Debug)]
pub struct GenerationSession {
    id: u64,
    params: GenerationParams,
    cache_key: Option<String>,
    cancel: Arc<AtomicBool>,
    receiver: Receiver<Grid>,
    started: Instant,
}

impl GenerationSession {
    pub fn start(id: u64, generator: PatternGenerator, request: GenerationRequest) -> Self {
        let cancel = Arc::new(AtomicBool::new(false));
        let (sender, receiver) = mpsc::channel();
        let params = request.params;
        let flag = Arc::clone(&cancel);

        rayon::spawn(move || {
            let grid = match generator.generate_cancellable(&request.image, &params, &flag) {
                Ok(Some(grid)) => grid,
                Ok(None) => {
                    log::debug!("Generation session {} stopped early", id);
                    return;
                }
                Err(err) => {
                    log::error!("Generation session {} failed: {}", id, err);
                    Grid::empty(params.grid_size())
                }
            };
            if flag.load(Ordering::Relaxed) {
                return;
            }
            // The session may already be gone; nothing to deliver to then.
            let _ = sender.send(grid);
        });

        Self {
            id,
            params,
            cache_key: None,
            cancel,
            receiver,
            started: Instant::now(),
        }
    }

    /// A session that is already complete, used for cache hits.
    pub fn ready(id: u64, params: GenerationParams, grid: Grid) -> Self {
        let (sender, receiver) = mpsc::channel();
        let _ = sender.send(grid);
        Self {
            id,
            params,
            cache_key: None,
            cancel: Arc::new(AtomicBool::new(false)),
            receiver,
            started: Instant::now(),
        }
    }

    pub fn with_cache_key(mut self, key: String) -> Self {
        self.cache_key = Some(key);
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn params(&self) -> &GenerationParams {
        &self.params
    }

    pub fn cache_key(&self) -> Option<&str> {
        self.cache_key.as_deref()
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    pub fn try_take(&self) -> SessionPoll {
        if self.is_cancelled() {
            return SessionPoll::Abandoned;
        }
        match self.receiver.try_recv() {
            Ok(grid) => SessionPoll::Ready(grid),
            Err(TryRecvError::Empty) => SessionPoll::Pending,
            Err(TryRecvError::Disconnected) => SessionPoll::Abandoned,
        }
    }

    /// Block until the worker finishes. `None` if cancelled.
    pub fn wait(&self) -> Option<Grid> {
        if self.is_cancelled() {
            return None;
        }
        let grid = self.receiver.recv().ok()?;
        (!self.is_cancelled()).then_some(grid)
    }

    pub fn wait_timeout(&self, timeout: Duration) -> SessionPoll {
        if self.is_cancelled() {
            return SessionPoll::Abandoned;
        }
        match self.receiver.recv_timeout(timeout) {
            Ok(grid) if !self.is_cancelled() => SessionPoll::Ready(grid),
            Ok(_) => SessionPoll::Abandoned,
            Err(RecvTimeoutError::Timeout) => SessionPoll::Pending,
            Err(RecvTimeoutError::Disconnected) => SessionPoll::Abandoned,
        }
    }
}

impl Drop for GenerationSession {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Small LRU of finished grids keyed by [`request_cache_key`](crate::generator::request_cache_key).
#[derive(Debug, Clone, Default)]
pub struct GenerationCache {
    capacity: usize,
    entries: VecDeque<(String, Grid)>,
}

impl GenerationCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&mut self, key: &str) -> Option<Grid> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        let entry = self.entries.remove(idx)?;
        let grid = entry.1.clone();
        self.entries.push_back(entry);
        Some(grid)
    }

    pub fn insert(&mut self, key: String, grid: Grid) {
        if self.capacity == 0 {
            return;
        }
        self.entries.retain(|(k, _)| *k != key);
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back((key, grid));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
