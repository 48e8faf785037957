use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Search generation counter plus cooperative stop flag.
///
/// Every background task captures the generation it was started under and
/// calls [`Generations::is_live`] before each side effect. A mismatch means
/// the task belongs to an abandoned search and must do nothing further.
#[derive(Debug, Default)]
pub struct Generations {
    current: AtomicU64,
    stopped: AtomicBool,
}

impl Generations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_new_search(&self) -> u64 {
        let generation = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.stopped.store(false, Ordering::SeqCst);
        generation
    }

    /// Raises the stop flag and invalidates everything in flight.
    pub fn request_stop(&self) -> u64 {
        self.stopped.store(true, Ordering::SeqCst);
        self.current.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current_generation(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn is_live(&self, generation: u64) -> bool {
        !self.is_stopped() && self.current_generation() == generation
    }
}
