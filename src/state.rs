use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Latest error of one category. The flag is readable without locking; the
/// message is copied out under a short lock.
#[derive(Debug, Default)]
pub struct ErrorSlot {
    flag: AtomicBool,
    message: Mutex<String>,
}

impl ErrorSlot {
    pub fn set(&self, message: impl Into<String>) {
        if let Ok(mut slot) = self.message.lock() {
            *slot = message.into();
        }
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
        if let Ok(mut slot) = self.message.lock() {
            slot.clear();
        }
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn message(&self) -> Option<String> {
        if !self.is_set() {
            return None;
        }
        self.message.lock().ok().map(|message| message.clone())
    }
}
