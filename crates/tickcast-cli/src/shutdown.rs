use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Shutdown flag with interruptible waits.
///
/// The retry sleeps in the attach loop must wake immediately on Ctrl+C, so
/// waits go through a condvar instead of `thread::sleep()`. The flag itself
/// is an atomic so the tracker loop can poll it without locking.
pub struct ShutdownSignal {
    flag: AtomicBool,
    gate: Mutex<()>,
    wakeup: Condvar,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self {
            flag: AtomicBool::new(false),
            gate: Mutex::new(()),
            wakeup: Condvar::new(),
        }
    }

    /// Raise the flag and wake every waiting thread.
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.wakeup.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` or until triggered. Returns `true` when shutdown
    /// has been requested.
    pub fn wait(&self, duration: Duration) -> bool {
        let Ok(guard) = self.gate.lock() else {
            // Poisoned lock: some thread panicked, stop the world.
            return true;
        };
        match self
            .wakeup
            .wait_timeout_while(guard, duration, |_| !self.is_shutdown())
        {
            Ok(_) => self.is_shutdown(),
            Err(_) => true,
        }
    }

    /// The raw flag, for loops that only poll.
    pub fn as_atomic(&self) -> &AtomicBool {
        &self.flag
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_starts_clear() {
        let signal = ShutdownSignal::new();
        assert!(!signal.is_shutdown());
        assert!(!signal.as_atomic().load(Ordering::SeqCst));
    }

    #[test]
    fn test_wait_times_out_when_not_triggered() {
        let signal = ShutdownSignal::new();
        assert!(!signal.wait(Duration::from_millis(20)));
    }

    #[test]
    fn test_trigger_interrupts_wait() {
        let signal = Arc::new(ShutdownSignal::new());
        let waiter = Arc::clone(&signal);
        let handle = thread::spawn(move || {
            let start = Instant::now();
            (waiter.wait(Duration::from_secs(10)), start.elapsed())
        });

        thread::sleep(Duration::from_millis(50));
        signal.trigger();

        let (interrupted, elapsed) = handle.join().unwrap();
        assert!(interrupted);
        assert!(elapsed < Duration::from_secs(1));
    }

    #[test]
    fn test_wait_after_trigger_returns_immediately() {
        let signal = ShutdownSignal::new();
        signal.trigger();
        let start = Instant::now();
        assert!(signal.wait(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
