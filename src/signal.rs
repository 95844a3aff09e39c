//! One-shot cancellation signal.
//!
//! A [`Quit`] starts armed and can be fired exactly once; it never resets.
//! Hot loops poll [`Quit::is_fired`], blocking code selects on
//! [`Quit::receiver`], which disconnects (and so becomes ready) when fired.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct Quit {
    inner: Arc<QuitInner>,
}

struct QuitInner {
    fired: AtomicBool,
    trigger: Mutex<Option<Sender<()>>>,
    rx: Receiver<()>,
}

impl Quit {
    pub fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self {
            inner: Arc::new(QuitInner {
                fired: AtomicBool::new(false),
                trigger: Mutex::new(Some(tx)),
                rx,
            }),
        }
    }

    /// Fire the signal. Idempotent.
    pub fn fire(&self) {
        self.inner.fired.store(true, Ordering::Release);
        // Dropping the only sender disconnects every receiver clone.
        self.inner.trigger.lock().take();
    }

    pub fn is_fired(&self) -> bool {
        self.inner.fired.load(Ordering::Acquire)
    }

    /// Receiver that becomes ready (with a disconnect error) once fired.
    pub fn receiver(&self) -> &Receiver<()> {
        &self.inner.rx
    }

    /// Sleep for up to `timeout`, returning early with `true` if fired.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        match self.inner.rx.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => false,
            _ => true,
        }
    }

    /// Guard that fires this signal when dropped.
    pub fn fire_on_drop(&self) -> QuitGuard {
        QuitGuard(self.clone())
    }
}

impl Default for Quit {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Quit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Quit").field("fired", &self.is_fired()).finish()
    }
}

pub struct QuitGuard(Quit);

impl Drop for QuitGuard {
    fn drop(&mut self) {
        self.0.fire();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::select;
    use std::time::Instant;

    #[test]
    fn test_fire_is_one_shot_and_visible_to_clones() {
        let quit = Quit::new();
        let other = quit.clone();
        assert!(!other.is_fired());
        quit.fire();
        quit.fire();
        assert!(other.is_fired());
        assert!(other.receiver().try_recv().is_err());
    }

    #[test]
    fn test_select_wakes_on_fire() {
        let quit = Quit::new();
        let remote = quit.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            remote.fire();
        });
        let start = Instant::now();
        select! {
            recv(quit.receiver()) -> _ => {},
            default(Duration::from_secs(5)) => panic!("quit signal never fired"),
        }
        assert!(start.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_timeout() {
        let quit = Quit::new();
        assert!(!quit.wait_timeout(Duration::from_millis(5)));
        quit.fire();
        assert!(quit.wait_timeout(Duration::from_secs(5)));
    }

    #[test]
    fn test_guard_fires_on_drop() {
        let quit = Quit::new();
        {
            let _guard = quit.fire_on_drop();
        }
        assert!(quit.is_fired());
    }
}
