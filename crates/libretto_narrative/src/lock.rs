//! Reference-counted gate that pauses game progress.

use std::cell::Cell;
use std::rc::Rc;
use tracing::debug;

/// Coarse backpressure gate. `next()` returns `Locked` while any guard is alive.
///
/// # Examples
///
/// ```
/// use libretto_narrative::GameLock;
///
/// let lock = GameLock::new();
/// let guard = lock.acquire();
/// assert!(lock.is_locked());
/// drop(guard);
/// assert!(!lock.is_locked());
/// ```
#[derive(Debug, Clone, Default)]
pub struct GameLock {
    holders: Rc<Cell<usize>>,
}

impl GameLock {
    /// Unlocked gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold the gate until the returned guard is dropped.
    pub fn acquire(&self) -> GameLockGuard {
        let holders = self.holders.get() + 1;
        self.holders.set(holders);
        debug!(holders, "Game lock acquired");
        GameLockGuard { lock: self.clone() }
    }

    /// Whether any guard is alive.
    pub fn is_locked(&self) -> bool {
        self.holders.get() > 0
    }

    /// Number of live guards.
    pub fn holders(&self) -> usize {
        self.holders.get()
    }
}

/// RAII handle on a [`GameLock`].
#[derive(Debug)]
pub struct GameLockGuard {
    lock: GameLock,
}

impl Drop for GameLockGuard {
    fn drop(&mut self) {
        let holders = self.lock.holders.get().saturating_sub(1);
        self.lock.holders.set(holders);
        debug!(holders, "Game lock released");
    }
}
