use core::hint::spin_loop;
use core::sync::atomic::{AtomicBool, Ordering};

/// Spinlock without associated data.
///
/// `acquire` spins until the lock is held by the caller; `release` hands it
/// back. Pairing the two is the caller's job, see [`SpinLock`](crate::SpinLock)
/// for the guarded variant.
pub struct RawSpin {
    held: AtomicBool,
}

impl Default for RawSpin {
    fn default() -> Self {
        Self::new()
    }
}

impl RawSpin {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            held: AtomicBool::new(false),
        }
    }

    /// Spin until the lock is taken.
    #[inline]
    pub fn acquire(&self) {
        while self.held.swap(true, Ordering::Acquire) {
            // Spin on a plain load so contended waiters don't bounce the cache line.
            while self.held.load(Ordering::Relaxed) {
                spin_loop();
            }
        }
    }

    /// Take the lock if it is free; never spins.
    #[inline]
    pub fn try_acquire(&self) -> bool {
        !self.held.swap(true, Ordering::Acquire)
    }

    /// Release the lock.
    ///
    /// # Safety
    /// The caller must currently hold the lock through a matching
    /// [`acquire`](Self::acquire) or successful [`try_acquire`](Self::try_acquire).
    #[inline]
    pub unsafe fn release(&self) {
        self.held.store(false, Ordering::Release);
    }

    /// Snapshot of the lock state. Stale as soon as it returns.
    #[inline]
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Relaxed)
    }
}
