//! Runtime power management seam and the session wake guard.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

/// Runtime power-management hooks exposed by the platform.
///
/// The glue takes a usage reference while a session needs the device powered
/// and hands it back with the deferred autosuspend path when the session
/// ends. Implementations are free to make all of these no-ops.
pub trait RuntimePm: Send + Sync {
    /// Enable runtime power management for the device. Called once at
    /// attach, before any reference is taken.
    fn enable(&self) {}

    /// Take a usage reference, powering the device up if needed.
    fn get(&self);

    /// Drop a usage reference immediately.
    fn put(&self);

    /// Record activity so a following autosuspend is pushed out.
    fn mark_last_busy(&self);

    /// Drop a usage reference via the deferred autosuspend path.
    fn put_autosuspend(&self);
}

/// Runtime PM stub for platforms without a power framework.
#[derive(Debug, Default)]
pub struct NullPm;

impl RuntimePm for NullPm {
    fn get(&self) {}
    fn put(&self) {}
    fn mark_last_busy(&self) {}
    fn put_autosuspend(&self) {}
}

/// Binary wake resource held while a session-relevant line state is active.
///
/// Prevents system-wide low-power suspend between a session-granting mailbox
/// event and the matching session end. Acquire and release are idempotent;
/// state changes are observable for the held ⇔ session-relevant invariant.
#[derive(Debug, Default)]
pub struct WakeGuard {
    held: AtomicBool,
}

impl WakeGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the guard. Acquiring while already held has no effect.
    pub fn acquire(&self) {
        if !self.held.swap(true, Ordering::AcqRel) {
            debug!("session wake guard acquired");
        }
    }

    /// Release the guard. Releasing while not held has no effect.
    pub fn release(&self) {
        if self.held.swap(false, Ordering::AcqRel) {
            debug!("session wake guard released");
        }
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wake_guard_starts_released() {
        let guard = WakeGuard::new();
        assert!(!guard.is_held());
    }

    #[test]
    fn test_wake_guard_acquire_release() {
        let guard = WakeGuard::new();
        guard.acquire();
        assert!(guard.is_held());
        guard.release();
        assert!(!guard.is_held());
    }

    #[test]
    fn test_wake_guard_idempotent() {
        let guard = WakeGuard::new();
        guard.acquire();
        guard.acquire();
        assert!(guard.is_held());
        guard.release();
        guard.release();
        assert!(!guard.is_held());
    }
}
