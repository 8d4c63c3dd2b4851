//! Reader/writer lock guarding a local replica file
//!
//! Any number of readers may hold the lock together; a writer holds it alone.
//! A writer that starts waiting blocks new readers immediately and then waits
//! for the readers already admitted to drain, so a sync never overlaps a read
//! and is never overtaken by reads that arrive after it.
//!
//! Acquisition returns a guard; the lock is released when the guard drops,
//! including on early returns and panics.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct LockState {
    readers: usize,
    /// Set from the moment a writer starts waiting until it releases.
    writer: bool,
}

/// Per-alias reader/writer lock.
#[derive(Debug, Default)]
pub struct ReplicaLock {
    state: Mutex<LockState>,
    changed: Condvar,
}

impl ReplicaLock {
    pub fn new() -> Self {
        Self::default()
    }

    // The guarded state is two counters that are never left half-updated,
    // so a poisoned mutex is still consistent.
    fn state(&self) -> MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, LockState>) -> MutexGuard<'a, LockState> {
        self.changed
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Block while a writer holds or waits for the lock, then register a reader.
    pub fn acquire_read(&self) {
        let mut state = self.state();
        while state.writer {
            state = self.wait(state);
        }
        state.readers += 1;
    }

    /// Unregister a reader; the last reader out wakes waiting writers.
    pub fn release_read(&self) {
        let mut state = self.state();
        state.readers = state.readers.saturating_sub(1);
        if state.readers == 0 {
            self.changed.notify_all();
        }
    }

    /// Claim the writer slot, then wait for admitted readers to drain.
    pub fn acquire_write(&self) {
        let mut state = self.state();
        while state.writer {
            state = self.wait(state);
        }
        state.writer = true;
        while state.readers > 0 {
            state = self.wait(state);
        }
    }

    /// Clear the writer slot and wake everyone waiting.
    pub fn release_write(&self) {
        let mut state = self.state();
        state.writer = false;
        self.changed.notify_all();
    }

    /// Scoped shared access.
    pub fn read(&self) -> ReadGuard<'_> {
        self.acquire_read();
        ReadGuard { lock: self }
    }

    /// Scoped exclusive access.
    pub fn write(&self) -> WriteGuard<'_> {
        self.acquire_write();
        WriteGuard { lock: self }
    }

    /// Number of readers currently admitted.
    pub fn readers(&self) -> usize {
        self.state().readers
    }

    /// Whether a writer holds or is waiting for the lock.
    pub fn is_write_locked(&self) -> bool {
        self.state().writer
    }
}

/// Shared permit; releases on drop.
#[derive(Debug)]
#[must_use = "the read lock is released as soon as the guard is dropped"]
pub struct ReadGuard<'a> {
    lock: &'a ReplicaLock,
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.lock.release_read();
    }
}

/// Exclusive permit; releases on drop.
#[derive(Debug)]
#[must_use = "the write lock is released as soon as the guard is dropped"]
pub struct WriteGuard<'a> {
    lock: &'a ReplicaLock,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.lock.release_write();
    }
}
