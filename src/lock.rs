use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};

/// Reader/writer lock with explicit acquire and release.
///
/// Unlike `std::sync::RwLock` there is no guard borrowing the lock, so a
/// holder can stash the lock behind an `Arc` and release it from a different
/// scope. The registry relies on this to materialize locks on demand.
pub struct RawRwLock {
    state: Mutex<LockState>,
    cond: Condvar,
}

#[derive(Default)]
struct LockState {
    readers: u32,
    writer: bool,
}

impl RawRwLock {
    fn new() -> Self {
        Self { state: Mutex::new(LockState::default()), cond: Condvar::new() }
    }

    pub fn lock_shared(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        while state.writer {
            state = self.cond.wait(state).unwrap_or_else(|e| e.into_inner());
        }
        state.readers += 1;
    }

    pub fn try_lock_shared(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.writer {
            return false;
        }
        state.readers += 1;
        true
    }

    pub fn unlock_shared(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        debug_assert!(state.readers > 0);
        state.readers -= 1;
        if state.readers == 0 {
            self.cond.notify_all();
        }
    }

    pub fn lock_unique(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        while state.writer || state.readers > 0 {
            state = self.cond.wait(state).unwrap_or_else(|e| e.into_inner());
        }
        state.writer = true;
    }

    pub fn try_lock_unique(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.writer || state.readers > 0 {
            return false;
        }
        state.writer = true;
        true
    }

    pub fn unlock_unique(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        debug_assert!(state.writer);
        state.writer = false;
        self.cond.notify_all();
    }
}

/// Lazily materialized per-list locks, keyed by list id.
///
/// A table may hold millions of lists, nearly all idle; an entry exists here
/// only while some thread holds or waits for that list's lock. The registry
/// mutex is held just long enough to bump the refcount and clone the lock,
/// never while blocking on the lock itself.
pub struct LockRegistry {
    entries: Mutex<HashMap<u64, RegistryEntry>>,
}

struct RegistryEntry {
    lock: Arc<RawRwLock>,
    refs: u32,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self { entries: Mutex::new(HashMap::new()) }
    }

    /// Number of lists currently contended (locks materialized).
    pub fn num_active(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn lock_shared(&self, id: u64) -> LockToken {
        let lock = self.retain(id);
        lock.lock_shared();
        LockToken { id, lock, shared: true }
    }

    pub fn lock_unique(&self, id: u64) -> LockToken {
        let lock = self.retain(id);
        lock.lock_unique();
        LockToken { id, lock, shared: false }
    }

    pub fn try_lock_shared(&self, id: u64) -> Option<LockToken> {
        let lock = self.retain(id);
        if lock.try_lock_shared() {
            Some(LockToken { id, lock, shared: true })
        } else {
            self.release(id);
            None
        }
    }

    pub fn try_lock_unique(&self, id: u64) -> Option<LockToken> {
        let lock = self.retain(id);
        if lock.try_lock_unique() {
            Some(LockToken { id, lock, shared: false })
        } else {
            self.release(id);
            None
        }
    }

    /// Releases the token's hold; called from [`LockToken::drop`].
    fn unlock(&self, token: &LockToken) {
        if token.shared {
            token.lock.unlock_shared();
        } else {
            token.lock.unlock_unique();
        }
        self.release(token.id);
    }

    fn retain(&self, id: u64) -> Arc<RawRwLock> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let entry = entries
            .entry(id)
            .or_insert_with(|| RegistryEntry { lock: Arc::new(RawRwLock::new()), refs: 0 });
        entry.refs += 1;
        Arc::clone(&entry.lock)
    }

    fn release(&self, id: u64) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let entry = entries.get_mut(&id).expect("released lock must be registered");
        entry.refs -= 1;
        if entry.refs == 0 {
            entries.remove(&id);
        }
    }
}

impl Default for LockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A held shared or unique lock on one list. Releasing goes through
/// [`LockToken::release`] so the registry entry can be dropped when the last
/// holder leaves.
pub struct LockToken {
    id: u64,
    lock: Arc<RawRwLock>,
    shared: bool,
}

impl LockToken {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_shared(&self) -> bool {
        self.shared
    }

    /// Hands the token back to its registry. Must be called instead of
    /// dropping; the table's guards do this in their own `Drop`.
    pub fn release(self, registry: &LockRegistry) {
        registry.unlock(&self);
    }
}
