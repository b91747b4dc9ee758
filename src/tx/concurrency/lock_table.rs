use std::{
    collections::HashMap,
    sync::{Arc, Condvar, Mutex},
    time::{Duration, Instant},
};

use crate::error::{CraneError, Result};
use crate::file::block_id::BlockId;

#[derive(Debug, PartialEq)]
enum Lock {
    Exclusive,
    Shared(usize),
}

/// Block-granularity shared/exclusive locks shared by every transaction in
/// the process. One condition variable is shared by all blocks: a waiter
/// always re-checks its own block's state on every wake, so the spurious
/// wakeups this causes are harmless, just wasted cycles under heavy
/// contention on unrelated blocks.
#[derive(Debug, Clone)]
pub struct LockTable {
    state: Arc<(Mutex<HashMap<BlockId, Lock>>, Condvar)>,
    wait_timeout: Duration,
}

impl LockTable {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(10))
    }

    pub fn with_timeout(wait_timeout: Duration) -> Self {
        Self {
            state: Arc::new((Mutex::new(HashMap::new()), Condvar::new())),
            wait_timeout,
        }
    }

    /// If an xlock exists when the method is called, the calling thread
    /// waits until it is released or the timeout expires.
    pub fn slock(&self, block: &BlockId) -> Result<()> {
        let (lock, cvar) = &*self.state;
        let mut locks = lock.lock().unwrap();
        let deadline = Instant::now() + self.wait_timeout;

        loop {
            match locks.get(block) {
                Some(Lock::Exclusive) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(CraneError::LockAbort.into());
                    }
                    let (new_locks, _) = cvar
                        .wait_timeout(locks, remaining)
                        .map_err(|_| CraneError::LockAbort)?;
                    locks = new_locks;
                }
                Some(Lock::Shared(count)) => {
                    let new_count = *count + 1;
                    locks.insert(block.clone(), Lock::Shared(new_count));
                    return Ok(());
                }
                None => {
                    locks.insert(block.clone(), Lock::Shared(1));
                    return Ok(());
                }
            }
        }
    }

    /// If any lock exists when the method is called, the calling thread
    /// waits until all of them are released or the timeout expires.
    pub fn xlock(&self, block: &BlockId) -> Result<()> {
        let (lock, cvar) = &*self.state;
        let mut locks = lock.lock().unwrap();
        let deadline = Instant::now() + self.wait_timeout;

        loop {
            match locks.get(block) {
                Some(Lock::Shared(count)) if *count > 1 => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(CraneError::LockAbort.into());
                    }
                    let (new_locks, _) = cvar
                        .wait_timeout(locks, remaining)
                        .map_err(|_| CraneError::LockAbort)?;
                    locks = new_locks;
                }
                _ => {
                    locks.insert(block.clone(), Lock::Exclusive);
                    return Ok(());
                }
            }
        }
    }

    /// Releases one instance of whatever lock this caller holds on `block`.
    /// Fails with `LockDoNotExist` if no lock is registered for it, rather
    /// than silently no-opping.
    pub fn unlock(&self, block: &BlockId) -> Result<()> {
        let (lock, cvar) = &*self.state;
        let mut locks = lock.lock().unwrap();

        match locks.get(block) {
            None => return Err(CraneError::LockDoNotExist.into()),
            Some(Lock::Shared(count)) if *count > 1 => {
                let new_count = *count - 1;
                locks.insert(block.clone(), Lock::Shared(new_count));
            }
            _ => {
                locks.remove(block);
                cvar.notify_all();
            }
        }
        Ok(())
    }

    pub fn has_xlock(&self, block: &BlockId) -> bool {
        let (lock, _) = &*self.state;
        matches!(lock.lock().unwrap().get(block), Some(Lock::Exclusive))
    }

    pub fn has_slock(&self, block: &BlockId) -> bool {
        let (lock, _) = &*self.state;
        matches!(lock.lock().unwrap().get(block), Some(Lock::Shared(_)))
    }
}

impl Default for LockTable {
    fn default() -> Self {
        Self::new()
    }
}
