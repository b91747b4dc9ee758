use std::{
    sync::{Arc, Condvar, Mutex},
    time::{Duration, Instant},
};

use crate::error::{CraneError, Result};
use crate::{
    file::{block_id::BlockId, manager::FileManager},
    log::manager::LogManager,
};

use super::buffer::Buffer;

/// `pin` re-checks the wait condition at least this often instead of
/// blocking for the whole configured timeout in one `wait_timeout` call, so
/// a buffer freed just after the deadline still has a chance to be noticed
/// promptly by a caller with a longer timeout.
const WATCHDOG_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug)]
pub struct BufferPoolState {
    buffer_pool: Vec<Buffer>,
    num_available: usize,
}

#[derive(Debug)]
pub struct BufferManager {
    state: Arc<(Mutex<BufferPoolState>, Condvar)>,
    wait_timeout: Duration,
}

impl BufferManager {
    pub fn new(
        file_manager: Arc<Mutex<FileManager>>,
        log_manager: Arc<Mutex<LogManager>>,
        num_buffers: usize,
        wait_timeout: Duration,
    ) -> Self {
        let buffers = (0..num_buffers)
            .map(|_| Buffer::new(Arc::clone(&file_manager), Arc::clone(&log_manager)))
            .collect();

        let state = BufferPoolState {
            buffer_pool: buffers,
            num_available: num_buffers,
        };

        Self {
            state: Arc::new((Mutex::new(state), Condvar::new())),
            wait_timeout,
        }
    }

    pub fn available(&self) -> usize {
        let (lock, _) = &*self.state;
        let state = lock.lock().unwrap();
        state.num_available
    }

    pub fn unpin(&self, idx: usize) -> Result<()> {
        let (lock, cvar) = &*self.state;
        let mut state = lock.lock().unwrap();

        state.buffer_pool[idx].unpin();
        if !state.buffer_pool[idx].is_pinned() {
            state.num_available += 1;
            cvar.notify_all();
        }
        Ok(())
    }

    /// Pins `block` to some frame, waiting for one to free up if the pool
    /// is full. Re-checks every [`WATCHDOG_INTERVAL`] rather than sleeping
    /// for the whole timeout in one shot, and gives up with `BufferAbort`
    /// once the cumulative wait passes `wait_timeout`.
    pub fn pin(&self, block: &BlockId) -> Result<usize> {
        let (lock, cvar) = &*self.state;
        let mut state = lock.lock().unwrap();
        let deadline = Instant::now() + self.wait_timeout;

        loop {
            if let Some(idx) = self.try_to_pin(block, &mut state) {
                return Ok(idx);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(CraneError::BufferAbort.into());
            }

            let slice = remaining.min(WATCHDOG_INTERVAL);
            let (new_state, _) = cvar
                .wait_timeout(state, slice)
                .map_err(|_| CraneError::BufferAbort)?;
            state = new_state;
        }
    }

    /// Flushes every buffer currently modified by `txnum`.
    pub fn flush_all(&self, txnum: i64) -> Result<()> {
        let (lock, cvar) = &*self.state;
        let mut state = lock.lock().unwrap();

        let result = state
            .buffer_pool
            .iter_mut()
            .filter(|buf| buf.txnum == txnum)
            .try_for_each(|buf| buf.flush());

        cvar.notify_all();
        result
    }

    /// Runs `f` against the buffer at `idx` while holding the pool lock,
    /// without exposing the pool's internal lock/condvar pair to callers
    /// outside this module.
    pub fn with_buffer_mut<T>(&self, idx: usize, f: impl FnOnce(&mut Buffer) -> T) -> Result<T> {
        let (lock, _) = &*self.state;
        let mut state = lock.lock().unwrap();
        Ok(f(&mut state.buffer_pool[idx]))
    }

    fn try_to_pin<'a>(&self, block: &'a BlockId, state: &'a mut BufferPoolState) -> Option<usize> {
        if let Some(idx) = self.find_existing_buffer(block, state) {
            if !state.buffer_pool[idx].is_pinned() {
                state.num_available -= 1;
            }
            state.buffer_pool[idx].pin();
            return Some(idx);
        }

        if let Some(idx) = self.find_unpinned_buffer(state) {
            state.buffer_pool[idx].assign_to_block(block).ok()?;
            state.num_available -= 1;
            state.buffer_pool[idx].pin();
            return Some(idx);
        }

        None
    }

    fn find_existing_buffer<'a>(
        &self,
        block: &'a BlockId,
        state: &'a BufferPoolState,
    ) -> Option<usize> {
        state
            .buffer_pool
            .iter()
            .enumerate()
            .find(|(_, buffer)| buffer.block() == Some(block))
            .map(|(idx, _)| idx)
    }

    fn find_unpinned_buffer(&self, state: &BufferPoolState) -> Option<usize> {
        state
            .buffer_pool
            .iter()
            .enumerate()
            .find(|(_, buffer)| !buffer.is_pinned())
            .map(|(idx, _)| idx)
    }
}
