use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc, Mutex,
};

use crate::error::{CraneError, Result};
use crate::{
    buffer::manager::BufferManager,
    file::{block_id::BlockId, manager::FileManager},
    log::manager::LogManager,
};

use super::{
    bufferlist::BufferList,
    concurrency::{lock_table::LockTable, manager::ConcurrencyManager},
    recovery::manager::RecoveryManager,
};

static NEXT_TX_NUM: AtomicI64 = AtomicI64::new(0);

#[derive(Debug)]
pub struct Transaction {
    recovery_manager: RecoveryManager,
    concurrency_manager: ConcurrencyManager,
    buffer_manager: Arc<Mutex<BufferManager>>,
    file_manager: Arc<Mutex<FileManager>>,
    buffers: BufferList,
    txnum: i64,
}

/// Provides transaction management for clients: every transaction is
/// serializable and recoverable, in the usual ACID sense.
impl Transaction {
    pub fn new(
        file_manager: Arc<Mutex<FileManager>>,
        log_manager: Arc<Mutex<LogManager>>,
        buffer_manager: Arc<Mutex<BufferManager>>,
        lock_table: Arc<Mutex<LockTable>>,
    ) -> Result<Self> {
        let txnum = NEXT_TX_NUM.fetch_add(1, Ordering::SeqCst);
        let recovery_manager = RecoveryManager::new(
            Arc::clone(&log_manager),
            Arc::clone(&buffer_manager),
            txnum,
        )?;
        let concurrency_manager = ConcurrencyManager::new(Arc::clone(&lock_table));
        let tx_buffers = BufferList::new(Arc::clone(&buffer_manager));

        Ok(Self {
            recovery_manager,
            concurrency_manager,
            buffer_manager,
            file_manager,
            buffers: tx_buffers,
            txnum,
        })
    }

    pub fn tx_num(&self) -> i64 {
        self.txnum
    }

    /// Flushes all modified buffers and their log records, writes and
    /// flushes a commit record, releases all locks, and unpins every
    /// pinned buffer.
    pub fn commit(&mut self) -> Result<()> {
        self.recovery_manager.commit()?;
        self.concurrency_manager.release()?;
        self.buffers.unpin_all()?;
        Ok(())
    }

    /// Undoes every modified value, flushes those buffers, writes and
    /// flushes a rollback record, releases all locks, and unpins every
    /// pinned buffer.
    pub fn rollback(&mut self) -> Result<()> {
        let recovery_manager = self.recovery_manager.clone();
        recovery_manager.rollback(self)?;
        self.concurrency_manager.release()?;
        self.buffers.unpin_all()?;
        Ok(())
    }

    /// Flushes all modified buffers, then rolls back every uncommitted
    /// transaction found in the log and writes a quiescent checkpoint
    /// record. Called once at startup, before user transactions begin.
    pub fn recover(&mut self) -> Result<()> {
        self.buffer_manager.lock().unwrap().flush_all(self.txnum)?;
        let recovery_manager = self.recovery_manager.clone();
        recovery_manager.recover(self)?;
        Ok(())
    }

    pub fn pin(&mut self, block: &BlockId) -> Result<()> {
        self.buffers.pin(block)?;
        Ok(())
    }

    pub fn unpin(&mut self, block: &BlockId) -> Result<()> {
        self.buffers.unpin(block)?;
        Ok(())
    }

    /// Returns the integer at `offset` in `block`, after first obtaining a
    /// shared lock on it.
    pub fn get_int(&mut self, block: &BlockId, offset: usize) -> Result<i32> {
        self.concurrency_manager.slock(block)?;

        let idx = self
            .buffers
            .get_buffer_idx(block)
            .ok_or(CraneError::BufferNotPinned)?;
        self.buffer_manager
            .lock()
            .unwrap()
            .with_buffer_mut(idx, |buf| buf.contents().get_int(offset))?
    }

    /// Returns the string at `offset` in `block`, after first obtaining a
    /// shared lock on it.
    pub fn get_string(&mut self, block: &BlockId, offset: usize) -> Result<String> {
        self.concurrency_manager.slock(block)?;

        let idx = self
            .buffers
            .get_buffer_idx(block)
            .ok_or(CraneError::BufferNotPinned)?;
        self.buffer_manager
            .lock()
            .unwrap()
            .with_buffer_mut(idx, |buf| buf.contents().get_string(offset))?
    }

    /// Stores an integer at `offset` in `block`, after first obtaining an
    /// exclusive lock. When `ok_to_log` is true, the previous value is
    /// written to the log before the buffer is modified.
    pub fn set_int(
        &mut self,
        block: &BlockId,
        offset: usize,
        val: i32,
        ok_to_log: bool,
    ) -> Result<()> {
        self.concurrency_manager.xlock(block)?;

        let idx = self
            .buffers
            .get_buffer_idx(block)
            .ok_or(CraneError::BufferNotPinned)?;

        self.buffer_manager
            .lock()
            .unwrap()
            .with_buffer_mut(idx, |buf| -> Result<()> {
                let mut lsn = -1;
                if ok_to_log {
                    lsn = self.recovery_manager.set_int(buf, offset, val)?;
                }
                buf.contents_mut().set_int(offset, val)?;
                buf.set_modified(self.txnum, lsn)?;
                Ok(())
            })?
    }

    /// Stores a string at `offset` in `block`, after first obtaining an
    /// exclusive lock. When `ok_to_log` is true, the previous value is
    /// written to the log before the buffer is modified.
    pub fn set_string(
        &mut self,
        block: &BlockId,
        offset: usize,
        val: &str,
        ok_to_log: bool,
    ) -> Result<()> {
        self.concurrency_manager.xlock(block)?;

        let idx = self
            .buffers
            .get_buffer_idx(block)
            .ok_or(CraneError::BufferNotPinned)?;

        self.buffer_manager
            .lock()
            .unwrap()
            .with_buffer_mut(idx, |buf| -> Result<()> {
                let mut lsn = -1;
                if ok_to_log {
                    lsn = self.recovery_manager.set_string(buf, offset, val)?;
                }
                buf.contents_mut().set_string(offset, val)?;
                buf.set_modified(self.txnum, lsn)?;
                Ok(())
            })?
    }

    /// Returns the number of blocks in `filename`, after first obtaining a
    /// shared lock on the file's end-of-file sentinel block.
    pub fn size(&mut self, filename: &str) -> Result<usize> {
        let dummy_block = BlockId::end_of_file(filename);
        self.concurrency_manager.slock(&dummy_block)?;
        self.file_manager.lock().unwrap().total_blocks(filename)
    }

    /// Appends a new block to `filename` and returns it, after first
    /// obtaining an exclusive lock on the file's end-of-file sentinel
    /// block.
    pub fn append(&mut self, filename: &str) -> Result<BlockId> {
        let dummy_block = BlockId::end_of_file(filename);
        self.concurrency_manager.xlock(&dummy_block)?;
        self.file_manager.lock().unwrap().append(filename)
    }

    pub fn block_size(&self) -> usize {
        self.file_manager.lock().unwrap().block_size()
    }

    pub fn available_buffs(&self) -> usize {
        self.buffer_manager.lock().unwrap().available()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use tempfile::tempdir;

    use crate::{
        buffer::manager::BufferManager, file::block_id::BlockId, file::manager::FileManager,
        log::manager::LogManager, tx::concurrency::lock_table::LockTable,
    };

    use super::Transaction;

    #[test]
    fn test_transaction_lifecycle() {
        let temp_dir = tempdir().unwrap();
        let db_dir = temp_dir.path().to_str().unwrap();
        let test_file = "simpledb.log";

        let block_size = 400;
        let num_buffers = 8;

        let file_manager = Arc::new(Mutex::new(FileManager::new(db_dir, block_size).unwrap()));
        let log_manager = Arc::new(Mutex::new(
            LogManager::new(Arc::clone(&file_manager), test_file).unwrap(),
        ));
        let buffer_manager = Arc::new(Mutex::new(BufferManager::new(
            Arc::clone(&file_manager),
            Arc::clone(&log_manager),
            num_buffers,
            Duration::from_secs(10),
        )));

        let lock_table = Arc::new(Mutex::new(LockTable::new()));

        // The block initially contains unknown bytes, so we don't log the initial values
        let block = BlockId::new("testfile", 1);

        // Transaction 1: Initialize the block's values
        let mut tx1 = Transaction::new(
            Arc::clone(&file_manager),
            Arc::clone(&log_manager),
            Arc::clone(&buffer_manager),
            Arc::clone(&lock_table),
        )
        .unwrap();

        tx1.pin(&block).unwrap();
        tx1.set_int(&block, 80, 1, false).unwrap();
        tx1.set_string(&block, 40, "one", false).unwrap();
        tx1.commit().unwrap();

        // Transaction 2: Read initial values and modify them
        let mut tx2 = Transaction::new(
            Arc::clone(&file_manager),
            Arc::clone(&log_manager),
            Arc::clone(&buffer_manager),
            Arc::clone(&lock_table),
        )
        .unwrap();

        tx2.pin(&block).unwrap();

        let ival = tx2.get_int(&block, 80).unwrap();
        let sval = tx2.get_string(&block, 40).unwrap();
        assert_eq!(ival, 1, "Initial integer value should be 1");
        assert_eq!(sval, "one", "Initial string value should be 'one'");

        tx2.set_int(&block, 80, ival + 1, true).unwrap();
        tx2.set_string(&block, 40, &format!("{}!", sval), true)
            .unwrap();
        tx2.commit().unwrap();

        // Transaction 3: Verify modifications and test rollback
        let mut tx3 = Transaction::new(
            Arc::clone(&file_manager),
            Arc::clone(&log_manager),
            Arc::clone(&buffer_manager),
            Arc::clone(&lock_table),
        )
        .unwrap();

        tx3.pin(&block).unwrap();

        assert_eq!(
            tx3.get_int(&block, 80).unwrap(),
            2,
            "Integer should be incremented to 2"
        );
        assert_eq!(
            tx3.get_string(&block, 40).unwrap(),
            "one!",
            "String should have exclamation mark added"
        );

        tx3.set_int(&block, 80, 9999, true).unwrap();
        assert_eq!(tx3.get_int(&block, 80).unwrap(), 9999, "Value should be 9999");

        tx3.rollback().unwrap();

        // Transaction 4: Verify rollback was successful
        let mut tx4 = Transaction::new(
            Arc::clone(&file_manager),
            Arc::clone(&log_manager),
            Arc::clone(&buffer_manager),
            Arc::clone(&lock_table),
        )
        .unwrap();

        tx4.pin(&block).unwrap();

        assert_eq!(
            tx4.get_int(&block, 80).unwrap(),
            2,
            "After rollback, integer should be back to 2"
        );
        tx4.commit().unwrap();
    }

    #[test]
    fn append_uses_end_of_file_sentinel_not_negative_cast() {
        let temp_dir = tempdir().unwrap();
        let file_manager = Arc::new(Mutex::new(
            FileManager::new(temp_dir.path().to_str().unwrap(), 128).unwrap(),
        ));
        let log_manager = Arc::new(Mutex::new(
            LogManager::new(Arc::clone(&file_manager), "append.log").unwrap(),
        ));
        let buffer_manager = Arc::new(Mutex::new(BufferManager::new(
            Arc::clone(&file_manager),
            Arc::clone(&log_manager),
            4,
            Duration::from_secs(5),
        )));
        let lock_table = Arc::new(Mutex::new(LockTable::new()));

        let mut tx = Transaction::new(
            Arc::clone(&file_manager),
            Arc::clone(&log_manager),
            Arc::clone(&buffer_manager),
            Arc::clone(&lock_table),
        )
        .unwrap();

        let b0 = tx.append("growing.tbl").unwrap();
        let b1 = tx.append("growing.tbl").unwrap();
        assert_eq!(b0.block_number(), 0);
        assert_eq!(b1.block_number(), 1);
        assert_eq!(tx.size("growing.tbl").unwrap(), 2);
        tx.commit().unwrap();
    }
}
