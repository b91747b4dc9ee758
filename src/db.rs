use std::sync::{Arc, Mutex};

use log::info;

use crate::error::Result;
use crate::{
    buffer::manager::BufferManager,
    config::CraneConfig,
    file::manager::FileManager,
    log::manager::LogManager,
    tx::{concurrency::lock_table::LockTable, transaction::Transaction},
};

/// Owns the shared managers every transaction is built from, and runs the
/// startup protocol once at construction: create the database directory if
/// absent, open a bootstrap transaction, recover, and commit it before
/// handing out user transactions.
#[derive(Debug)]
pub struct CraneDb {
    config: CraneConfig,
    file_manager: Arc<Mutex<FileManager>>,
    log_manager: Arc<Mutex<LogManager>>,
    buffer_manager: Arc<Mutex<BufferManager>>,
    lock_table: Arc<Mutex<LockTable>>,
}

impl CraneDb {
    pub fn open(config: CraneConfig) -> Result<Self> {
        config.validate()?;

        let file_manager = Arc::new(Mutex::new(FileManager::new(
            config.db_dir.to_str().unwrap_or("."),
            config.block_size,
        )?));
        let log_manager = Arc::new(Mutex::new(LogManager::new(
            Arc::clone(&file_manager),
            &config.log_file,
        )?));
        let buffer_manager = Arc::new(Mutex::new(BufferManager::new(
            Arc::clone(&file_manager),
            Arc::clone(&log_manager),
            config.num_buffers,
            config.buffer_wait_timeout,
        )));
        let lock_table = Arc::new(Mutex::new(LockTable::with_timeout(
            config.lock_wait_timeout,
        )));

        let db = Self {
            config,
            file_manager,
            log_manager,
            buffer_manager,
            lock_table,
        };

        let mut bootstrap = db.new_transaction()?;
        bootstrap.recover()?;
        bootstrap.commit()?;
        info!("recovery complete, database ready");

        Ok(db)
    }

    pub fn config(&self) -> &CraneConfig {
        &self.config
    }

    pub fn new_transaction(&self) -> Result<Transaction> {
        Transaction::new(
            Arc::clone(&self.file_manager),
            Arc::clone(&self.log_manager),
            Arc::clone(&self.buffer_manager),
            Arc::clone(&self.lock_table),
        )
    }
}
