use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::{
    file::{block_id::BlockId, manager::FileManager, page::Page},
    log::manager::LogManager,
    Lsn,
};

/// One frame in the buffer pool: a page-sized chunk of memory currently
/// assigned to at most one disk block, plus enough bookkeeping to know
/// whether it's dirty and how many transactions have it pinned.
#[derive(Debug, Clone)]
pub struct Buffer {
    file_manager: Arc<Mutex<FileManager>>,
    log_manager: Arc<Mutex<LogManager>>,
    contents: Page,
    block: Option<BlockId>,
    pins: u32,
    pub txnum: Lsn,
    lsn: Lsn,
}

impl Buffer {
    pub fn new(file_manager: Arc<Mutex<FileManager>>, log_manager: Arc<Mutex<LogManager>>) -> Self {
        let block_size = file_manager.lock().unwrap().block_size();
        Self {
            file_manager,
            log_manager,
            contents: Page::new(block_size),
            block: None,
            pins: 0,
            txnum: -1,
            lsn: -1,
        }
    }

    pub fn block(&self) -> Option<&BlockId> {
        self.block.as_ref()
    }

    pub fn contents(&self) -> &Page {
        &self.contents
    }

    pub fn contents_mut(&mut self) -> &mut Page {
        &mut self.contents
    }

    pub fn set_modified(&mut self, txnum: i64, lsn: Lsn) -> Result<()> {
        self.txnum = txnum;
        if lsn >= 0 {
            self.lsn = lsn;
        }

        Ok(())
    }

    /// Forces the WAL record protecting this buffer to disk before the
    /// buffer's own contents, if it is dirty.
    pub fn flush(&mut self) -> Result<()> {
        if self.txnum >= 0 {
            self.log_manager.lock().unwrap().flush(self.lsn)?;
            if let Some(block) = &self.block {
                self.file_manager
                    .lock()
                    .unwrap()
                    .write(block, &mut self.contents)?;
            }
            self.txnum = -1;
        }
        Ok(())
    }

    pub fn assign_to_block(&mut self, block: &BlockId) -> Result<()> {
        self.flush()?;
        self.file_manager
            .lock()
            .unwrap()
            .read(block, &mut self.contents)?;
        self.block = Some(block.clone());
        self.pins = 0;
        Ok(())
    }

    pub fn is_pinned(&self) -> bool {
        self.pins > 0
    }

    pub fn pin(&mut self) {
        self.pins += 1;
    }

    pub fn unpin(&mut self) {
        self.pins -= 1;
    }
}
