use std::sync::{Arc, Mutex};

use log::trace;

use crate::{
    error::Result,
    file::{block_id::BlockId, manager::FileManager, page::Page},
    Lsn,
};

use super::iterator::LogIterator;

/// Appends variable-length log records into the log file's blocks,
/// newest-first within each block, and tracks the latest and last-flushed
/// LSN.
#[derive(Debug)]
pub struct LogManager {
    file_manager: Arc<Mutex<FileManager>>,
    logfile: String,
    logpage: Page,
    current_block: BlockId,
    latest_lsn: Lsn,
    last_saved_lsn: Lsn,
}

impl LogManager {
    pub fn new(file_manager: Arc<Mutex<FileManager>>, log_file: &str) -> Result<Self> {
        let block_size = file_manager.lock().unwrap().block_size();

        let mut log_manager = LogManager {
            file_manager: Arc::clone(&file_manager),
            logfile: log_file.to_string(),
            logpage: Page::from_bytes(vec![0; block_size]),
            current_block: BlockId::new(log_file, 0),
            latest_lsn: 0,
            last_saved_lsn: 0,
        };

        // If the log file does not yet exist, create it with an empty
        // first block whose boundary is the whole block size.
        let log_size = file_manager.lock().unwrap().total_blocks(log_file)?;
        log_manager.current_block = if log_size == 0 {
            log_manager.append_new_block()?
        } else {
            let block = BlockId::new(log_file, log_size as i64 - 1);
            file_manager
                .lock()
                .unwrap()
                .read(&block, &mut log_manager.logpage)?;
            block
        };

        Ok(log_manager)
    }

    /// Ensures the log record with the given LSN (and every earlier one) is
    /// durable on disk. The WAL rule depends on callers invoking this
    /// before writing the data page the record protects.
    pub fn flush(&mut self, lsn: Lsn) -> Result<()> {
        if lsn >= self.last_saved_lsn {
            self.do_flush()?;
        }

        Ok(())
    }

    /// Flushes the current page, then returns an iterator that yields every
    /// log record newest-first across the whole log.
    pub fn iterator(&mut self) -> Result<LogIterator> {
        self.do_flush()?;
        LogIterator::new(Arc::clone(&self.file_manager), &self.current_block)
    }

    /// Appends `logrec`, growing the block from the end downward. Records
    /// never span blocks: if the current block has no room, it is flushed
    /// and a fresh block is appended first.
    pub fn append(&mut self, logrec: &[u8]) -> Result<Lsn> {
        let mut boundary = self.logpage.get_int(0)?;
        let int_bytes = std::mem::size_of::<i32>() as i32;
        let recsize = logrec.len() as i32;
        let bytes_needed = recsize + int_bytes;

        if boundary - bytes_needed < int_bytes {
            trace!("log block {} full, rolling over", self.current_block);
            self.do_flush()?;
            self.current_block = self.append_new_block()?;
            boundary = self.logpage.get_int(0)?;
        }

        let recpos = boundary - bytes_needed;
        self.logpage.set_bytes(recpos as usize, logrec)?;
        self.logpage.set_int(0, recpos)?;
        self.latest_lsn += 1;
        Ok(self.latest_lsn)
    }

    fn do_flush(&mut self) -> Result<()> {
        self.file_manager
            .lock()
            .unwrap()
            .write(&self.current_block, &mut self.logpage)?;

        self.last_saved_lsn = self.latest_lsn;
        trace!("flushed log up to lsn {}", self.last_saved_lsn);

        Ok(())
    }

    fn append_new_block(&mut self) -> Result<BlockId> {
        let mut guard = self.file_manager.lock().unwrap();
        let block = guard.append(&self.logfile)?;
        self.logpage.set_int(0, guard.block_size() as i32)?;
        guard.write(&block, &mut self.logpage)?;
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    use crate::{file::manager::FileManager, file::page::Page, log::manager::LogManager};

    #[test]
    fn logtest() {
        let temp_dir = tempdir().unwrap();
        let test_log_file = "logtest";

        let block_size = 512;
        let file_manager = Arc::new(Mutex::new(
            FileManager::new(temp_dir.path().to_str().unwrap(), block_size).unwrap(),
        ));
        let log_manager = Arc::new(Mutex::new(
            LogManager::new(Arc::clone(&file_manager), test_log_file).unwrap(),
        ));

        create_records(Arc::clone(&log_manager), 1, 25);
        assert_log_records(Arc::clone(&log_manager), 25, 1);
        create_records(Arc::clone(&log_manager), 26, 50);
        assert_log_records(Arc::clone(&log_manager), 50, 1);
    }

    fn assert_log_records(log_manager: Arc<Mutex<LogManager>>, start: i32, end: i32) {
        let mut iter = log_manager.lock().unwrap().iterator().unwrap();
        let mut current = start;

        while iter.has_next() {
            if let Some(rec) = iter.next() {
                let p = Page::from_bytes(rec);
                let s = p.get_string(0).unwrap();
                let npos = Page::max_length(s.len());
                let val = p.get_int(npos).unwrap();

                assert_eq!(s, format!("record{}", current));
                assert_eq!(val, current + 100);

                current -= 1;
            }
        }

        assert_eq!(current + 1, end);
    }

    fn create_records(log_manager: Arc<Mutex<LogManager>>, start: i32, end: i32) {
        for i in start..=end {
            let s = format!("record{}", i);
            let rec = create_log_record(s.as_str(), i + 100);
            let lsn = log_manager.lock().unwrap().append(&rec).unwrap();
            assert_eq!(i as i64, lsn);
        }
    }

    fn create_log_record(s: &str, n: i32) -> Vec<u8> {
        let npos = Page::max_length(s.len());
        let bytes: Vec<u8> = vec![0; npos + 4];
        let mut p = Page::from_bytes(bytes);
        p.set_string(0, s).unwrap();
        p.set_int(npos, n).unwrap();
        p.contents().to_vec()
    }

    // Block size 32, three records of known byte lengths, checking the
    // boundary and LSN after each append, including a rollover to a new
    // block.
    #[test]
    fn log_append_crossing_blocks() {
        let temp_dir = tempdir().unwrap();
        let block_size = 32;
        let file_manager = Arc::new(Mutex::new(
            FileManager::new(temp_dir.path().to_str().unwrap(), block_size).unwrap(),
        ));
        let mut log_manager = LogManager::new(Arc::clone(&file_manager), "crossing.log").unwrap();

        let lsn1 = log_manager.append(b"test record").unwrap();
        assert_eq!(lsn1, 1);
        assert_eq!(log_manager.logpage.get_int(0).unwrap(), 17);

        let lsn2 = log_manager.append(b"record 2").unwrap();
        assert_eq!(lsn2, 2);
        assert_eq!(log_manager.logpage.get_int(0).unwrap(), 5);

        let lsn3 = log_manager.append(b"record 3").unwrap();
        assert_eq!(lsn3, 3);
        assert_eq!(log_manager.current_block.block_number(), 1);
        assert_eq!(log_manager.logpage.get_int(0).unwrap(), 20);
    }
}
