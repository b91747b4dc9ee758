use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::file::block_id::BlockId;
use crate::file::manager::FileManager;
use crate::file::page::Page;

/// Yields log records newest-first across the whole log: within the
/// current block from its boundary forward, then block by block down to
/// block 0.
#[derive(Debug)]
pub struct LogIterator {
    file_manager: Arc<Mutex<FileManager>>,
    block: BlockId,
    page: Page,
    current_pos: usize,
    boundary: usize,
}

impl LogIterator {
    pub fn new(file_manager: Arc<Mutex<FileManager>>, block: &BlockId) -> Result<Self> {
        let block_size = file_manager.lock().unwrap().block_size();
        let mut iterator = Self {
            file_manager: Arc::clone(&file_manager),
            block: block.clone(),
            page: Page::from_bytes(vec![0; block_size]),
            current_pos: 0,
            boundary: 0,
        };

        iterator.move_to_block(block)?;
        Ok(iterator)
    }

    /// True while more records remain to be yielded.
    pub fn has_next(&self) -> bool {
        self.current_pos < self.file_manager.lock().unwrap().block_size()
            || self.block.block_number() > 0
    }

    fn move_to_block(&mut self, block: &BlockId) -> Result<()> {
        self.file_manager
            .lock()
            .unwrap()
            .read(block, &mut self.page)?;
        self.boundary = self.page.get_int(0)? as usize;
        self.current_pos = self.boundary;
        Ok(())
    }
}

impl Iterator for LogIterator {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        let block_size = self.file_manager.lock().unwrap().block_size();

        if self.current_pos == block_size {
            if self.block.block_number() == 0 {
                return None;
            }
            self.block = BlockId::new(self.block.filename(), self.block.block_number() - 1);
            self.move_to_block(&self.block.clone()).ok()?;
        }

        let rec = self.page.get_bytes(self.current_pos).ok()?;
        self.current_pos += std::mem::size_of::<i32>() + rec.len();
        Some(rec)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tempfile::tempdir;

    use crate::file::{manager::FileManager, page::Page};
    use crate::log::manager::LogManager;

    // 13 records at block size 32: verifies strict newest-to-oldest order
    // held across several block boundaries.
    #[test]
    fn iterates_newest_first_across_blocks() {
        let temp_dir = tempdir().unwrap();
        let block_size = 32;
        let file_manager = Arc::new(Mutex::new(
            FileManager::new(temp_dir.path().to_str().unwrap(), block_size).unwrap(),
        ));
        let log_manager = Arc::new(Mutex::new(
            LogManager::new(Arc::clone(&file_manager), "iter.log").unwrap(),
        ));

        let words = [
            "record one",
            "record two",
            "record three",
            "record four",
            "record five",
            "record six",
            "record seven",
            "record eight",
            "record nine",
            "record ten",
            "record eleven",
            "record twelve",
            "record thirteen",
        ];

        for w in words.iter() {
            let mut p = Page::new(Page::max_length(w.len()));
            p.set_string(0, w).unwrap();
            log_manager.lock().unwrap().append(p.contents()).unwrap();
        }

        let mut iter = log_manager.lock().unwrap().iterator().unwrap();
        let mut seen = Vec::new();
        while iter.has_next() {
            match iter.next() {
                Some(bytes) => {
                    let p = Page::from_bytes(bytes);
                    seen.push(p.get_string(0).unwrap());
                }
                None => break,
            }
        }

        let expected: Vec<String> = words.iter().rev().map(|s| s.to_string()).collect();
        assert_eq!(seen, expected);
        assert!(!iter.has_next());
    }
}
