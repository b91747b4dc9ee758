use crate::error::Result;

/// In-memory image of one block: a fixed-size, owned byte buffer with
/// typed big-endian accessors.
///
/// Two constructors: zero-filled at a given size, or wrapping externally
/// owned bytes (used when decoding log records, whose length varies per
/// record and is unrelated to `block_size`).
#[derive(Debug, Clone)]
pub struct Page {
    buf: Vec<u8>,
}

const INT_SIZE: usize = std::mem::size_of::<i32>();

impl Page {
    pub fn new(block_size: usize) -> Self {
        Self {
            buf: vec![0u8; block_size],
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { buf: bytes }
    }

    pub fn get_int(&self, offset: usize) -> Result<i32> {
        let bytes: [u8; INT_SIZE] = self.buf[offset..offset + INT_SIZE].try_into().unwrap();
        Ok(i32::from_be_bytes(bytes))
    }

    pub fn set_int(&mut self, offset: usize, n: i32) -> Result<()> {
        self.buf[offset..offset + INT_SIZE].copy_from_slice(&n.to_be_bytes());
        Ok(())
    }

    /// Reads a length-prefixed byte array at `offset`. Returns an empty
    /// vector, rather than erroring or panicking, if the prefix is negative
    /// or would run past the end of the buffer — defensive against garbage
    /// left by an uninitialized disk region.
    pub fn get_bytes(&self, offset: usize) -> Result<Vec<u8>> {
        if offset + INT_SIZE > self.buf.len() {
            return Ok(Vec::new());
        }
        let len = self.get_int(offset)?;
        if len < 0 || offset + INT_SIZE + len as usize > self.buf.len() {
            return Ok(Vec::new());
        }
        let start = offset + INT_SIZE;
        Ok(self.buf[start..start + len as usize].to_vec())
    }

    pub fn set_bytes(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        self.set_int(offset, bytes.len() as i32)?;
        let start = offset + INT_SIZE;
        self.buf[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    pub fn get_string(&self, offset: usize) -> Result<String> {
        let bytes = self.get_bytes(offset)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn set_string(&mut self, offset: usize, s: &str) -> Result<()> {
        self.set_bytes(offset, s.as_bytes())
    }

    /// Bytes needed to store a length-prefixed string of `strlen` bytes.
    pub fn max_length(strlen: usize) -> usize {
        INT_SIZE + strlen
    }

    /// Raw contents, used by `FileManager` and the log code for I/O.
    pub(crate) fn contents(&self) -> &[u8] {
        &self.buf
    }

    pub(crate) fn contents_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}
