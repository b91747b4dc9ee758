use std::path::PathBuf;
use std::time::Duration;

use crate::error::{CraneError, Result};

/// Tunables for a `CraneDb` instance, gathering what would otherwise be
/// scattered constructor parameters and hardcoded constants into one place.
#[derive(Debug, Clone)]
pub struct CraneConfig {
    /// Directory holding the database's block files and log.
    pub db_dir: PathBuf,
    /// Fixed size, in bytes, of every block. Must not change after the
    /// database directory is first initialized.
    pub block_size: usize,
    /// Number of frames in the buffer pool. Must be > 0.
    pub num_buffers: usize,
    /// How long `LockTable::slock`/`xlock` wait before returning `LockAbort`.
    pub lock_wait_timeout: Duration,
    /// How long `BufferManager::pin` waits before returning `BufferAbort`.
    pub buffer_wait_timeout: Duration,
    /// Name of the write-ahead log file within `db_dir`.
    pub log_file: String,
}

impl Default for CraneConfig {
    fn default() -> Self {
        Self {
            db_dir: PathBuf::from("./cranedb_data"),
            block_size: 400,
            num_buffers: 20,
            lock_wait_timeout: Duration::from_secs(10),
            buffer_wait_timeout: Duration::from_secs(10),
            log_file: "cranedb.log".to_string(),
        }
    }
}

impl CraneConfig {
    /// Overlays `CRANEDB_DIR`, `CRANEDB_BLOCK_SIZE`, `CRANEDB_NUM_BUFFERS`,
    /// `CRANEDB_LOCK_TIMEOUT_MS`, `CRANEDB_BUFFER_TIMEOUT_MS` onto the
    /// default. An absent or unparsable variable keeps the default for that
    /// field; this is an embedded engine, not a server with a strict schema.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(dir) = std::env::var("CRANEDB_DIR") {
            cfg.db_dir = PathBuf::from(dir);
        }
        if let Some(n) = env_usize("CRANEDB_BLOCK_SIZE") {
            cfg.block_size = n;
        }
        if let Some(n) = env_usize("CRANEDB_NUM_BUFFERS") {
            cfg.num_buffers = n;
        }
        if let Some(ms) = env_u64("CRANEDB_LOCK_TIMEOUT_MS") {
            cfg.lock_wait_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_u64("CRANEDB_BUFFER_TIMEOUT_MS") {
            cfg.buffer_wait_timeout = Duration::from_millis(ms);
        }

        cfg
    }

    /// Checks the invariants required before the database is allowed to
    /// start.
    pub fn validate(&self) -> Result<()> {
        if self.num_buffers == 0 {
            return Err(CraneError::InvalidConfig("num_buffers must be > 0".to_string()).into());
        }
        if self.block_size < 4 {
            return Err(CraneError::InvalidConfig(
                "block_size must hold at least a boundary int".into(),
            )
            .into());
        }
        Ok(())
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}
