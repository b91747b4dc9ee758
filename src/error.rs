use core::fmt;

/// All failure kinds the storage kernel can surface to a caller.
///
/// Transient kinds (`LockAbort`, `BufferAbort`, `Io`) leave the engine in a
/// consistent state; the caller is expected to roll back the transaction.
/// `CorruptLogRecord` is fatal during startup recovery.
#[derive(Debug)]
pub enum CraneError {
    /// Lock wait exceeded the configured timeout; caller must roll back.
    LockAbort,
    /// No buffer frame became available within the configured timeout.
    BufferAbort,
    /// Release of a lock that was never held.
    LockDoNotExist,
    /// Underlying read/write/append failure.
    Io(std::io::Error),
    /// Unknown log record op code encountered while decoding the log.
    CorruptLogRecord(i32),
    /// A block number was negative where only the sentinel (-1) is allowed.
    NegativeBlock(i64),
    /// The transaction's pinned-buffer map has no entry for a block the
    /// caller is trying to read or write through.
    BufferNotPinned,
    /// Table/file lookup failed at the boundary.
    TableNotFound(String),
    /// A `CraneConfig` violates an invariant required at startup.
    InvalidConfig(String),
}

impl std::error::Error for CraneError {}

impl fmt::Display for CraneError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CraneError::LockAbort => write!(f, "lock abort"),
            CraneError::BufferAbort => write!(f, "buffer abort"),
            CraneError::LockDoNotExist => write!(f, "lock does not exist"),
            CraneError::Io(err) => write!(f, "io error: {}", err),
            CraneError::CorruptLogRecord(op) => write!(f, "corrupt log record, unknown op {}", op),
            CraneError::NegativeBlock(n) => write!(f, "negative block number: {}", n),
            CraneError::BufferNotPinned => write!(f, "block is not pinned by this transaction"),
            CraneError::TableNotFound(name) => write!(f, "table not found: {}", name),
            CraneError::InvalidConfig(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl From<std::io::Error> for CraneError {
    fn from(err: std::io::Error) -> Self {
        CraneError::Io(err)
    }
}

/// `CraneError` is wrapped in `anyhow::Error` so call sites can still use
/// `?` against `std::io::Error` and other foreign error types directly.
pub type Result<T> = anyhow::Result<T>;
