use thiserror::Error;

use crate::{
    storage::page::page::{PageId, TableId},
    transaction::TransactionId,
};

pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Error, Debug)]
pub enum DbError {
    // === Concurrency control ===
    /// Granting the lock would close a cycle in the waits-for graph.
    /// The requesting transaction must abort.
    #[error("deadlock detected: {txn} waiting for {page}")]
    DeadlockDetected { txn: TransactionId, page: PageId },

    /// The lock wait exceeded the configured timeout.
    #[error("lock wait timed out: {txn} waiting for {page}")]
    LockTimeout { txn: TransactionId, page: PageId },

    // === Cache ===
    /// Every cached page is pinned by an uncommitted writer.
    #[error("buffer pool exhausted: all {capacity} slots hold unevictable pages")]
    ResourceExhausted { capacity: usize },

    // === Storage ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("page {page} does not exist")]
    PageNotFound { page: PageId },

    #[error("no tuple at slot {slot} of page {page}")]
    TupleNotFound { page: PageId, slot: u16 },

    #[error("tuple carries no record id")]
    MissingRecordId,

    #[error("no such table: {table}")]
    NoSuchTable { table: TableId },

    #[error("page {page} has no room for the tuple")]
    PageFull { page: PageId },

    #[error("tuple of {size} bytes exceeds the {max} bytes available in an empty page")]
    TupleTooLarge { size: usize, max: usize },

    #[error("page {page} is malformed: {detail}")]
    Corrupted { page: PageId, detail: String },

    // === Misc ===
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("tuple codec error: {0}")]
    Codec(String),
}

impl DbError {
    /// True when the caller has to abort the transaction that received this error.
    pub fn is_abort_required(&self) -> bool {
        matches!(
            self,
            DbError::DeadlockDetected { .. } | DbError::LockTimeout { .. }
        )
    }
}
