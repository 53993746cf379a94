pub mod buffer;
pub mod catalog;
pub mod config;
pub mod errors;
pub mod storage;
pub mod transaction;
pub mod utils;

#[cfg(test)]
mod tests;

pub use buffer::buffer_pool_manager::BufferPool;
pub use catalog::Catalog;
pub use config::{PoolConfig, ReplacementPolicy};
pub use errors::{DbError, Result};
pub use storage::{
    disk::{heap_file::HeapFile, manager::DbFile},
    page::{
        page::{Page, PageId, TableId},
        page_guard::PageHandle,
    },
    tuple::{RecordId, Tuple},
};
pub use transaction::{LockMode, Permissions, TransactionId};
