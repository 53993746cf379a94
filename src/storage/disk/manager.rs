use crate::{
    buffer::buffer_pool_manager::BufferPool,
    errors::Result,
    storage::{
        page::{
            page::{Page, PageId, TableId},
            page_guard::PageHandle,
        },
        tuple::Tuple,
    },
    transaction::TransactionId,
};

/// Per-table storage the buffer pool reads from and writes back to.
///
/// Tuple mutations go through the pool so that they take page locks, and
/// return every page they modified. The pool marks those pages dirty.
pub trait DbFile: Send + Sync {
    fn table_id(&self) -> TableId;

    fn page_size(&self) -> usize;

    fn num_pages(&self) -> Result<u32>;

    /// Fails with `PageNotFound` when the page is not on disk.
    fn read_page(&self, page_id: PageId) -> Result<Page>;

    fn write_page(&self, page: &Page) -> Result<()>;

    fn insert_tuple(
        &self,
        pool: &BufferPool,
        txn: TransactionId,
        tuple: Tuple,
    ) -> Result<Vec<PageHandle>>;

    fn delete_tuple(
        &self,
        pool: &BufferPool,
        txn: TransactionId,
        tuple: &Tuple,
    ) -> Result<Vec<PageHandle>>;
}
