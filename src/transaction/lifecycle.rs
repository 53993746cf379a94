use tracing::info;

use crate::{
    buffer::buffer_pool_manager::BufferPool, errors::Result, transaction::TransactionId,
};

impl BufferPool {
    /// Ends `txn`: commit forces its dirty pages to disk, abort drops them from
    /// the cache so the next fetch re-reads the last durable version. Locks are
    /// released afterwards, so no other transaction sees a half-finished page.
    ///
    /// If a commit-time write fails the error is returned with every lock still
    /// held and the unwritten pages still dirty; the caller must then abort.
    pub fn transaction_complete(&self, txn: TransactionId, commit: bool) -> Result<()> {
        let footprint = self.lock_manager().pages_locked_by(txn);
        let dirtied = self.dirtied_by(txn);

        if commit {
            for handle in &dirtied {
                self.flush_page(handle.page_id())?;
            }
        } else {
            for handle in &dirtied {
                self.discard_page(handle.page_id());
            }
        }

        self.lock_manager().release_all(txn);

        info!(
            %txn,
            commit,
            locked = footprint.len(),
            dirtied = dirtied.len(),
            "transaction complete"
        );
        Ok(())
    }

    pub fn commit(&self, txn: TransactionId) -> Result<()> {
        self.transaction_complete(txn, true)
    }

    pub fn abort(&self, txn: TransactionId) -> Result<()> {
        self.transaction_complete(txn, false)
    }
}
