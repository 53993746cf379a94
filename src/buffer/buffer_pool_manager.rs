use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::{
    catalog::Catalog,
    config::{PoolConfig, ReplacementPolicy},
    errors::{DbError, Result},
    storage::{
        page::{
            page::{PageId, TableId},
            page_guard::PageHandle,
        },
        tuple::Tuple,
    },
    transaction::{lock_manager::LockManager, Permissions, TransactionId},
    utils::replacer::{LRUKReplacer, LRUReplacer, Replacer},
};

// Everything guarded by the slot-table mutex
struct SlotTable {
    pages: HashMap<PageId, PageHandle>,

    // The replacer to find candidate pages for eviction
    replacer: Box<dyn Replacer<PageId> + Send>,
}

/// Fixed-capacity page cache shared by all transactions.
///
/// Every fetch first takes the page lock matching the requested permissions,
/// then serves the page from the slot table or loads it through the table's
/// file. Miss handling (read, pick victim, write back, remove, insert) runs
/// under one mutex, so two concurrent misses never evict the same victim or
/// install the same page twice.
///
/// Recovery policy is no-steal/force: a page dirtied by a live transaction
/// is never chosen for eviction, and commit writes the transaction's pages.
pub struct BufferPool {
    config: PoolConfig,
    catalog: Arc<Catalog>,
    lock_manager: LockManager,
    slots: Mutex<SlotTable>,
}

impl BufferPool {
    pub fn new(config: PoolConfig, catalog: Arc<Catalog>) -> Result<Self> {
        config.validate()?;

        let replacer: Box<dyn Replacer<PageId> + Send> = match config.replacement {
            ReplacementPolicy::Lru => Box::new(LRUReplacer::new()),
            ReplacementPolicy::LruK(k) => Box::new(LRUKReplacer::new(k)),
        };

        info!(
            num_pages = config.num_pages,
            page_size = config.page_size,
            replacement = ?config.replacement,
            "buffer pool created"
        );

        Ok(Self {
            lock_manager: LockManager::new(config.lock_wait_timeout),
            slots: Mutex::new(SlotTable {
                pages: HashMap::with_capacity(config.num_pages),
                replacer,
            }),
            config,
            catalog,
        })
    }

    /// Retrieves a page on behalf of `txn`, blocking until the lock is granted.
    ///
    /// Returns the cached instance shared by every caller since it was loaded. Fails
    /// with `DeadlockDetected`/`LockTimeout` (abort required), with
    /// `ResourceExhausted` when the pool is full of unevictable pages, or with
    /// the file's error. A failed fetch leaves the slot table unchanged.
    pub fn fetch_page(
        &self,
        txn: TransactionId,
        page_id: PageId,
        permissions: Permissions,
    ) -> Result<PageHandle> {
        self.lock_manager
            .acquire(txn, page_id, permissions.into())?;

        let mut slots = self.slots.lock();

        if let Some(handle) = slots.pages.get(&page_id).cloned() {
            slots.replacer.record_access(page_id);
            debug!(%txn, page = %page_id, "cache hit");
            return Ok(handle);
        }

        debug!(%txn, page = %page_id, "cache miss");

        let file = self.catalog.get_database_file(page_id.table_id)?;
        if file.page_size() != self.config.page_size {
            return Err(DbError::InvalidConfig(format!(
                "table {} uses {} byte pages, pool uses {}",
                page_id.table_id,
                file.page_size(),
                self.config.page_size
            )));
        }

        // Read before evicting so a failed read leaves the table untouched
        let page = file.read_page(page_id)?;

        if slots.pages.len() >= self.config.num_pages {
            self.evict_locked(&mut slots)?;
        }

        let handle = PageHandle::new(page);
        slots.pages.insert(page_id, handle.clone());
        slots.replacer.record_access(page_id);

        Ok(handle)
    }

    /// Adds `tuple` to table `table_id` on behalf of `txn`.
    ///
    /// Every page the file modified is marked dirty, stamped with `txn` and
    /// installed in the cache so later fetches see the new version.
    pub fn insert_tuple(&self, txn: TransactionId, table_id: TableId, tuple: Tuple) -> Result<()> {
        let file = self.catalog.get_database_file(table_id)?;
        let dirtied = file.insert_tuple(self, txn, tuple)?;

        self.install_dirtied(txn, dirtied)
    }

    pub fn delete_tuple(&self, txn: TransactionId, tuple: &Tuple) -> Result<()> {
        let record_id = tuple.record_id.ok_or(DbError::MissingRecordId)?;
        let file = self.catalog.get_database_file(record_id.page_id.table_id)?;
        let dirtied = file.delete_tuple(self, txn, tuple)?;

        self.install_dirtied(txn, dirtied)
    }

    fn install_dirtied(&self, txn: TransactionId, dirtied: Vec<PageHandle>) -> Result<()> {
        for handle in dirtied {
            handle.write().mark_dirty(true, Some(txn));

            let page_id = handle.page_id();
            let mut slots = self.slots.lock();

            let cached = slots
                .pages
                .get(&page_id)
                .map_or(false, |existing| existing.same_page(&handle));

            if !cached {
                if !slots.pages.contains_key(&page_id) && slots.pages.len() >= self.config.num_pages
                {
                    self.evict_locked(&mut slots)?;
                }
                slots.pages.insert(page_id, handle);
            }

            slots.replacer.record_access(page_id);
            debug!(%txn, page = %page_id, "page dirtied");
        }

        Ok(())
    }

    /// Writes every dirty page back to disk.
    ///
    /// This makes uncommitted writes durable, which no-steal recovery does not
    /// expect. Only call it at controlled checkpoints or in tests.
    pub fn flush_all_pages(&self) -> Result<()> {
        let slots = self.slots.lock();

        for handle in slots.pages.values() {
            self.write_back(handle)?;
        }

        Ok(())
    }

    /// Writes one cached page back if it is dirty. Same caveat as `flush_all_pages`.
    pub fn flush_page(&self, page_id: PageId) -> Result<()> {
        let slots = self.slots.lock();

        match slots.pages.get(&page_id) {
            Some(handle) => self.write_back(handle),
            None => Ok(()),
        }
    }

    /// Writes back every cached page dirtied by `txn`.
    pub fn flush_pages(&self, txn: TransactionId) -> Result<()> {
        let slots = self.slots.lock();

        for handle in slots.pages.values() {
            if handle.read().dirtied_by() == Some(txn) {
                self.write_back(handle)?;
            }
        }

        Ok(())
    }

    /// Removes a page from the cache without writing it back.
    pub fn discard_page(&self, page_id: PageId) {
        let mut slots = self.slots.lock();

        if slots.pages.remove(&page_id).is_some() {
            slots.replacer.remove(page_id);
            debug!(page = %page_id, "page discarded");
        }
    }

    /// Evicts one page chosen by the replacement policy.
    pub fn evict_page(&self) -> Result<PageId> {
        let mut slots = self.slots.lock();
        self.evict_locked(&mut slots)
    }

    fn evict_locked(&self, slots: &mut SlotTable) -> Result<PageId> {
        let exclusive = self.lock_manager.exclusively_locked();
        let pages = &slots.pages;

        // Pages held exclusively or carrying a live transaction's writes stay put.
        // A page whose write guard is taken right now is skipped too; readers do
        // not block eviction.
        let is_excluded = |page_id: &PageId| {
            if exclusive.contains(page_id) {
                return true;
            }
            match pages.get(page_id) {
                Some(handle) => handle
                    .try_read()
                    .map_or(true, |page| page.dirtied_by().is_some()),
                None => false,
            }
        };

        let victim = match slots.replacer.select_victim(&is_excluded) {
            Some(victim) => victim,
            None => {
                warn!(capacity = self.config.num_pages, "no evictable page");
                return Err(DbError::ResourceExhausted {
                    capacity: self.config.num_pages,
                });
            }
        };

        // Dirty pages without an owning transaction are written back first
        if let Some(handle) = slots.pages.get(&victim) {
            self.write_back(handle)?;
        }

        slots.pages.remove(&victim);
        slots.replacer.remove(victim);
        debug!(page = %victim, "evicted page");

        Ok(victim)
    }

    // A failed write keeps the page dirty so a later flush can retry
    fn write_back(&self, handle: &PageHandle) -> Result<()> {
        let mut page = handle.write();
        if !page.is_dirty() {
            return Ok(());
        }

        let file = self.catalog.get_database_file(page.id().table_id)?;
        file.write_page(&page)?;
        page.mark_dirty(false, None);

        debug!(page = %page.id(), "flushed page");
        Ok(())
    }

    /// Handles of the cached pages `txn` has dirtied.
    pub(crate) fn dirtied_by(&self, txn: TransactionId) -> Vec<PageHandle> {
        let slots = self.slots.lock();

        slots
            .pages
            .values()
            .filter(|handle| handle.read().dirtied_by() == Some(txn))
            .cloned()
            .collect()
    }

    /// Releases one lock before the transaction ends.
    ///
    /// Only safe when the caller read nothing it depends on, e.g. a free-space
    /// probe. Releasing an exclusive lock on a dirtied page breaks isolation.
    pub fn unsafe_release_page(&self, txn: TransactionId, page_id: PageId) {
        self.lock_manager.release(txn, page_id);
    }

    pub fn holds_lock(&self, txn: TransactionId, page_id: PageId) -> bool {
        self.lock_manager.holds(txn, page_id)
    }

    pub fn contains(&self, page_id: PageId) -> bool {
        self.slots.lock().pages.contains_key(&page_id)
    }

    /// Cached page ids in page order.
    pub fn cached_pages(&self) -> Vec<PageId> {
        let mut pages: Vec<PageId> = self.slots.lock().pages.keys().copied().collect();
        pages.sort_unstable();
        pages
    }

    pub fn len(&self) -> usize {
        self.slots.lock().pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.config.num_pages
    }

    pub fn page_size(&self) -> usize {
        self.config.page_size
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.lock_manager
    }
}
