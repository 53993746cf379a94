use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::page::{Page, PageId};

/// Handle to a page owned by the buffer pool.
///
/// All transactions holding a compatible lock on a page receive clones of the
/// same handle, so an in-place mutation is seen by every holder. A handle is
/// only meaningful while the caller's page lock is live. Do not keep a guard
/// from `read`/`write` alive across calls back into the pool.
///
/// A clean page under shared locks stays evictable. If it is evicted and
/// fetched again, holders from before and after the eviction keep different
/// instances with equal content. Exclusive holders always share one instance,
/// since an exclusively locked page is never evicted.
#[derive(Debug, Clone)]
pub struct PageHandle {
    page_id: PageId,
    inner: Arc<RwLock<Page>>,
}

impl PageHandle {
    pub fn new(page: Page) -> Self {
        Self {
            page_id: page.id(),
            inner: Arc::new(RwLock::new(page)),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Page> {
        self.inner.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Page> {
        self.inner.write()
    }

    pub fn try_read(&self) -> Option<RwLockReadGuard<'_, Page>> {
        self.inner.try_read()
    }

    /// True when both handles refer to the same cached page instance.
    pub fn same_page(&self, other: &PageHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
