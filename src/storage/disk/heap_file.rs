use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use parking_lot::Mutex;
use tracing::debug;

use crate::{
    buffer::buffer_pool_manager::BufferPool,
    config::{MAX_PAGE_SIZE, MIN_PAGE_SIZE},
    errors::{DbError, Result},
    storage::{
        disk::manager::DbFile,
        page::{
            page::{Page, PageId, TableId},
            page_guard::PageHandle,
        },
        tuple::Tuple,
    },
    transaction::{Permissions, TransactionId},
};

/// Unordered table file: page `n` lives at byte offset `n * page_size`.
pub struct HeapFile {
    table_id: TableId,
    page_size: usize,
    path: PathBuf,
    // Serializes seeks and appends on the shared descriptor
    db_io: Mutex<File>,
}

impl HeapFile {
    pub fn create(path: impl AsRef<Path>, table_id: TableId, page_size: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        Self::from_file(file, path, table_id, page_size)
    }

    pub fn open(path: impl AsRef<Path>, table_id: TableId, page_size: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;

        Self::from_file(file, path, table_id, page_size)
    }

    fn from_file(file: File, path: PathBuf, table_id: TableId, page_size: usize) -> Result<Self> {
        if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(DbError::InvalidConfig(format!(
                "page size {} outside {}..={}",
                page_size, MIN_PAGE_SIZE, MAX_PAGE_SIZE
            )));
        }

        Ok(Self {
            table_id,
            page_size,
            path,
            db_io: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends an all-zero page to the file and returns its id.
    pub fn allocate_page(&self) -> Result<PageId> {
        let mut db_io = self.db_io.lock();

        let len = db_io.metadata()?.len();
        let page_number = (len / self.page_size as u64) as u32;
        let offset = page_number as u64 * self.page_size as u64;

        db_io.seek(SeekFrom::Start(offset))?;
        db_io.write_all(&vec![0u8; self.page_size])?;
        db_io.flush()?;
        db_io.sync_data()?;

        let page_id = PageId::new(self.table_id, page_number);
        debug!(page = %page_id, "allocated page");
        Ok(page_id)
    }

    fn offset_of(&self, page_id: PageId) -> Result<u64> {
        if page_id.table_id != self.table_id {
            return Err(DbError::PageNotFound { page: page_id });
        }
        Ok(page_id.page_number as u64 * self.page_size as u64)
    }
}

impl DbFile for HeapFile {
    fn table_id(&self) -> TableId {
        self.table_id
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn num_pages(&self) -> Result<u32> {
        let len = self.db_io.lock().metadata()?.len();
        Ok((len / self.page_size as u64) as u32)
    }

    fn read_page(&self, page_id: PageId) -> Result<Page> {
        let offset = self.offset_of(page_id)?;
        let mut page_data = vec![0u8; self.page_size];

        {
            let mut db_io = self.db_io.lock();

            if offset + self.page_size as u64 > db_io.metadata()?.len() {
                return Err(DbError::PageNotFound { page: page_id });
            }

            db_io.seek(SeekFrom::Start(offset))?;
            db_io.read_exact(&mut page_data)?;
        }

        Page::from_bytes(page_id, &page_data)
    }

    fn write_page(&self, page: &Page) -> Result<()> {
        let offset = self.offset_of(page.id())?;
        let page_data = page.to_bytes();

        let mut db_io = self.db_io.lock();
        db_io.seek(SeekFrom::Start(offset))?;
        db_io.write_all(&page_data)?;
        db_io.flush()?;
        db_io.sync_data()?;

        Ok(())
    }

    fn insert_tuple(
        &self,
        pool: &BufferPool,
        txn: TransactionId,
        tuple: Tuple,
    ) -> Result<Vec<PageHandle>> {
        let max = Page::max_tuple_size(self.page_size);
        if tuple.len() > max {
            return Err(DbError::TupleTooLarge {
                size: tuple.len(),
                max,
            });
        }

        for page_number in 0..self.num_pages()? {
            let page_id = PageId::new(self.table_id, page_number);
            let held_before = pool.holds_lock(txn, page_id);

            let handle = pool.fetch_page(txn, page_id, Permissions::ReadOnly)?;
            let has_room = handle.read().has_room_for(&tuple);

            if !has_room {
                // Only free space was read, so the shared lock can go early
                if !held_before {
                    pool.unsafe_release_page(txn, page_id);
                }
                continue;
            }

            let handle = pool.fetch_page(txn, page_id, Permissions::ReadWrite)?;
            let mut page = handle.write();

            // Another writer may have filled the page during the upgrade
            if page.has_room_for(&tuple) {
                page.insert_tuple(tuple)?;
                drop(page);
                return Ok(vec![handle]);
            }
        }

        let page_id = self.allocate_page()?;
        let handle = pool.fetch_page(txn, page_id, Permissions::ReadWrite)?;
        handle.write().insert_tuple(tuple)?;

        Ok(vec![handle])
    }

    fn delete_tuple(
        &self,
        pool: &BufferPool,
        txn: TransactionId,
        tuple: &Tuple,
    ) -> Result<Vec<PageHandle>> {
        let record_id = tuple.record_id.ok_or(DbError::MissingRecordId)?;

        if record_id.page_id.table_id != self.table_id
            || record_id.page_id.page_number >= self.num_pages()?
        {
            return Err(DbError::TupleNotFound {
                page: record_id.page_id,
                slot: record_id.slot,
            });
        }

        let handle = pool.fetch_page(txn, record_id.page_id, Permissions::ReadWrite)?;
        handle.write().delete_tuple(&record_id)?;

        Ok(vec![handle])
    }
}
