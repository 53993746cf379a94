use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use tempfile::TempDir;

use crate::{
    buffer::buffer_pool_manager::BufferPool,
    catalog::Catalog,
    config::PoolConfig,
    storage::{
        disk::{heap_file::HeapFile, manager::DbFile},
        page::page::{Page, PageId, TableId},
        tuple::Tuple,
    },
};

pub mod buffer_pool_test;

pub const TABLE_ID: TableId = 7;

pub struct TestDb {
    // Keeps the table file alive for the duration of the test
    pub dir: TempDir,
    pub file: Arc<HeapFile>,
    pub pool: Arc<BufferPool>,
}

impl TestDb {
    /// A pool over one table whose first `seeded_pages` pages each hold `page-<n>`.
    pub fn new(config: PoolConfig, seeded_pages: u32) -> TestDb {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.dat");
        let file = Arc::new(HeapFile::create(&path, TABLE_ID, config.page_size).unwrap());

        for n in 0..seeded_pages {
            let page_id = file.allocate_page().unwrap();
            let mut page = Page::empty(page_id, config.page_size);
            page.insert_tuple(Tuple::new(format!("page-{}", n))).unwrap();
            file.write_page(&page).unwrap();
        }

        let pool = Arc::new(BufferPool::new(config, catalog_for(file.clone())).unwrap());

        TestDb { dir, file, pool }
    }

    /// A second pool over the same file, as after a restart.
    pub fn reopen(&self) -> Arc<BufferPool> {
        let path = self.dir.path().join("table.dat");
        let config = self.pool.config().clone();
        let file = Arc::new(HeapFile::open(&path, TABLE_ID, config.page_size).unwrap());

        Arc::new(BufferPool::new(config, catalog_for(file)).unwrap())
    }
}

pub fn catalog_for(file: Arc<HeapFile>) -> Arc<Catalog> {
    let catalog = Arc::new(Catalog::new());
    catalog.add_table("test_table", file);
    catalog
}

pub fn pid(page_number: u32) -> PageId {
    PageId::new(TABLE_ID, page_number)
}

/// Tuple payloads on disk, page by page, bypassing the pool.
pub fn disk_contents(file: &HeapFile) -> Vec<Vec<u8>> {
    let mut contents = Vec::new();
    for page_number in 0..file.num_pages().unwrap() {
        let page = file.read_page(pid(page_number)).unwrap();
        contents.extend(page.tuples().map(|tuple| tuple.data.to_vec()));
    }
    contents
}

/// Polls `condition` until it holds, failing the test after five seconds.
pub fn wait_until(condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(5));
    }
}
