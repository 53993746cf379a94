#[cfg(test)]
pub mod test {
    use std::sync::Arc;

    use proptest::prelude::*;

    use crate::{
        catalog::Catalog,
        buffer::buffer_pool_manager::BufferPool,
        config::{PoolConfig, ReplacementPolicy},
        errors::DbError,
        storage::{
            disk::heap_file::HeapFile,
            page::page::PageId,
            tuple::Tuple,
        },
        tests::{disk_contents, pid, TestDb, TABLE_ID},
        transaction::{Permissions, TransactionId},
    };

    #[test]
    fn fetch_page_test() {
        let db = TestDb::new(PoolConfig::new(4), 2);
        let txn = TransactionId::new();

        let handle = db.pool.fetch_page(txn, pid(1), Permissions::ReadOnly).unwrap();
        assert_eq!(handle.page_id(), pid(1));
        assert_eq!(&handle.read().tuple(0).unwrap().data[..], b"page-1");

        assert!(db.pool.contains(pid(1)));
        assert!(db.pool.holds_lock(txn, pid(1)));
        assert_eq!(db.pool.len(), 1);
    }

    #[test]
    fn least_recently_used_page_is_evicted() {
        let db = TestDb::new(PoolConfig::new(2), 3);
        let txn = TransactionId::new();

        for page_number in 0..3 {
            db.pool
                .fetch_page(txn, pid(page_number), Permissions::ReadOnly)
                .unwrap();
        }
        assert_eq!(db.pool.cached_pages(), vec![pid(1), pid(2)]);

        // The first page has to be read again and pushes out the next oldest
        db.pool.fetch_page(txn, pid(0), Permissions::ReadOnly).unwrap();
        assert_eq!(db.pool.cached_pages(), vec![pid(0), pid(2)]);
    }

    #[test]
    fn access_refreshes_recency() {
        let db = TestDb::new(PoolConfig::new(2), 3);
        let txn = TransactionId::new();

        db.pool.fetch_page(txn, pid(0), Permissions::ReadOnly).unwrap();
        db.pool.fetch_page(txn, pid(1), Permissions::ReadOnly).unwrap();
        db.pool.fetch_page(txn, pid(0), Permissions::ReadOnly).unwrap();
        db.pool.fetch_page(txn, pid(2), Permissions::ReadOnly).unwrap();

        assert_eq!(db.pool.cached_pages(), vec![pid(0), pid(2)]);
    }

    #[test]
    fn lru_k_prefers_pages_with_short_history() {
        let config = PoolConfig::new(2).with_replacement(ReplacementPolicy::LruK(2));
        let db = TestDb::new(config, 3);
        let txn = TransactionId::new();

        db.pool.fetch_page(txn, pid(0), Permissions::ReadOnly).unwrap();
        db.pool.fetch_page(txn, pid(0), Permissions::ReadOnly).unwrap();
        db.pool.fetch_page(txn, pid(1), Permissions::ReadOnly).unwrap();
        db.pool.fetch_page(txn, pid(2), Permissions::ReadOnly).unwrap();

        assert_eq!(db.pool.cached_pages(), vec![pid(0), pid(2)]);
    }

    #[test]
    fn holders_share_one_instance() {
        let db = TestDb::new(PoolConfig::new(4), 1);
        let (t1, t2) = (TransactionId::new(), TransactionId::new());

        let first = db.pool.fetch_page(t1, pid(0), Permissions::ReadOnly).unwrap();
        let second = db.pool.fetch_page(t2, pid(0), Permissions::ReadOnly).unwrap();
        assert!(first.same_page(&second));

        // Writes through one handle are visible through the other
        first.write().insert_tuple(Tuple::new("shared")).unwrap();
        assert_eq!(second.read().num_tuples(), 2);
    }

    #[test]
    fn evicted_shared_page_is_reloaded() {
        let db = TestDb::new(PoolConfig::new(2), 3);
        let (t1, t2) = (TransactionId::new(), TransactionId::new());

        let before = db.pool.fetch_page(t1, pid(0), Permissions::ReadOnly).unwrap();
        db.pool.fetch_page(t1, pid(1), Permissions::ReadOnly).unwrap();
        db.pool.fetch_page(t1, pid(2), Permissions::ReadOnly).unwrap();
        assert!(!db.pool.contains(pid(0)));

        // Both still hold shared locks but see separate copies of the clean page
        let after = db.pool.fetch_page(t2, pid(0), Permissions::ReadOnly).unwrap();
        assert!(db.pool.holds_lock(t1, pid(0)));
        assert!(db.pool.holds_lock(t2, pid(0)));
        assert!(!after.same_page(&before));
        assert_eq!(
            after.read().tuple(0).unwrap().data,
            before.read().tuple(0).unwrap().data
        );
    }

    #[test]
    fn exclusive_pages_exhaust_the_pool() {
        let db = TestDb::new(PoolConfig::new(2), 3);
        let txn = TransactionId::new();

        db.pool.fetch_page(txn, pid(0), Permissions::ReadWrite).unwrap();
        db.pool.fetch_page(txn, pid(1), Permissions::ReadWrite).unwrap();

        let other = TransactionId::new();
        let err = db
            .pool
            .fetch_page(other, pid(2), Permissions::ReadOnly)
            .unwrap_err();

        assert!(matches!(err, DbError::ResourceExhausted { capacity: 2 }));
        assert_eq!(db.pool.cached_pages(), vec![pid(0), pid(1)]);

        assert!(matches!(
            db.pool.evict_page(),
            Err(DbError::ResourceExhausted { .. })
        ));

        // Once the writer is done its pages are evictable again
        db.pool.commit(txn).unwrap();
        db.pool.fetch_page(other, pid(2), Permissions::ReadOnly).unwrap();
        assert_eq!(db.pool.cached_pages(), vec![pid(1), pid(2)]);
    }

    #[test]
    fn unowned_dirty_victim_is_written_back() {
        let db = TestDb::new(PoolConfig::new(2), 3);
        let txn = TransactionId::new();

        let handle = db.pool.fetch_page(txn, pid(0), Permissions::ReadOnly).unwrap();
        {
            let mut page = handle.write();
            page.insert_tuple(Tuple::new("checkpointed")).unwrap();
            page.mark_dirty(true, None);
        }
        drop(handle);

        db.pool.fetch_page(txn, pid(1), Permissions::ReadOnly).unwrap();
        db.pool.fetch_page(txn, pid(2), Permissions::ReadOnly).unwrap();

        assert!(!db.pool.contains(pid(0)));
        assert!(disk_contents(&db.file).contains(&b"checkpointed".to_vec()));
    }

    #[test]
    fn evict_page_removes_one_page() {
        let db = TestDb::new(PoolConfig::new(3), 3);
        let txn = TransactionId::new();

        for page_number in 0..3 {
            db.pool
                .fetch_page(txn, pid(page_number), Permissions::ReadOnly)
                .unwrap();
        }

        assert_eq!(db.pool.evict_page().unwrap(), pid(0));
        assert_eq!(db.pool.len(), 2);
        assert!(!db.pool.is_empty());
    }

    #[test]
    fn flush_all_pages_clears_dirty_flags() {
        let db = TestDb::new(PoolConfig::new(4), 1);
        let txn = TransactionId::new();

        db.pool
            .insert_tuple(txn, TABLE_ID, Tuple::new("flushed"))
            .unwrap();
        let handle = db.pool.fetch_page(txn, pid(0), Permissions::ReadOnly).unwrap();
        assert_eq!(handle.read().dirtied_by(), Some(txn));

        db.pool.flush_all_pages().unwrap();

        assert!(!handle.read().is_dirty());
        assert_eq!(
            disk_contents(&db.file),
            vec![b"page-0".to_vec(), b"flushed".to_vec()]
        );
    }

    #[test]
    fn flush_pages_only_touches_one_transaction() {
        let db = TestDb::new(PoolConfig::new(4), 2);
        let (t1, t2) = (TransactionId::new(), TransactionId::new());

        let first = db.pool.fetch_page(t1, pid(0), Permissions::ReadWrite).unwrap();
        let second = db.pool.fetch_page(t2, pid(1), Permissions::ReadWrite).unwrap();
        for (handle, txn, data) in [(&first, t1, "mine"), (&second, t2, "theirs")] {
            let mut page = handle.write();
            page.insert_tuple(Tuple::new(data)).unwrap();
            page.mark_dirty(true, Some(txn));
        }

        db.pool.flush_pages(t1).unwrap();

        assert!(!first.read().is_dirty());
        assert_eq!(second.read().dirtied_by(), Some(t2));

        let on_disk = disk_contents(&db.file);
        assert!(on_disk.contains(&b"mine".to_vec()));
        assert!(!on_disk.contains(&b"theirs".to_vec()));
    }

    #[test]
    fn discard_page_drops_cached_changes() {
        let db = TestDb::new(PoolConfig::new(4), 1);
        let txn = TransactionId::new();

        let handle = db.pool.fetch_page(txn, pid(0), Permissions::ReadOnly).unwrap();
        handle.write().insert_tuple(Tuple::new("lost")).unwrap();

        db.pool.discard_page(pid(0));
        db.pool.discard_page(pid(0));
        assert!(!db.pool.contains(pid(0)));

        let reloaded = db.pool.fetch_page(txn, pid(0), Permissions::ReadOnly).unwrap();
        assert!(!reloaded.same_page(&handle));
        assert_eq!(reloaded.read().num_tuples(), 1);
    }

    #[test]
    fn failed_fetch_leaves_cache_unchanged() {
        let db = TestDb::new(PoolConfig::new(1), 1);
        let txn = TransactionId::new();

        db.pool.fetch_page(txn, pid(0), Permissions::ReadOnly).unwrap();

        assert!(matches!(
            db.pool.fetch_page(txn, pid(9), Permissions::ReadOnly),
            Err(DbError::PageNotFound { page }) if page == pid(9)
        ));
        assert!(matches!(
            db.pool.fetch_page(txn, PageId::new(TABLE_ID + 1, 0), Permissions::ReadOnly),
            Err(DbError::NoSuchTable { .. })
        ));

        assert_eq!(db.pool.cached_pages(), vec![pid(0)]);
    }

    #[test]
    fn mismatched_page_size_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = Arc::new(HeapFile::create(dir.path().join("small.dat"), TABLE_ID, 512).unwrap());
        file.allocate_page().unwrap();

        let catalog = Arc::new(Catalog::new());
        catalog.add_table("small", file);
        let pool = BufferPool::new(PoolConfig::new(2), catalog).unwrap();

        assert!(matches!(
            pool.fetch_page(TransactionId::new(), pid(0), Permissions::ReadOnly),
            Err(DbError::InvalidConfig(_))
        ));
        assert!(pool.is_empty());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let catalog = Arc::new(Catalog::new());
        assert!(matches!(
            BufferPool::new(PoolConfig::new(0), catalog),
            Err(DbError::InvalidConfig(_))
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn cache_never_exceeds_capacity(
            capacity in 1usize..4,
            accesses in proptest::collection::vec(0u32..6, 1..40),
        ) {
            let db = TestDb::new(PoolConfig::new(capacity), 6);

            for page_number in accesses {
                let txn = TransactionId::new();
                let handle = db.pool.fetch_page(txn, pid(page_number), Permissions::ReadOnly).unwrap();

                let expected = format!("page-{}", page_number);
                {
                    let page = handle.read();
                    prop_assert_eq!(&page.tuple(0).unwrap().data[..], expected.as_bytes());
                }
                prop_assert!(db.pool.len() <= capacity);
                prop_assert!(db.pool.contains(pid(page_number)));

                db.pool.commit(txn).unwrap();
            }
        }
    }
}
