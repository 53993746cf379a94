use std::{
    collections::{HashMap, HashSet, VecDeque},
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};
use tracing::{trace, warn};

use crate::{
    errors::{DbError, Result},
    storage::page::page::PageId,
    transaction::{LockMode, TransactionId},
};

#[derive(Debug, Clone, Copy)]
struct Waiter {
    txn: TransactionId,
    mode: LockMode,
}

// Holders and FIFO wait queue of one page
#[derive(Debug, Default)]
struct LockEntry {
    holders: HashMap<TransactionId, LockMode>,
    waiters: VecDeque<Waiter>,
}

impl LockEntry {
    fn held_mode(&self, txn: TransactionId) -> Option<LockMode> {
        self.holders.get(&txn).copied()
    }

    fn is_upgrade(&self, txn: TransactionId, mode: LockMode) -> bool {
        mode == LockMode::Exclusive && self.held_mode(txn) == Some(LockMode::Shared)
    }

    fn conflicting_holders(&self, txn: TransactionId, mode: LockMode) -> Vec<TransactionId> {
        self.holders
            .iter()
            .filter(|(holder, held)| **holder != txn && !held.compatible_with(mode))
            .map(|(holder, _)| *holder)
            .collect()
    }

    fn queue_position(&self, txn: TransactionId) -> Option<usize> {
        self.waiters.iter().position(|waiter| waiter.txn == txn)
    }

    fn can_grant(&self, txn: TransactionId, mode: LockMode) -> bool {
        if !self.conflicting_holders(txn, mode).is_empty() {
            return false;
        }

        // A sole shared holder upgrades without queueing behind its own waiters
        if self.is_upgrade(txn, mode) {
            return true;
        }

        match self.queue_position(txn) {
            Some(position) => position == 0,
            None => self.waiters.is_empty(),
        }
    }

    // Everyone `txn` has to wait for: conflicting holders plus, under FIFO, every waiter ahead
    fn blockers(&self, txn: TransactionId, mode: LockMode) -> HashSet<TransactionId> {
        let mut blockers: HashSet<TransactionId> =
            self.conflicting_holders(txn, mode).into_iter().collect();

        if !self.is_upgrade(txn, mode) {
            let ahead = self.queue_position(txn).unwrap_or(self.waiters.len());
            blockers.extend(self.waiters.iter().take(ahead).map(|waiter| waiter.txn));
        }

        blockers.remove(&txn);
        blockers
    }

    fn remove_waiter(&mut self, txn: TransactionId) -> bool {
        match self.queue_position(txn) {
            Some(position) => {
                self.waiters.remove(position);
                true
            }
            None => false,
        }
    }

    fn is_idle(&self) -> bool {
        self.holders.is_empty() && self.waiters.is_empty()
    }
}

enum Grant {
    AlreadyHeld,
    Granted,
    Blocked,
}

#[derive(Default)]
struct LockTable {
    entries: HashMap<PageId, LockEntry>,

    // Transaction footprint: every page a transaction currently holds a lock on
    txn_pages: HashMap<TransactionId, HashSet<PageId>>,

    // Edge A -> B: A is blocked on a page B holds or is queued ahead for
    waits_for: HashMap<TransactionId, HashSet<TransactionId>>,
}

impl LockTable {
    fn try_grant(&mut self, txn: TransactionId, page_id: PageId, mode: LockMode) -> Grant {
        let entry = self.entries.entry(page_id).or_default();

        if entry.held_mode(txn).map_or(false, |held| held.covers(mode)) {
            return Grant::AlreadyHeld;
        }

        if !entry.can_grant(txn, mode) {
            return Grant::Blocked;
        }

        entry.remove_waiter(txn);
        entry.holders.insert(txn, mode);

        self.txn_pages.entry(txn).or_default().insert(page_id);
        self.waits_for.remove(&txn);
        self.refresh_waiters(page_id);

        Grant::Granted
    }

    fn enqueue(&mut self, txn: TransactionId, page_id: PageId, mode: LockMode) {
        let entry = self.entries.entry(page_id).or_default();

        if entry.queue_position(txn).is_none() {
            let waiter = Waiter { txn, mode };
            if entry.is_upgrade(txn, mode) {
                entry.waiters.push_front(waiter);
            } else {
                entry.waiters.push_back(waiter);
            }
        }

        // Waiters behind an upgrade now also wait on it
        self.refresh_waiters(page_id);
    }

    // Recomputes the waits-for edges of every transaction queued on `page_id`
    fn refresh_waiters(&mut self, page_id: PageId) {
        let edges: Vec<(TransactionId, HashSet<TransactionId>)> = match self.entries.get(&page_id)
        {
            Some(entry) => entry
                .waiters
                .iter()
                .map(|waiter| (waiter.txn, entry.blockers(waiter.txn, waiter.mode)))
                .collect(),
            None => return,
        };

        for (txn, blockers) in edges {
            self.waits_for.insert(txn, blockers);
        }
    }

    fn abandon_wait(&mut self, txn: TransactionId, page_id: PageId) {
        self.waits_for.remove(&txn);

        if let Some(entry) = self.entries.get_mut(&page_id) {
            entry.remove_waiter(txn);
        }

        self.refresh_waiters(page_id);
        self.drop_if_idle(page_id);
    }

    fn drop_if_idle(&mut self, page_id: PageId) {
        if self
            .entries
            .get(&page_id)
            .map_or(false, |entry| entry.is_idle())
        {
            self.entries.remove(&page_id);
        }
    }

    fn has_cycle(&self, start: TransactionId) -> bool {
        let mut stack: Vec<TransactionId> = match self.waits_for.get(&start) {
            Some(edges) => edges.iter().copied().collect(),
            None => return false,
        };
        let mut visited: HashSet<TransactionId> = HashSet::new();

        while let Some(txn) = stack.pop() {
            if txn == start {
                return true;
            }
            if !visited.insert(txn) {
                continue;
            }
            if let Some(edges) = self.waits_for.get(&txn) {
                stack.extend(edges.iter().copied());
            }
        }

        false
    }

    fn release(&mut self, txn: TransactionId, page_id: PageId) -> bool {
        let released = self
            .entries
            .get_mut(&page_id)
            .map_or(false, |entry| entry.holders.remove(&txn).is_some());

        if !released {
            return false;
        }

        if let Some(pages) = self.txn_pages.get_mut(&txn) {
            pages.remove(&page_id);
            if pages.is_empty() {
                self.txn_pages.remove(&txn);
            }
        }

        self.refresh_waiters(page_id);
        self.drop_if_idle(page_id);
        true
    }
}

/// Page-level shared/exclusive lock table with waits-for deadlock detection.
///
/// A request that cannot be granted is queued FIFO behind earlier waiters on
/// the same page. Before the caller blocks, the waits-for graph is checked;
/// a request that would close a cycle fails with `DeadlockDetected` instead
/// of waiting. Only the calling thread blocks.
pub struct LockManager {
    table: Mutex<LockTable>,
    // Signalled whenever holders or queues change
    changed: Condvar,
    wait_timeout: Option<Duration>,
}

impl LockManager {
    pub fn new(wait_timeout: Option<Duration>) -> Self {
        Self {
            table: Mutex::new(LockTable::default()),
            changed: Condvar::new(),
            wait_timeout,
        }
    }

    pub fn acquire(&self, txn: TransactionId, page_id: PageId, mode: LockMode) -> Result<()> {
        let deadline = self.wait_timeout.map(|timeout| Instant::now() + timeout);
        let mut timed_out = false;

        let mut table = self.table.lock();

        loop {
            match table.try_grant(txn, page_id, mode) {
                Grant::AlreadyHeld => return Ok(()),
                Grant::Granted => {
                    trace!(%txn, page = %page_id, ?mode, "lock granted");
                    self.changed.notify_all();
                    return Ok(());
                }
                Grant::Blocked => {}
            }

            if timed_out {
                table.abandon_wait(txn, page_id);
                self.changed.notify_all();
                warn!(%txn, page = %page_id, ?mode, "lock wait timed out");
                return Err(DbError::LockTimeout { txn, page: page_id });
            }

            table.enqueue(txn, page_id, mode);

            if table.has_cycle(txn) {
                table.abandon_wait(txn, page_id);
                self.changed.notify_all();
                warn!(%txn, page = %page_id, ?mode, "deadlock detected");
                return Err(DbError::DeadlockDetected { txn, page: page_id });
            }

            trace!(%txn, page = %page_id, ?mode, "waiting for lock");

            match deadline {
                Some(deadline) => {
                    timed_out = self.changed.wait_until(&mut table, deadline).timed_out();
                }
                None => self.changed.wait(&mut table),
            }
        }
    }

    /// Releases one lock. Releasing a lock that is not held does nothing.
    pub fn release(&self, txn: TransactionId, page_id: PageId) {
        let mut table = self.table.lock();

        if table.release(txn, page_id) {
            trace!(%txn, page = %page_id, "lock released");
            self.changed.notify_all();
        }
    }

    /// Releases every lock held by `txn`. A second call is a no-op.
    pub fn release_all(&self, txn: TransactionId) {
        let mut table = self.table.lock();

        let pages: Vec<PageId> = table
            .txn_pages
            .get(&txn)
            .map(|pages| pages.iter().copied().collect())
            .unwrap_or_default();

        let mut changed = !pages.is_empty();
        for page_id in pages {
            table.release(txn, page_id);
        }

        // A transaction ending mid-wait leaves queue entries and edges behind
        let queued: Vec<PageId> = table
            .entries
            .iter()
            .filter(|(_, entry)| entry.queue_position(txn).is_some())
            .map(|(page_id, _)| *page_id)
            .collect();
        for page_id in queued {
            table.abandon_wait(txn, page_id);
            changed = true;
        }

        table.waits_for.remove(&txn);
        for edges in table.waits_for.values_mut() {
            edges.remove(&txn);
        }

        if changed {
            trace!(%txn, "all locks released");
            self.changed.notify_all();
        }
    }

    pub fn holds(&self, txn: TransactionId, page_id: PageId) -> bool {
        self.lock_mode(txn, page_id).is_some()
    }

    pub fn lock_mode(&self, txn: TransactionId, page_id: PageId) -> Option<LockMode> {
        self.table
            .lock()
            .entries
            .get(&page_id)
            .and_then(|entry| entry.held_mode(txn))
    }

    pub fn holders(&self, page_id: PageId) -> Vec<(TransactionId, LockMode)> {
        self.table
            .lock()
            .entries
            .get(&page_id)
            .map(|entry| {
                entry
                    .holders
                    .iter()
                    .map(|(txn, mode)| (*txn, *mode))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of transactions queued on `page_id`.
    pub fn waiting(&self, page_id: PageId) -> usize {
        self.table
            .lock()
            .entries
            .get(&page_id)
            .map_or(0, |entry| entry.waiters.len())
    }

    /// Pages `txn` holds any lock on, in page order.
    pub fn pages_locked_by(&self, txn: TransactionId) -> Vec<PageId> {
        let mut pages: Vec<PageId> = self
            .table
            .lock()
            .txn_pages
            .get(&txn)
            .map(|pages| pages.iter().copied().collect())
            .unwrap_or_default();
        pages.sort_unstable();
        pages
    }

    /// Pages that currently have an exclusive holder.
    pub fn exclusively_locked(&self) -> HashSet<PageId> {
        self.table
            .lock()
            .entries
            .iter()
            .filter(|(_, entry)| {
                entry
                    .holders
                    .values()
                    .any(|mode| *mode == LockMode::Exclusive)
            })
            .map(|(page_id, _)| *page_id)
            .collect()
    }
}
