use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

pub mod lifecycle;
pub mod lock_manager;

// Transaction monotonically increasing identifier
static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque transaction identity. Carries no state beyond uniqueness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(u64);

impl TransactionId {
    pub fn new() -> Self {
        TransactionId(NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn#{}", self.0)
    }
}

/// Access requested when fetching a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permissions {
    ReadOnly,
    ReadWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    Shared,
    Exclusive,
}

impl From<Permissions> for LockMode {
    fn from(permissions: Permissions) -> Self {
        match permissions {
            Permissions::ReadOnly => LockMode::Shared,
            Permissions::ReadWrite => LockMode::Exclusive,
        }
    }
}

impl LockMode {
    /// Whether holding `self` already satisfies a request for `requested`.
    pub fn covers(&self, requested: LockMode) -> bool {
        matches!(
            (self, requested),
            (LockMode::Exclusive, _) | (LockMode::Shared, LockMode::Shared)
        )
    }

    pub fn compatible_with(&self, other: LockMode) -> bool {
        matches!((self, other), (LockMode::Shared, LockMode::Shared))
    }
}
