//! Optimistic-update transaction.
//!
//! Snapshot the prior state, apply the speculative change, attempt the
//! remote operation, then either commit (discard the snapshot) or roll back
//! (restore it).

/// Lifecycle of one optimistic update.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TxnState {
    #[default]
    Idle,
    Pending,
    Committed,
    RolledBack,
}

#[derive(Debug)]
pub struct OptimisticTxn<T> {
    state: TxnState,
    snapshot: Option<T>,
}

impl<T> OptimisticTxn<T> {
    pub fn new() -> Self {
        Self {
            state: TxnState::Idle,
            snapshot: None,
        }
    }

    pub fn state(&self) -> TxnState {
        self.state
    }

    /// Records the pre-mutation snapshot. Only valid from `Idle`.
    pub fn begin(&mut self, snapshot: T) -> bool {
        if self.state != TxnState::Idle {
            return false;
        }
        self.snapshot = Some(snapshot);
        self.state = TxnState::Pending;
        true
    }

    /// The remote operation succeeded; the speculative state is now
    /// authoritative and the snapshot is discarded.
    pub fn commit(&mut self) -> bool {
        if self.state != TxnState::Pending {
            return false;
        }
        self.snapshot = None;
        self.state = TxnState::Committed;
        true
    }

    /// The remote operation failed; hands back the snapshot to restore.
    pub fn rollback(&mut self) -> Option<T> {
        if self.state != TxnState::Pending {
            return None;
        }
        self.state = TxnState::RolledBack;
        self.snapshot.take()
    }
}

impl<T> Default for OptimisticTxn<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_discards_snapshot() {
        let mut txn = OptimisticTxn::new();
        assert!(txn.begin("before"));
        assert_eq!(txn.state(), TxnState::Pending);
        assert!(txn.commit());
        assert_eq!(txn.state(), TxnState::Committed);
        assert!(txn.rollback().is_none());
    }

    #[test]
    fn test_rollback_returns_snapshot() {
        let mut txn = OptimisticTxn::new();
        txn.begin("before");
        assert_eq!(txn.rollback(), Some("before"));
        assert_eq!(txn.state(), TxnState::RolledBack);
    }

    #[test]
    fn test_invalid_transitions_are_rejected() {
        let mut txn: OptimisticTxn<&str> = OptimisticTxn::new();
        assert!(!txn.commit());
        assert!(txn.rollback().is_none());
        txn.begin("a");
        assert!(!txn.begin("b"));
        txn.commit();
        assert!(!txn.commit());
    }
}
