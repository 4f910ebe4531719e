use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::types::TxnId;
use crate::transaction::transaction::{IsolationLevel, Transaction, TransactionState};

/// Process-wide transaction registry.
///
/// Assigns monotonically increasing transaction IDs (so the ID order is the
/// age order wound-wait relies on) and resolves IDs back to live transactions.
/// The lock manager receives the registry explicitly at construction; there is
/// no hidden global map.
pub struct TransactionManager {
    next_txn_id: AtomicU32,
    txn_map: Mutex<HashMap<TxnId, Arc<Transaction>>>,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self {
            next_txn_id: AtomicU32::new(0),
            txn_map: Mutex::new(HashMap::new()),
        }
    }

    /// Start a transaction and register it
    pub fn begin(&self, isolation_level: IsolationLevel) -> Arc<Transaction> {
        let txn_id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        let txn = Arc::new(Transaction::new(txn_id, isolation_level));
        self.txn_map.lock().insert(txn_id, txn.clone());
        txn
    }

    /// Look up a live transaction; used by the lock manager to wound victims
    pub fn get(&self, txn_id: TxnId) -> Option<Arc<Transaction>> {
        self.txn_map.lock().get(&txn_id).cloned()
    }

    /// Mark a transaction committed and drop it from the registry. Held locks
    /// are the caller's to release through the lock manager.
    pub fn commit(&self, txn: &Transaction) {
        txn.set_state(TransactionState::Committed);
        self.txn_map.lock().remove(&txn.id());
    }

    /// Mark a transaction aborted and drop it from the registry
    pub fn abort(&self, txn: &Transaction) {
        txn.set_state(TransactionState::Aborted);
        self.txn_map.lock().remove(&txn.id());
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}
