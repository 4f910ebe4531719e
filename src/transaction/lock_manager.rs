use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use log::debug;
use parking_lot::{Condvar, Mutex};

use crate::common::types::{Rid, TxnId};
use crate::transaction::transaction::{IsolationLevel, Transaction, TransactionState};
use crate::transaction::transaction_manager::TransactionManager;

/// Row lock modes; shared locks are mutually compatible, an exclusive lock
/// excludes everything else
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

#[derive(Debug)]
struct LockRequest {
    txn_id: TxnId,
    mode: LockMode,
    granted: bool,
}

#[derive(Default)]
struct LockRequestQueue {
    requests: VecDeque<LockRequest>,
    /// At most one transaction may upgrade S -> X per RID at a time
    upgrading: Option<TxnId>,
    // behind an Arc so a waiter survives the table rehashing under it
    cv: Arc<Condvar>,
}

/// Row-level two-phase lock manager with wound-wait deadlock prevention.
///
/// Older transactions (smaller IDs) *wound* younger conflicting holders: the
/// victim's state flips to `Aborted`, its grant is withdrawn, and the queue is
/// notified so the victim's own waiting call can observe the abort and return.
/// Younger transactions waiting on older holders simply wait.
///
/// One manager-wide mutex serializes the lock table; per-RID condition
/// variables carry the wakeups. The transaction registry is passed in at
/// construction so wounding never reaches for global state.
pub struct LockManager {
    txn_manager: Arc<TransactionManager>,
    lock_table: Mutex<HashMap<Rid, LockRequestQueue>>,
}

impl LockManager {
    pub fn new(txn_manager: Arc<TransactionManager>) -> Self {
        Self {
            txn_manager,
            lock_table: Mutex::new(HashMap::new()),
        }
    }

    fn wound(&self, victim_id: TxnId) {
        if let Some(victim) = self.txn_manager.get(victim_id) {
            debug!("wound-wait aborts transaction {}", victim_id);
            victim.set_state(TransactionState::Aborted);
        }
    }

    /// Take a shared lock on `rid`.
    ///
    /// Wounds younger exclusive holders and waits behind older ones; returns
    /// false if the transaction is aborted while waiting or locks outside the
    /// growing phase. Under `ReadUncommitted` a shared lock request is a bug
    /// at the caller: the transaction is aborted but the call returns true.
    pub fn lock_shared(&self, txn: &Transaction, rid: Rid) -> bool {
        let mut table = self.lock_table.lock();
        if txn.state() != TransactionState::Growing {
            txn.set_state(TransactionState::Aborted);
            return false;
        }
        if txn.isolation_level() == IsolationLevel::ReadUncommitted {
            txn.set_state(TransactionState::Aborted);
            return true;
        }
        if txn.is_shared_locked(&rid) || txn.is_exclusive_locked(&rid) {
            return true;
        }

        loop {
            if txn.state() == TransactionState::Aborted {
                return false;
            }
            let (blocked, cv) = {
                let queue = table.entry(rid).or_default();
                let mut victims = Vec::new();
                let mut blocked = false;
                for request in queue.requests.iter_mut() {
                    if request.mode != LockMode::Exclusive || !request.granted {
                        continue;
                    }
                    if request.txn_id > txn.id() {
                        request.granted = false;
                        victims.push(request.txn_id);
                    } else {
                        blocked = true;
                        break;
                    }
                }
                for &victim_id in &victims {
                    self.wound(victim_id);
                }
                if !victims.is_empty() {
                    queue.cv.notify_all();
                }
                (blocked, queue.cv.clone())
            };
            if !blocked {
                break;
            }
            cv.wait(&mut table);
        }

        let queue = table.entry(rid).or_default();
        queue.requests.push_back(LockRequest {
            txn_id: txn.id(),
            mode: LockMode::Shared,
            granted: true,
        });
        txn.shared_lock_set().insert(rid);
        true
    }

    /// Take an exclusive lock on `rid`.
    ///
    /// Wounds every younger granted holder. Strict wound-wait for writers: an
    /// older granted holder makes the requester abort itself immediately
    /// rather than wait. A transaction holding only a shared lock on `rid` is
    /// routed through [`lock_upgrade`](Self::lock_upgrade).
    pub fn lock_exclusive(&self, txn: &Transaction, rid: Rid) -> bool {
        {
            let mut table = self.lock_table.lock();
            if txn.state() != TransactionState::Growing {
                txn.set_state(TransactionState::Aborted);
                return false;
            }
            if txn.is_exclusive_locked(&rid) {
                return true;
            }
            if !txn.is_shared_locked(&rid) {
                let queue = table.entry(rid).or_default();
                let mut victims = Vec::new();
                let mut older_holder = false;
                for request in queue.requests.iter_mut() {
                    if !request.granted {
                        continue;
                    }
                    if request.txn_id > txn.id() {
                        request.granted = false;
                        victims.push(request.txn_id);
                    } else {
                        older_holder = true;
                        break;
                    }
                }
                for &victim_id in &victims {
                    self.wound(victim_id);
                }
                if !victims.is_empty() {
                    queue.cv.notify_all();
                }
                if older_holder {
                    txn.set_state(TransactionState::Aborted);
                    return false;
                }
                queue.requests.push_back(LockRequest {
                    txn_id: txn.id(),
                    mode: LockMode::Exclusive,
                    granted: true,
                });
                txn.exclusive_lock_set().insert(rid);
                return true;
            }
        }
        // already holds S on this rid
        self.lock_upgrade(txn, rid)
    }

    /// Upgrade a held shared lock to exclusive.
    ///
    /// Only one transaction may upgrade per RID at a time; a second upgrader
    /// aborts. Wounds younger holders, waits behind older ones, and honors
    /// its own abort on wakeup.
    pub fn lock_upgrade(&self, txn: &Transaction, rid: Rid) -> bool {
        let mut table = self.lock_table.lock();
        if txn.state() != TransactionState::Growing {
            txn.set_state(TransactionState::Aborted);
            return false;
        }
        {
            let queue = table.entry(rid).or_default();
            if queue.upgrading.is_some_and(|txn_id| txn_id != txn.id()) {
                txn.set_state(TransactionState::Aborted);
                return false;
            }
        }
        if !txn.is_shared_locked(&rid) {
            txn.set_state(TransactionState::Aborted);
            return false;
        }
        table.entry(rid).or_default().upgrading = Some(txn.id());

        loop {
            if txn.state() == TransactionState::Aborted {
                if let Some(queue) = table.get_mut(&rid) {
                    if queue.upgrading == Some(txn.id()) {
                        queue.upgrading = None;
                    }
                }
                return false;
            }
            let (blocked, cv) = {
                let queue = table.entry(rid).or_default();
                let mut victims = Vec::new();
                let mut blocked = false;
                for request in queue.requests.iter_mut() {
                    if request.txn_id == txn.id() || !request.granted {
                        continue;
                    }
                    if request.txn_id > txn.id() {
                        request.granted = false;
                        victims.push(request.txn_id);
                    } else {
                        blocked = true;
                        break;
                    }
                }
                for &victim_id in &victims {
                    self.wound(victim_id);
                }
                if !victims.is_empty() {
                    queue.cv.notify_all();
                }
                (blocked, queue.cv.clone())
            };
            if !blocked {
                break;
            }
            cv.wait(&mut table);
        }

        let queue = table.entry(rid).or_default();
        if let Some(request) = queue.requests.iter_mut().find(|r| r.txn_id == txn.id()) {
            request.mode = LockMode::Exclusive;
            request.granted = true;
        }
        queue.upgrading = None;
        txn.shared_lock_set().remove(&rid);
        txn.exclusive_lock_set().insert(rid);
        true
    }

    /// Release whatever lock the transaction holds on `rid`.
    ///
    /// Outside `ReadCommitted` the first release moves a growing transaction
    /// into the shrinking phase; read committed may release shared locks
    /// early without shrinking.
    pub fn unlock(&self, txn: &Transaction, rid: Rid) -> bool {
        let mut table = self.lock_table.lock();
        if txn.state() == TransactionState::Growing
            && txn.isolation_level() != IsolationLevel::ReadCommitted
        {
            txn.set_state(TransactionState::Shrinking);
        }
        if let Some(queue) = table.get_mut(&rid) {
            if let Some(pos) = queue.requests.iter().position(|r| r.txn_id == txn.id()) {
                queue.requests.remove(pos);
            }
            queue.cv.notify_all();
        }
        txn.shared_lock_set().remove(&rid);
        txn.exclusive_lock_set().remove(&rid);
        true
    }
}
