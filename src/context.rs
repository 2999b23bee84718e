//! Execution-context identity and the per-context connection registry.
//!
//! A connection lives as long as its context:
//! - a [`SimpleDb::scope`](crate::SimpleDb::scope) keeps it until the scoped future ends or is dropped;
//! - an OS thread keeps it until the thread exits;
//! - any other tokio task keeps it while a [`ContextConnection`] is held.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, ThreadId};

use crate::traits::DatabaseDriver;

tokio::task_local! {
    static SCOPE: u64;
}

static NEXT_SCOPE: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_SLOTS: RefCell<Vec<ThreadSlot>> = const { RefCell::new(Vec::new()) };
}

/// Identifies the execution context a connection belongs to: the innermost
/// [`SimpleDb::scope`](crate::SimpleDb::scope), else the running tokio task,
/// else the OS thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextId {
    Scope(u64),
    Task(tokio::task::Id),
    Thread(ThreadId),
}

impl ContextId {
    pub fn current() -> Self {
        if let Ok(scope) = SCOPE.try_with(|id| *id) {
            return ContextId::Scope(scope);
        }
        match tokio::task::try_id() {
            Some(id) => ContextId::Task(id),
            None => ContextId::Thread(thread::current().id()),
        }
    }

    /// Task contexts cannot be observed ending, so their connection only
    /// lives while it is leased.
    pub fn is_lease_bound(&self) -> bool {
        matches!(self, ContextId::Task(_))
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextId::Scope(id) => write!(f, "scope-{id}"),
            ContextId::Task(id) => write!(f, "task-{id}"),
            ContextId::Thread(id) => write!(f, "{id:?}"),
        }
    }
}

/// Runs `future` as a fresh scope context.
pub(crate) fn scoped<F: Future>(future: F) -> (ContextId, impl Future<Output = F::Output>) {
    let id = NEXT_SCOPE.fetch_add(1, Ordering::Relaxed);
    (ContextId::Scope(id), SCOPE.scope(id, future))
}

/// Transaction state of a context connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionState {
    /// No active transaction (autocommit mode)
    #[default]
    Autocommit,
    /// Transaction in progress
    Transaction,
}

struct ContextSlot {
    driver: Arc<dyn DatabaseDriver>,
    transaction: TransactionState,
    generation: u64,
    leases: usize,
}

#[derive(Default)]
struct Slots {
    map: HashMap<ContextId, ContextSlot>,
    next_generation: u64,
}

/// Connections keyed by execution context.
///
/// The lock is only held for map operations, never across an `.await`, and
/// connections are closed after it is released.
#[derive(Clone, Default)]
pub(crate) struct ContextRegistry {
    shared: Arc<Mutex<Slots>>,
}

impl ContextRegistry {
    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Leases the open connection of `context`. A closed one is discarded.
    pub(crate) fn lease(&self, context: ContextId) -> Option<ContextConnection> {
        let mut slots = self.slots();
        let slot = slots.map.get_mut(&context)?;
        if slot.driver.is_closed() {
            slots.map.remove(&context);
            return None;
        }
        slot.leases += 1;
        Some(ContextConnection {
            driver: Arc::clone(&slot.driver),
            registry: self.clone(),
            context,
            generation: slot.generation,
        })
    }

    /// Stores a freshly opened connection for `context` and leases it.
    pub(crate) fn install(
        &self,
        context: ContextId,
        driver: Arc<dyn DatabaseDriver>,
    ) -> ContextConnection {
        let generation = {
            let mut slots = self.slots();
            slots.next_generation += 1;
            let generation = slots.next_generation;
            slots.map.insert(
                context,
                ContextSlot {
                    driver: Arc::clone(&driver),
                    transaction: TransactionState::Autocommit,
                    generation,
                    leases: 1,
                },
            );
            generation
        };
        if let ContextId::Thread(_) = context {
            self.close_on_thread_exit(context);
        }
        ContextConnection {
            driver,
            registry: self.clone(),
            context,
            generation,
        }
    }

    fn close_on_thread_exit(&self, context: ContextId) {
        let registry = Arc::downgrade(&self.shared);
        // Fails only while the thread is already tearing down its locals.
        let _ = THREAD_SLOTS.try_with(|slots| {
            let mut slots = slots.borrow_mut();
            slots.retain(|slot| slot.registry.strong_count() > 0);
            if !slots.iter().any(|slot| slot.registry.ptr_eq(&registry)) {
                slots.push(ThreadSlot { registry, context });
            }
        });
    }

    pub(crate) fn remove(&self, context: ContextId) -> Option<Arc<dyn DatabaseDriver>> {
        self.slots().map.remove(&context).map(|slot| slot.driver)
    }

    /// Closes and forgets the connection of `context`; returns whether there was one.
    pub(crate) fn close(&self, context: ContextId) -> bool {
        match self.remove(context) {
            Some(driver) => {
                driver.close();
                true
            }
            None => false,
        }
    }

    fn end_lease(&self, context: ContextId, generation: u64) {
        let expired = {
            let mut slots = self.slots();
            match slots.map.get_mut(&context) {
                Some(slot) if slot.generation == generation => {
                    slot.leases = slot.leases.saturating_sub(1);
                    if slot.leases == 0 && context.is_lease_bound() {
                        slots.map.remove(&context)
                    } else {
                        None
                    }
                }
                _ => None,
            }
        };
        if let Some(slot) = expired {
            if slot.transaction == TransactionState::Transaction {
                tracing::warn!(%context, "connection dropped with an open transaction; it is rolled back");
            }
            slot.driver.close();
            tracing::trace!(%context, "closed connection of finished lease");
        }
    }

    /// Number of outstanding leases on the connection of `context`.
    pub(crate) fn leases(&self, context: ContextId) -> usize {
        self.slots()
            .map
            .get(&context)
            .map(|slot| slot.leases)
            .unwrap_or_default()
    }

    /// Drops every slot whose connection has closed; returns how many were dropped.
    pub(crate) fn purge_closed(&self) -> usize {
        let mut slots = self.slots();
        let before = slots.map.len();
        slots.map.retain(|_, slot| !slot.driver.is_closed());
        before - slots.map.len()
    }

    pub(crate) fn transaction_state(&self, context: ContextId) -> TransactionState {
        self.slots()
            .map
            .get(&context)
            .map(|slot| slot.transaction)
            .unwrap_or_default()
    }

    pub(crate) fn set_transaction_state(&self, context: ContextId, state: TransactionState) {
        if let Some(slot) = self.slots().map.get_mut(&context) {
            slot.transaction = state;
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots().map.len()
    }

    /// Closes the connection of `context` when the returned guard drops.
    pub(crate) fn exit_guard(&self, context: ContextId) -> ContextExit {
        ContextExit {
            registry: self.clone(),
            context,
        }
    }
}

/// Closes a thread's connection when the thread exits.
struct ThreadSlot {
    registry: Weak<Mutex<Slots>>,
    context: ContextId,
}

impl Drop for ThreadSlot {
    fn drop(&mut self) {
        if let Some(shared) = self.registry.upgrade() {
            if (ContextRegistry { shared }).close(self.context) {
                tracing::trace!(context = %self.context, "closed connection of exiting thread");
            }
        }
    }
}

pub(crate) struct ContextExit {
    registry: ContextRegistry,
    context: ContextId,
}

impl Drop for ContextExit {
    fn drop(&mut self) {
        if self.registry.close(self.context) {
            tracing::trace!(context = %self.context, "closed connection of finished scope");
        }
    }
}

/// A leased context connection.
///
/// Dereferences to the driver. For a plain tokio task, dropping the last
/// lease closes the connection; hold one across statements to reuse it.
pub struct ContextConnection {
    driver: Arc<dyn DatabaseDriver>,
    registry: ContextRegistry,
    context: ContextId,
    generation: u64,
}

impl ContextConnection {
    pub fn driver(&self) -> &Arc<dyn DatabaseDriver> {
        &self.driver
    }

    pub fn context(&self) -> ContextId {
        self.context
    }
}

impl Deref for ContextConnection {
    type Target = dyn DatabaseDriver;

    fn deref(&self) -> &Self::Target {
        self.driver.as_ref()
    }
}

impl Drop for ContextConnection {
    fn drop(&mut self) {
        self.registry.end_lease(self.context, self.generation);
    }
}

impl fmt::Debug for ContextConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextConnection")
            .field("context", &self.context)
            .field("closed", &self.driver.is_closed())
            .finish()
    }
}
