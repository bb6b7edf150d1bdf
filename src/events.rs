//! Status change notifications
//!
//! Consumers (dashboard pages, the CLI) subscribe a callback and get told which
//! jobs changed. Callbacks run synchronously on the publisher's task, in the order
//! they were registered.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::error;

/// Names of the jobs whose status changed in one notification
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusChange {
    pub jobs: Vec<String>,
}

impl StatusChange {
    pub fn new(jobs: Vec<String>) -> Self {
        Self { jobs }
    }

    pub fn single(name: &str) -> Self {
        Self {
            jobs: vec![name.to_string()],
        }
    }
}

pub type StatusCallback = Arc<dyn Fn(&StatusChange) + Send + Sync>;

/// Token returned by [`Subscribers::subscribe`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct SubscriberList {
    next_id: u64,
    entries: Vec<(SubscriptionId, StatusCallback)>,
}

/// Ordered set of status callbacks
#[derive(Default)]
pub struct Subscribers {
    list: Mutex<SubscriberList>,
}

impl std::fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscribers")
            .field("count", &self.len())
            .finish()
    }
}

fn same_callback(a: &StatusCallback, b: &StatusCallback) -> bool {
    // Compare allocations only; vtable pointers are not stable across codegen units
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SubscriberList> {
        // Callbacks never run under this lock, so a poisoned list is still consistent
        self.list.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a callback. Registering the same `Arc` again returns its existing id.
    pub fn subscribe(&self, callback: StatusCallback) -> SubscriptionId {
        let mut list = self.lock();

        if let Some((id, _)) = list
            .entries
            .iter()
            .find(|(_, existing)| same_callback(existing, &callback))
        {
            return *id;
        }

        let id = SubscriptionId(list.next_id);
        list.next_id += 1;
        list.entries.push((id, callback));
        id
    }

    /// Remove a subscription. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut list = self.lock();
        let before = list.entries.len();
        list.entries.retain(|(existing, _)| *existing != id);
        list.entries.len() != before
    }

    /// Remove a subscription by callback identity
    pub fn unsubscribe_callback(&self, callback: &StatusCallback) -> bool {
        let mut list = self.lock();
        let before = list.entries.len();
        list.entries
            .retain(|(_, existing)| !same_callback(existing, callback));
        list.entries.len() != before
    }

    /// Invoke every callback in registration order
    ///
    /// A panicking callback is logged and skipped; the rest still run.
    pub fn publish(&self, change: &StatusChange) {
        // Snapshot so callbacks may subscribe/unsubscribe or query the manager
        let callbacks: Vec<(SubscriptionId, StatusCallback)> = self.lock().entries.clone();

        for (id, callback) in callbacks {
            let result = panic::catch_unwind(AssertUnwindSafe(|| callback(change)));
            if let Err(payload) = result {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(subscription = id.0, "Error in status change callback: {message}");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
