//! Change-notification fan-out with unsubscribe handles.
//!
//! Callbacks run outside the registry lock: `emit` moves the callback list
//! out, invokes each one, then merges back anything subscribed during the
//! emission and drops anything unsubscribed during it. A callback may
//! therefore subscribe or drop its own `Subscription` without deadlocking.
//! Removed callbacks are likewise dropped only after the lock is released.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::session::ChangeNotice;

type Callback = Box<dyn FnMut(&ChangeNotice) + Send>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: Vec<(u64, Callback)>,
    emitting: bool,
    removed_during_emit: Vec<u64>,
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone, Default)]
pub struct Subscribers {
    inner: Arc<Mutex<Registry>>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(&ChangeNotice) + Send + 'static,
    {
        let mut reg = lock(&self.inner);
        reg.next_id += 1;
        let id = reg.next_id;
        reg.entries.push((id, Box::new(callback)));
        Subscription {
            id,
            registry: Arc::downgrade(&self.inner),
            active: true,
        }
    }

    pub fn emit(&self, notice: &ChangeNotice) {
        let mut taken = {
            let mut reg = lock(&self.inner);
            reg.emitting = true;
            std::mem::take(&mut reg.entries)
        };
        for (_, callback) in taken.iter_mut() {
            callback(notice);
        }
        let dropped: Vec<(u64, Callback)> = {
            let mut reg = lock(&self.inner);
            reg.emitting = false;
            let removed = std::mem::take(&mut reg.removed_during_emit);
            let (mut kept, dropped): (Vec<_>, Vec<_>) =
                taken.into_iter().partition(|(id, _)| !removed.contains(id));
            kept.append(&mut reg.entries);
            reg.entries = kept;
            dropped
        };
        drop(dropped);
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every callback. Outstanding handles become inert.
    pub fn clear(&self) {
        let dropped = std::mem::take(&mut lock(&self.inner).entries);
        drop(dropped);
    }
}

fn unsubscribe(registry: &Weak<Mutex<Registry>>, id: u64) {
    let Some(inner) = registry.upgrade() else {
        return;
    };
    let removed = {
        let mut reg = lock(&inner);
        match reg.entries.iter().position(|(entry, _)| *entry == id) {
            Some(pos) => Some(reg.entries.remove(pos)),
            None => {
                if reg.emitting {
                    reg.removed_during_emit.push(id);
                }
                None
            }
        }
    };
    drop(removed);
}

/// Handle returned by `subscribe`. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
    active: bool,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.release();
    }

    /// Keep the callback registered for the registry's whole lifetime.
    pub fn detach(mut self) {
        self.active = false;
    }

    fn release(&mut self) {
        if std::mem::replace(&mut self.active, false) {
            unsubscribe(&self.registry, self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}
