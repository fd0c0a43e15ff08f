//! Single-capacity exchange point for the live connection.
//!
//! Holding a [`SlotGuard`] is proof of exclusive access to whatever the slot
//! contains: `None` while no process is running, otherwise the one
//! [`Connection`]. Whatever the holder leaves in the guard is what the next
//! holder finds.

use std::sync::{Arc, Weak};

use sibyl_core::{Context, Done};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::connection::Connection;

pub(crate) type SlotGuard = OwnedMutexGuard<Option<Connection>>;

#[derive(Clone)]
pub(crate) struct Slot {
    inner: Arc<Mutex<Option<Connection>>>,
}

impl Slot {
    /// An empty slot: nothing started yet.
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(None)),
        }
    }

    /// Wait for exclusive access, giving up as soon as `ctx` is done.
    pub(crate) async fn checkout(&self, ctx: &Context) -> Result<SlotGuard, Done> {
        tokio::select! {
            biased;
            done = ctx.done() => Err(done),
            guard = self.inner.clone().lock_owned() => Ok(guard),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakSlot {
        WeakSlot {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

/// Slot reference that does not keep the host alive.
#[derive(Clone)]
pub(crate) struct WeakSlot {
    inner: Weak<Mutex<Option<Connection>>>,
}

impl WeakSlot {
    /// Wait for exclusive access, or `None` if the host is gone.
    pub(crate) async fn acquire(&self) -> Option<SlotGuard> {
        let inner = self.inner.upgrade()?;
        Some(inner.lock_owned().await)
    }
}
