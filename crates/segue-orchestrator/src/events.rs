//! Transition event bus
//!
//! Fan-out of status, progress and failure events to any number of listeners.
//! Persistent listeners stay until their [`Subscription`] is dropped; one-shot waiters
//! created by [`TransitionEventBus::wait_for`] remove themselves after they fire.
//!
//! Listeners are invoked outside the internal lock, so a listener may subscribe or
//! unsubscribe from inside its own callback.

use parking_lot::Mutex;
use segue_core::{FailureNotice, TransitionEvents, TransitionStatus};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// One published event
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionEvent {
    /// A phase was entered
    Status(TransitionStatus),
    /// Realtime load progress
    Progress(f32),
    /// The run failed
    Failed(FailureNotice),
}

type Listener = Arc<dyn Fn(&TransitionEvent) + Send + Sync>;

#[derive(Default)]
struct BusInner {
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
    waiters: Vec<(u64, TransitionStatus, oneshot::Sender<TransitionStatus>)>,
}

/// Shared event bus; clones publish to the same listeners
#[derive(Clone, Default)]
pub struct TransitionEventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl TransitionEventBus {
    /// Create an empty bus
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for every event
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&TransitionEvent) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.listeners.push((id, Arc::new(listener)));
        Subscription {
            bus: Arc::downgrade(&self.inner),
            id: Some(id),
        }
    }

    /// Resolve once `status` (or a terminal status) is published
    pub fn wait_for(&self, status: TransitionStatus) -> StatusWaiter {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.waiters.push((id, status, tx));
        StatusWaiter {
            bus: Arc::downgrade(&self.inner),
            id,
            rx,
        }
    }

    /// Number of persistent listeners plus pending waiters
    #[must_use]
    pub fn listener_count(&self) -> usize {
        let inner = self.inner.lock();
        inner.listeners.len() + inner.waiters.len()
    }

    /// Publish to every listener
    pub fn publish(&self, event: &TransitionEvent) {
        let (listeners, fired) = {
            let mut inner = self.inner.lock();
            let listeners: Vec<Listener> = inner.listeners.iter().map(|(_, l)| l.clone()).collect();
            let mut fired = Vec::new();
            if let TransitionEvent::Status(status) = event {
                let mut index = 0;
                while index < inner.waiters.len() {
                    let wanted = inner.waiters[index].1;
                    if wanted == *status || status.is_terminal() {
                        let (_, _, tx) = inner.waiters.swap_remove(index);
                        fired.push(tx);
                    } else {
                        index += 1;
                    }
                }
            }
            (listeners, fired)
        };

        if let TransitionEvent::Status(status) = event {
            for tx in fired {
                // Receiver may already be gone
                let _ = tx.send(*status);
            }
        }
        for listener in listeners {
            listener(event);
        }
    }
}

impl TransitionEvents for TransitionEventBus {
    fn emit(&self, status: TransitionStatus) {
        self.publish(&TransitionEvent::Status(status));
    }

    fn progress(&self, value: f32) {
        self.publish(&TransitionEvent::Progress(value));
    }

    fn failed(&self, notice: &FailureNotice) {
        self.publish(&TransitionEvent::Failed(notice.clone()));
    }
}

impl fmt::Debug for TransitionEventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("TransitionEventBus")
            .field("listeners", &inner.listeners.len())
            .field("waiters", &inner.waiters.len())
            .finish()
    }
}

/// Listener registration; unsubscribes on drop
#[derive(Debug)]
pub struct Subscription {
    bus: Weak<Mutex<BusInner>>,
    id: Option<u64>,
}

impl Subscription {
    /// Keep the listener for the bus's lifetime
    pub fn forget(mut self) {
        self.id = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let (Some(id), Some(bus)) = (self.id, self.bus.upgrade()) {
            bus.lock().listeners.retain(|(listener, _)| *listener != id);
        }
    }
}

/// Future returned by [`TransitionEventBus::wait_for`].
///
/// Yields the status that woke it: the awaited one, or the terminal status that ended
/// the run first. Yields `None` if the bus went away.
#[derive(Debug)]
pub struct StatusWaiter {
    bus: Weak<Mutex<BusInner>>,
    id: u64,
    rx: oneshot::Receiver<TransitionStatus>,
}

impl Future for StatusWaiter {
    type Output = Option<TransitionStatus>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(Result::ok)
    }
}

impl Drop for StatusWaiter {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            let id = self.id;
            bus.lock().waiters.retain(|(waiter, _, _)| *waiter != id);
        }
    }
}
