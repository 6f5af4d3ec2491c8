//! Fan-out of events to bounded listener channels.

use crate::backend::{Listener, ListenerId};
use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Default buffered events per listener.
pub const DEFAULT_BUFFER_SIZE: usize = 64;

struct Inner<T> {
    /// Ordered by id, so delivery follows subscription order.
    senders: RwLock<BTreeMap<ListenerId, Sender<T>>>,
    next_id: AtomicU64,
    buffer_size: usize,
}

/// Broadcasts cloned events to every subscribed listener.
///
/// A listener whose buffer is full, or whose receiver is gone, is dropped.
/// Its channel then reports disconnection.
pub struct Broadcaster<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Broadcaster<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + 'static> Broadcaster<T> {
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                senders: RwLock::new(BTreeMap::new()),
                next_id: AtomicU64::new(1),
                buffer_size: buffer_size.max(1),
            }),
        }
    }

    /// Add a listener. Dropping the returned handle unsubscribes.
    pub fn subscribe(&self) -> Listener<T> {
        let id = ListenerId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(self.inner.buffer_size);
        self.inner.senders.write().insert(id, sender);

        let weak = Arc::downgrade(&self.inner);
        Listener::new(id, receiver, move || {
            if let Some(inner) = weak.upgrade() {
                inner.senders.write().remove(&id);
            }
        })
    }

    /// Send to every listener. Returns how many received it.
    pub fn broadcast(&self, event: T) -> usize {
        let mut delivered = 0;
        let mut to_remove = Vec::new();

        {
            let senders = self.inner.senders.read();
            for (id, sender) in senders.iter() {
                match sender.try_send(event.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        tracing::warn!(listener = %id, "dropping slow listener");
                        to_remove.push(*id);
                    }
                    Err(TrySendError::Disconnected(_)) => to_remove.push(*id),
                }
            }
        }

        if !to_remove.is_empty() {
            let mut senders = self.inner.senders.write();
            for id in to_remove {
                senders.remove(&id);
            }
        }

        delivered
    }

    /// Send to a single listener. Returns false if it is gone or full.
    pub fn send_to(&self, id: ListenerId, event: T) -> bool {
        let senders = self.inner.senders.read();
        match senders.get(&id) {
            Some(sender) => sender.try_send(event).is_ok(),
            None => false,
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.senders.read().len()
    }

    /// Drop every sender. Listeners observe disconnection once drained.
    pub fn close_all(&self) {
        self.inner.senders.write().clear();
    }
}

impl<T: Clone + Send + 'static> Default for Broadcaster<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_subscribe_unsubscribe() {
        let broadcaster: Broadcaster<u32> = Broadcaster::new();

        let listener = broadcaster.subscribe();
        assert_eq!(broadcaster.listener_count(), 1);

        listener.close();
        assert_eq!(broadcaster.listener_count(), 0);
    }

    #[test]
    fn test_broadcast_reaches_all() {
        let broadcaster = Broadcaster::new();
        let a = broadcaster.subscribe();
        let b = broadcaster.subscribe();

        assert_eq!(broadcaster.broadcast("hello".to_string()), 2);
        assert_eq!(a.recv_timeout(Duration::from_millis(100)).unwrap(), "hello");
        assert_eq!(b.recv_timeout(Duration::from_millis(100)).unwrap(), "hello");
    }

    #[test]
    fn test_drop_slow_listener() {
        let broadcaster = Broadcaster::with_buffer_size(2);
        let slow = broadcaster.subscribe();

        for i in 0..10u32 {
            broadcaster.broadcast(i);
        }

        assert_eq!(broadcaster.listener_count(), 0);
        // Buffered events are still readable, then the channel reports disconnect.
        assert_eq!(slow.try_recv().unwrap(), 0);
        assert_eq!(slow.try_recv().unwrap(), 1);
        assert!(slow.try_recv().is_err());
    }

    #[test]
    fn test_close_all_disconnects() {
        let broadcaster: Broadcaster<u32> = Broadcaster::new();
        let listener = broadcaster.subscribe();

        broadcaster.close_all();
        assert!(listener.recv_timeout(Duration::from_millis(50)).is_err());
        assert_eq!(broadcaster.broadcast(1), 0);
    }
}
