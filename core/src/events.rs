//! Unauthorized-response broadcast.
//!
//! # Design
//! Two kinds of subscribers are supported. Async consumers take an
//! unbounded receiver; dropping it unsubscribes, and closed senders are
//! pruned on the next emit. Hosts that cannot poll a channel (the C ABI)
//! register a callback listener instead. Both lists live behind one mutex
//! and are snapshotted before delivery, so callbacks run without the lock
//! held and may themselves subscribe or unsubscribe. Every subscriber
//! attached before an emit receives that event exactly once, however far
//! behind it is.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

/// Zero-payload signal sent once per response classified as 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnauthorizedEvent;

/// Receiving end handed out by `UnauthorizedEvents::subscribe`.
pub type UnauthorizedReceiver = mpsc::UnboundedReceiver<UnauthorizedEvent>;

type Listener = Arc<dyn Fn() + Send + Sync>;

/// Handle returned by `UnauthorizedEvents::add_listener`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct Subscribers {
    channels: Vec<mpsc::UnboundedSender<UnauthorizedEvent>>,
    listeners: Vec<(ListenerId, Listener)>,
}

pub struct UnauthorizedEvents {
    subscribers: Mutex<Subscribers>,
    next_listener: AtomicU64,
    emitted: AtomicU64,
}

impl std::fmt::Debug for UnauthorizedEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnauthorizedEvents")
            .field("subscribers", &self.subscriber_count())
            .field("emitted", &self.emitted())
            .finish_non_exhaustive()
    }
}

impl Default for UnauthorizedEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl UnauthorizedEvents {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Subscribers::default()),
            next_listener: AtomicU64::new(0),
            emitted: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> UnauthorizedReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().channels.push(tx);
        rx
    }

    pub fn add_listener(&self, listener: impl Fn() + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.lock().listeners.push((id, Arc::new(listener)));
        id
    }

    /// Returns false if `id` was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let listeners = &mut self.lock().listeners;
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// Open channel receivers plus callback listeners.
    pub fn subscriber_count(&self) -> usize {
        let subscribers = self.lock();
        let open = subscribers.channels.iter().filter(|tx| !tx.is_closed()).count();
        open + subscribers.listeners.len()
    }

    /// Number of events emitted since creation.
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    pub fn emit(&self) {
        self.emitted.fetch_add(1, Ordering::Relaxed);

        let (channels, listeners) = {
            let mut subscribers = self.lock();
            subscribers.channels.retain(|tx| !tx.is_closed());
            let listeners: Vec<Listener> = subscribers
                .listeners
                .iter()
                .map(|(_, l)| Arc::clone(l))
                .collect();
            (subscribers.channels.clone(), listeners)
        };
        for tx in channels {
            // A receiver dropped since the snapshot is simply skipped.
            let _ = tx.send(UnauthorizedEvent);
        }
        for listener in listeners {
            listener();
        }
    }

    fn lock(&self) -> MutexGuard<'_, Subscribers> {
        // A panicking listener never runs under the lock, so poisoning only
        // means a panic elsewhere; the lists themselves are still consistent.
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn emit_without_subscribers_is_counted() {
        let events = UnauthorizedEvents::new();
        events.emit();
        assert_eq!(events.emitted(), 1);
        assert_eq!(events.subscriber_count(), 0);
    }

    #[test]
    fn every_receiver_sees_each_event_once() {
        let events = UnauthorizedEvents::new();
        let mut receivers: Vec<_> = (0..5).map(|_| events.subscribe()).collect();
        events.emit();
        for rx in &mut receivers {
            assert_eq!(rx.try_recv().unwrap(), UnauthorizedEvent);
            assert!(rx.try_recv().is_err());
        }
    }

    #[test]
    fn slow_receiver_gets_every_event() {
        let events = UnauthorizedEvents::new();
        let mut rx = events.subscribe();
        for _ in 0..500 {
            events.emit();
        }
        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, 500);
        assert_eq!(events.emitted(), 500);
    }

    #[test]
    fn dropped_receivers_are_pruned() {
        let events = UnauthorizedEvents::new();
        let kept = events.subscribe();
        drop(events.subscribe());
        assert_eq!(events.subscriber_count(), 1);
        events.emit();
        drop(kept);
        events.emit();
        assert_eq!(events.subscriber_count(), 0);
    }

    #[test]
    fn receiver_attached_after_emit_sees_nothing() {
        let events = UnauthorizedEvents::new();
        events.emit();
        let mut late = events.subscribe();
        assert!(late.try_recv().is_err());
    }

    #[test]
    fn listeners_fire_and_can_be_removed() {
        let events = UnauthorizedEvents::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let id = events.add_listener(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        events.emit();
        assert!(events.remove_listener(id));
        assert!(!events.remove_listener(id));
        events.emit();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(events.emitted(), 2);
    }

    #[test]
    fn listener_may_unsubscribe_itself_during_delivery() {
        let events = Arc::new(UnauthorizedEvents::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));

        let (ev, counter, own_id) = (Arc::clone(&events), Arc::clone(&hits), Arc::clone(&slot));
        let id = events.add_listener(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            if let Some(id) = *own_id.lock().unwrap() {
                ev.remove_listener(id);
            }
        });
        *slot.lock().unwrap() = Some(id);

        events.emit();
        events.emit();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_subscribe_and_emit() {
        let events = Arc::new(UnauthorizedEvents::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let events = Arc::clone(&events);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        if i % 2 == 0 {
                            let id = events.add_listener(|| {});
                            events.remove_listener(id);
                        } else {
                            events.emit();
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(events.emitted(), 400);
        assert_eq!(events.subscriber_count(), 0);
    }
}
