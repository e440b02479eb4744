//! # Event bus for broadcasting runtime events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that provides
//! non-blocking event publishing from the spawner, the worker actors, the shutdown
//! coordinator and the exit aggregator.
//!
//! ## Architecture
//! ```text
//! Publishers (many):                    Subscriber (one):
//!   Spawner      ──┐
//!   WorkerActor  ──┼────► Bus ───────► subscriber_listener ────► SubscriberSet
//!   Coordinator  ──┤ (broadcast chan)    (in Launcher::run)
//!   Aggregator   ──┘
//! ```
//!
//! The launcher uses a single receiver (its subscriber listener) that fans events out
//! to user-defined subscribers via [`SubscriberSet`](crate::SubscriberSet).
//! A bus lives for exactly one launch: once every clone is dropped the listener
//! drains what is left and exits.
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks; it calls `broadcast::Sender::send`.
//! - **Bounded capacity**: a single ring buffer stores recent events for all receivers.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip `n` oldest items.
//! - **No persistence**: events are lost if there are no active receivers at send time.
//!
//! ## Capacity and lag
//! The ring buffer is shared by every receiver and sized by
//! `LaunchConfig::bus_capacity` (1024 by default, clamped to at least 1). A
//! launch publishes a handful of events per worker, so the default only fills
//! up with thousands of workers or a stalled listener. When it does:
//! - the buffer keeps the newest `capacity` events and overwrites the oldest;
//! - the lagging receiver's next `recv()` returns `RecvError::Lagged(n)`, then
//!   resumes with the oldest event still buffered;
//! - the launcher's listener logs the skip count with `warn!` and carries on,
//!   so a lag costs log lines, never the launch.
//!
//! Subscriber queues are a second, per-subscriber bound behind the bus; see
//! [`SubscriberSet`](crate::SubscriberSet).

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for launcher events.
///
/// Cloned into every publisher of a launch. Publishing never blocks and never
/// fails; an event sent while nobody listens is simply gone.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus whose ring buffer holds `capacity` events.
    ///
    /// ### Notes
    /// - The capacity is shared by all receivers, not allotted per receiver.
    /// - `0` is clamped to `1`; `broadcast::channel` rejects zero.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all current receivers.
    ///
    /// The channel clones the event once per receiver. With no receiver the
    /// event is dropped and the call still returns immediately.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a receiver that observes events sent after this call.
    ///
    /// Each receiver tracks its own position; one that falls more than
    /// `capacity` events behind sees `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use tokio::sync::broadcast::error::RecvError;

    #[tokio::test]
    async fn receiver_drains_then_sees_closed() {
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();

        bus.publish(Event::now(EventKind::WorkerSpawned));
        bus.publish(Event::now(EventKind::WorkerExited));
        drop(bus);

        assert_eq!(rx.recv().await.unwrap().kind, EventKind::WorkerSpawned);
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::WorkerExited);
        assert!(matches!(rx.recv().await, Err(RecvError::Closed)));
    }

    #[tokio::test]
    async fn lagging_receiver_skips_the_oldest_events() {
        let bus = Bus::new(2);
        let mut rx = bus.subscribe();

        let seqs: Vec<u64> = (0..4)
            .map(|_| {
                let ev = Event::now(EventKind::WorkerSpawned);
                let seq = ev.seq;
                bus.publish(ev);
                seq
            })
            .collect();

        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(2))));
        assert_eq!(rx.recv().await.unwrap().seq, seqs[2]);
        assert_eq!(rx.recv().await.unwrap().seq, seqs[3]);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let bus = Bus::new(0);
        let _rx = bus.subscribe();
        bus.publish(Event::now(EventKind::ShutdownCompleted));
    }
}
