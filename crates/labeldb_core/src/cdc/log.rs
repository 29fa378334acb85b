//! Append-only change log.

use crate::cdc::{now_ms, ChangeEvent, EventId};
use parking_lot::RwLock;
use tokio::sync::broadcast;

/// Default per-subscriber buffer size.
const DEFAULT_FEED_BUFFER: usize = 1024;

/// An append-only log of change events with two access modes.
///
/// - **Range scan** ([`CdcLog::since`]): a finite snapshot of events with
///   `ts >= ts_ms` in `(ts, id)` order, complete up to "now at scan start".
/// - **Live subscribe** ([`CdcLog::subscribe`]): an infinite sequence of
///   events appended after subscription time, in commit order.
///
/// Writers never block on slow subscribers: each subscription has a bounded
/// buffer, and a subscriber that overflows it is dropped (it observes the
/// lag on its next receive and must surface the lost-stream condition).
#[derive(Debug)]
pub struct CdcLog {
    /// Committed events in `(ts, id)` order.
    events: RwLock<Vec<ChangeEvent>>,
    /// Live fan-out to subscribers.
    live: broadcast::Sender<ChangeEvent>,
}

impl CdcLog {
    /// Creates a log with the default subscriber buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_FEED_BUFFER)
    }

    /// Creates a log with a specific per-subscriber buffer size.
    #[must_use]
    pub fn with_buffer(buffer: usize) -> Self {
        let (live, _) = broadcast::channel(buffer.max(1));
        Self {
            events: RwLock::new(Vec::new()),
            live,
        }
    }

    /// Appends an event, assigning its final id and timestamp.
    ///
    /// The timestamp is clamped to be monotone with the previous event so
    /// `(ts, id)` order always equals append order, even across wall-clock
    /// regressions. Live subscribers are notified only after the event is
    /// in the log.
    pub fn append(&self, mut event: ChangeEvent) -> ChangeEvent {
        let mut events = self.events.write();
        event.id = EventId::new();
        event.ts = now_ms().max(events.last().map_or(i64::MIN, |e| e.ts));
        events.push(event.clone());
        // Publish while still holding the log lock so per-subscriber
        // delivery order always equals commit order. The send never blocks;
        // an error only means there are no live subscribers.
        let _ = self.live.send(event.clone());
        event
    }

    /// Returns all events with `ts >= ts_ms`, in `(ts, id)` order.
    #[must_use]
    pub fn since(&self, ts_ms: i64) -> Vec<ChangeEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.ts >= ts_ms)
            .cloned()
            .collect()
    }

    /// Subscribes to events appended after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.live.subscribe()
    }

    /// Returns the number of committed events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been committed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Returns the number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.live.receiver_count()
    }
}

impl Default for CdcLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdc::{ChangeKind, WriteOp};
    use crate::entity::{Entity, EntityId};

    fn event() -> ChangeEvent {
        let id = EntityId::new();
        let mut e = Entity::new();
        e.set_id(id);
        ChangeEvent::insert(WriteOp::new("", "nodes"), id, e)
    }

    #[test]
    fn append_assigns_monotone_order() {
        let log = CdcLog::new();
        let a = log.append(event());
        let b = log.append(event());
        let c = log.append(event());

        assert!(a.order_key() < b.order_key());
        assert!(b.order_key() < c.order_key());
    }

    #[test]
    fn since_filters_by_timestamp() {
        let log = CdcLog::new();
        let first = log.append(event());
        let second = log.append(event());

        let all = log.since(0);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, first.id);
        assert_eq!(all[1].id, second.id);

        let none = log.since(second.ts + 1);
        assert!(none.is_empty());
    }

    #[test]
    fn since_is_ordered() {
        let log = CdcLog::new();
        for _ in 0..50 {
            log.append(event());
        }
        let events = log.since(0);
        for pair in events.windows(2) {
            assert!(pair[0].order_key() < pair[1].order_key());
        }
    }

    #[tokio::test]
    async fn live_subscriber_receives_appends() {
        let log = CdcLog::new();
        let mut rx = log.subscribe();

        let appended = log.append(event());
        let received = rx.recv().await.unwrap();
        assert_eq!(received.id, appended.id);
        assert_eq!(received.op, ChangeKind::Insert);
    }

    #[tokio::test]
    async fn subscriber_only_sees_later_events() {
        let log = CdcLog::new();
        log.append(event());

        let mut rx = log.subscribe();
        let second = log.append(event());

        let received = rx.recv().await.unwrap();
        assert_eq!(received.id, second.id);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn slow_subscriber_lags_without_blocking_writers() {
        let log = CdcLog::with_buffer(4);
        let mut rx = log.subscribe();

        for _ in 0..10 {
            log.append(event());
        }

        // The subscriber overflowed its buffer and observes the lag.
        let err = rx.recv().await;
        assert!(matches!(
            err,
            Err(broadcast::error::RecvError::Lagged(_))
        ));

        // The log itself kept every event.
        assert_eq!(log.len(), 10);
    }

    #[test]
    fn subscriber_count_tracks_drops() {
        let log = CdcLog::new();
        assert_eq!(log.subscriber_count(), 0);
        let rx = log.subscribe();
        assert_eq!(log.subscriber_count(), 1);
        drop(rx);
        assert_eq!(log.subscriber_count(), 0);
    }
}
