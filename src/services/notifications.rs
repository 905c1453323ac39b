use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::models::{BusEvent, NotificationRecord};

pub const FEED_CAPACITY: usize = 100;
pub const DEFAULT_POLL_LIMIT: usize = 20;

type Sinks = Arc<Mutex<HashMap<u64, mpsc::UnboundedSender<BusEvent>>>>;

#[derive(Clone, Default)]
pub struct NotificationBus {
    sinks: Sinks,
    next_id: Arc<AtomicU64>,
}

/// A registered viewer. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<BusEvent>,
    sinks: Sinks,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn recv(&mut self) -> Option<BusEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<BusEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Ok(mut sinks) = self.sinks.lock() {
            sinks.remove(&self.id);
        }
    }
}

impl tokio_stream::Stream for Subscription {
    type Item = BusEvent;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<BusEvent>> {
        self.rx.poll_recv(cx)
    }
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut sinks) = self.sinks.lock() {
            sinks.insert(id, tx);
        }
        tracing::debug!(subscriber = id, "notification subscriber added");
        Subscription {
            id,
            rx,
            sinks: Arc::clone(&self.sinks),
        }
    }

    pub fn unsubscribe(&self, id: u64) {
        if let Ok(mut sinks) = self.sinks.lock() {
            if sinks.remove(&id).is_some() {
                tracing::debug!(subscriber = id, "notification subscriber removed");
            }
        }
    }

    /// Closed sinks are dropped.
    pub fn publish(&self, event: &BusEvent) -> usize {
        let Ok(mut sinks) = self.sinks.lock() else {
            return 0;
        };
        sinks.retain(|id, tx| {
            let delivered = tx.send(event.clone()).is_ok();
            if !delivered {
                tracing::debug!(subscriber = *id, "dropping closed notification subscriber");
            }
            delivered
        });
        sinks.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sinks.lock().map(|s| s.len()).unwrap_or(0)
    }
}

/// Ring buffer behind the polling fallback.
#[derive(Default)]
pub struct NotificationFeed {
    records: Mutex<VecDeque<NotificationRecord>>,
}

impl NotificationFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: &BusEvent, at: DateTime<Utc>) {
        let booking_id = event.booking().map(|b| b.id.clone());
        let message = match event.booking() {
            Some(b) if matches!(event, BusEvent::NewBooking { .. }) => {
                format!("Programare nouă: {} - {} {}", b.client_name, b.date.format("%Y-%m-%d"), b.time)
            }
            Some(b) => format!("Programare actualizată: {} ({})", b.client_name, b.status.as_str()),
            None => event.kind().to_string(),
        };

        let Ok(mut records) = self.records.lock() else {
            return;
        };
        // Strictly increasing, so a poll cursor never skips a record
        let timestamp = match records.back() {
            Some(last) => at.timestamp_millis().max(last.timestamp + 1),
            None => at.timestamp_millis(),
        };
        if records.len() == FEED_CAPACITY {
            records.pop_front();
        }
        records.push_back(NotificationRecord {
            id: uuid::Uuid::new_v4().to_string(),
            kind: event.kind().to_string(),
            booking_id,
            message,
            timestamp,
        });
    }

    /// Records strictly newer than `since` (Unix ms), oldest first, at most `limit`.
    pub fn since(&self, since: i64, limit: usize) -> Vec<NotificationRecord> {
        let Ok(records) = self.records.lock() else {
            return vec![];
        };
        records
            .iter()
            .filter(|r| r.timestamp > since)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keepalive(n: i64) -> BusEvent {
        BusEvent::Keepalive {
            timestamp: DateTime::from_timestamp(n, 0).unwrap(),
        }
    }

    fn drain(sub: &mut Subscription) -> Vec<BusEvent> {
        let mut out = vec![];
        while let Some(event) = sub.try_recv() {
            out.push(event);
        }
        out
    }

    fn stamps(events: &[BusEvent]) -> Vec<i64> {
        events
            .iter()
            .map(|e| match e {
                BusEvent::Keepalive { timestamp } => timestamp.timestamp(),
                _ => -1,
            })
            .collect()
    }

    #[test]
    fn test_every_subscriber_gets_every_event_in_order() {
        let bus = NotificationBus::new();
        let mut subs: Vec<_> = (0..3).map(|_| bus.subscribe()).collect();

        for n in 0..5 {
            assert_eq!(bus.publish(&keepalive(n)), 3);
        }

        for sub in subs.iter_mut() {
            assert_eq!(stamps(&drain(sub)), vec![0, 1, 2, 3, 4]);
        }
    }

    #[test]
    fn test_unsubscribe_mid_stream() {
        let bus = NotificationBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(&keepalive(1));
        bus.unsubscribe(b.id());
        bus.unsubscribe(b.id());
        bus.publish(&keepalive(2));

        assert_eq!(stamps(&drain(&mut a)), vec![1, 2]);
        assert_eq!(stamps(&drain(&mut b)), vec![1]);
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn test_dropped_subscription_is_removed() {
        let bus = NotificationBus::new();
        let mut kept = bus.subscribe();
        let gone = bus.subscribe();
        drop(gone);

        assert_eq!(bus.publish(&keepalive(7)), 1);
        assert_eq!(stamps(&drain(&mut kept)), vec![7]);
    }

    #[test]
    fn test_feed_stamps_are_unique_and_ordered() {
        let feed = NotificationFeed::new();
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        for n in 0..3 {
            feed.record(&keepalive(n), at);
        }
        // A late writer carrying an older clock reading still lands after the others
        feed.record(&keepalive(3), at - chrono::Duration::seconds(5));

        let got: Vec<i64> = feed.since(0, 10).iter().map(|r| r.timestamp).collect();
        let base = at.timestamp_millis();
        assert_eq!(got, vec![base, base + 1, base + 2, base + 3]);

        let first = feed.since(0, 2);
        let rest = feed.since(first.last().unwrap().timestamp, 2);
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[0].timestamp, base + 2);
    }

    #[test]
    fn test_feed_is_bounded_and_filters_strictly() {
        let feed = NotificationFeed::new();
        let base = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        for n in 0..(FEED_CAPACITY as i64 + 5) {
            feed.record(&keepalive(n), base + chrono::Duration::milliseconds(n));
        }
        assert_eq!(feed.len(), FEED_CAPACITY);

        let oldest = base.timestamp_millis() + 5;
        let all = feed.since(0, 1000);
        assert_eq!(all.len(), FEED_CAPACITY);
        assert_eq!(all[0].timestamp, oldest);

        let after = feed.since(oldest, 3);
        assert_eq!(after.len(), 3);
        assert_eq!(after[0].timestamp, oldest + 1);
    }
}
