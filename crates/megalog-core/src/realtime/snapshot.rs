//! Latest-value cell
//!
//! The consumer publishes every decoded record here; any number of readers
//! (the debug endpoint, a status line) look at the most recent one without
//! touching the session.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

use super::Record;
use crate::protocol::RawPayload;

/// One published record
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    /// 1 for the first record published, incremented per record
    pub sequence: u64,
    /// When the consumer published it
    pub received_at: DateTime<Utc>,
    /// Payload exactly as received
    #[serde(skip)]
    pub raw: RawPayload,
    /// Channels decoded from `raw`
    pub record: Record,
}

type Slot = Option<Arc<Snapshot>>;

/// Writer side of the latest-value cell
///
/// Deliberately not `Clone`: there is exactly one writer.
#[derive(Debug)]
pub struct LatestSnapshot {
    tx: watch::Sender<Slot>,
}

impl LatestSnapshot {
    /// Empty cell
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Replace the current snapshot, returning its sequence number
    pub fn publish(&self, raw: RawPayload, record: Record) -> u64 {
        let sequence = self.tx.borrow().as_ref().map_or(1, |s| s.sequence + 1);
        self.tx.send_replace(Some(Arc::new(Snapshot {
            sequence,
            received_at: Utc::now(),
            raw,
            record,
        })));
        sequence
    }

    /// Most recent snapshot, if any has been published
    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.tx.borrow().clone()
    }

    /// A new reader handle
    pub fn reader(&self) -> SnapshotReader {
        SnapshotReader {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for LatestSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

/// Reader side of the latest-value cell
#[derive(Debug, Clone)]
pub struct SnapshotReader {
    rx: watch::Receiver<Slot>,
}

impl SnapshotReader {
    /// Most recent snapshot, if any has been published
    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.rx.borrow().clone()
    }

    /// Wait for a snapshot newer than the last one seen by this reader
    ///
    /// Returns `None` once the writer is gone.
    pub async fn changed(&mut self) -> Option<Arc<Snapshot>> {
        self.rx.changed().await.ok()?;
        self.rx.borrow_and_update().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_empty_until_published() {
        let cell = LatestSnapshot::new();
        let reader = cell.reader();
        assert!(cell.latest().is_none());
        assert!(reader.latest().is_none());
    }

    #[test]
    fn test_sequence_and_latest() {
        let cell = LatestSnapshot::new();
        let reader = cell.reader();

        assert_eq!(cell.publish(Bytes::from_static(&[1]), Record::default()), 1);
        assert_eq!(cell.publish(Bytes::from_static(&[2]), Record::default()), 2);

        let latest = reader.latest().unwrap();
        assert_eq!(latest.sequence, 2);
        assert_eq!(&latest.raw[..], &[2]);
    }

    #[tokio::test]
    async fn test_reader_waits_for_change() {
        let cell = LatestSnapshot::new();
        let mut reader = cell.reader();

        let waiter = tokio::spawn(async move { reader.changed().await });
        tokio::task::yield_now().await;
        cell.publish(Bytes::from_static(&[7]), Record::default());

        let snapshot = waiter.await.unwrap().expect("snapshot after publish");
        assert_eq!(snapshot.sequence, 1);
    }

    #[tokio::test]
    async fn test_reader_ends_when_writer_dropped() {
        let cell = LatestSnapshot::new();
        let mut reader = cell.reader();
        drop(cell);
        assert!(reader.changed().await.is_none());
    }
}
