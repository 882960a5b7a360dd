use std::collections::VecDeque;

use tracing::warn;

use super::types::{EpochMillis, Timestamped};

/// Append-and-trim time series.
///
/// A small wrapper around `VecDeque`:
/// - `ingest` appends a batch, then trims expired records from the front.
/// - Memory is bounded twice: by the retention span passed to `ingest` and by
///   a hard `max_records` cap (oldest evicted first).
///
/// Trimming is a forward scan that stops at the first record that has not expired,
/// so records must arrive append-ordered. Minor jitter right at the cutoff is
/// tolerated; a batch that goes backwards in time is not re-sorted and will mis-trim.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamBuffer<T> {
    records: VecDeque<T>,
    max_records: usize,
}

impl<T> Default for StreamBuffer<T> {
    fn default() -> Self {
        Self {
            records: VecDeque::new(),
            max_records: usize::MAX,
        }
    }
}

impl<T: Timestamped> StreamBuffer<T> {
    pub fn new(max_records: usize) -> Self {
        Self {
            records: VecDeque::new(),
            max_records,
        }
    }

    /// Append `new_records` and drop everything older than `now - retention_ms`,
    /// where `now` is the timestamp of the last element of `new_records`.
    ///
    /// An empty batch is a no-op and leaves the buffer untouched.
    pub fn ingest<I>(&mut self, new_records: I, retention_ms: i64) -> &VecDeque<T>
    where
        I: IntoIterator<Item = T>,
    {
        let batch: Vec<T> = new_records.into_iter().collect();
        let Some(latest) = batch.last().map(Timestamped::timestamp_ms) else {
            return &self.records;
        };

        debug_assert!(
            batch
                .windows(2)
                .all(|pair| pair[0].timestamp_ms() <= pair[1].timestamp_ms()),
            "stream buffer batch must be non-decreasing in time"
        );
        if let (Some(tail), Some(first)) = (self.records.back(), batch.first()) {
            if first.timestamp_ms() < tail.timestamp_ms() {
                warn!(
                    tail_ms = tail.timestamp_ms(),
                    batch_start_ms = first.timestamp_ms(),
                    "stream buffer batch starts before buffer tail; trim assumes append order"
                );
            }
        }

        self.records.extend(batch);
        self.trim_before(latest - retention_ms.max(0));
        self.enforce_cap();
        &self.records
    }

    /// Drop records from the front while they are older than `cutoff_ms`.
    ///
    /// Returns the number of records dropped.
    pub fn trim_before(&mut self, cutoff_ms: EpochMillis) -> usize {
        let keep_from = self
            .records
            .iter()
            .position(|record| record.timestamp_ms() >= cutoff_ms)
            .unwrap_or(self.records.len());
        self.records.drain(..keep_from);
        keep_from
    }

    /// Replace the whole contents (full reloads, imports).
    pub fn replace<I>(&mut self, records: I)
    where
        I: IntoIterator<Item = T>,
    {
        self.records.clear();
        self.records.extend(records);
        self.enforce_cap();
    }

    pub fn oldest_ms(&self) -> Option<EpochMillis> {
        self.records.front().map(Timestamped::timestamp_ms)
    }

    pub fn newest_ms(&self) -> Option<EpochMillis> {
        self.records.back().map(Timestamped::timestamp_ms)
    }

    fn enforce_cap(&mut self) {
        // A cap of 0 means "store nothing".
        if self.records.len() > self.max_records {
            let excess = self.records.len() - self.max_records;
            self.records.drain(..excess);
        }
    }
}

impl<T> StreamBuffer<T> {
    pub fn records(&self) -> &VecDeque<T> {
        &self.records
    }

    pub fn latest(&self) -> Option<&T> {
        self.records.back()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn max_records(&self) -> usize {
        self.max_records
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.records.iter().cloned().collect()
    }
}

impl<'a, T> IntoIterator for &'a StreamBuffer<T> {
    type Item = &'a T;
    type IntoIter = std::collections::vec_deque::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Rec(i64);

    impl Timestamped for Rec {
        fn timestamp_ms(&self) -> EpochMillis {
            self.0
        }
    }

    fn stamps(buf: &StreamBuffer<Rec>) -> Vec<i64> {
        buf.iter().map(|r| r.0).collect()
    }

    #[test]
    fn trims_everything_older_than_retention() {
        let mut buf = StreamBuffer::new(1_000);
        buf.ingest((0..10).map(|i| Rec(i * 1_000)), 60_000);
        buf.ingest([Rec(12_000), Rec(14_000)], 5_000);

        assert_eq!(stamps(&buf), vec![9_000, 12_000, 14_000]);
        let cutoff = 14_000 - 5_000;
        assert!(buf.iter().all(|r| r.0 >= cutoff));
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let mut buf = StreamBuffer::new(16);
        buf.ingest([Rec(1), Rec(2), Rec(3)], 10);
        let before = buf.clone();

        buf.ingest(Vec::<Rec>::new(), 0);
        assert_eq!(buf, before);
    }

    #[test]
    fn zero_retention_keeps_only_latest_instant() {
        let mut buf = StreamBuffer::new(16);
        buf.ingest([Rec(1), Rec(5), Rec(5)], 0);
        assert_eq!(stamps(&buf), vec![5, 5]);
    }

    #[test]
    fn scan_stops_at_first_unexpired_record() {
        let mut buf = StreamBuffer::new(16);
        buf.replace([Rec(1), Rec(50), Rec(2), Rec(60)]);
        buf.ingest([Rec(100)], 55);
        // 50 survives the cutoff of 45, so the jittered 2 behind it is kept too.
        assert_eq!(stamps(&buf), vec![50, 2, 60, 100]);
    }

    #[test]
    fn hard_cap_evicts_oldest() {
        let mut buf = StreamBuffer::new(3);
        buf.ingest((1..=5).map(Rec), 1_000);
        assert_eq!(stamps(&buf), vec![3, 4, 5]);

        let mut none = StreamBuffer::new(0);
        none.ingest([Rec(1)], 10);
        assert!(none.is_empty());
    }

    #[test]
    fn latest_and_bounds() {
        let mut buf = StreamBuffer::new(8);
        assert!(buf.latest().is_none());
        buf.ingest([Rec(3), Rec(7)], 100);
        assert_eq!(buf.latest(), Some(&Rec(7)));
        assert_eq!(buf.oldest_ms(), Some(3));
        assert_eq!(buf.newest_ms(), Some(7));
        assert_eq!(buf.iter().next(), Some(&Rec(3)));
    }
}
