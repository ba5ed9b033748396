//! Time-ordered queue of pending synaptic events

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// An input increment waiting for its delivery step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingEvent {
    /// Global index of the destination unit
    pub post: usize,
    /// First step at which the event applies
    pub deliver_at: i64,
    /// Weight captured when the event was enqueued
    pub magnitude: f64,
}

#[derive(Debug, Clone)]
struct Entry {
    seq: u64,
    event: PendingEvent,
}

impl Entry {
    fn key(&self) -> (i64, u64) {
        (self.event.deliver_at, self.seq)
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Min-heap on (delivery step, insertion sequence)
#[derive(Debug, Clone, Default)]
pub struct DelayQueue {
    heap: BinaryHeap<Reverse<Entry>>,
    next_seq: u64,
}

impl DelayQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue an event
    pub fn push(&mut self, post: usize, deliver_at: i64, magnitude: f64) {
        let entry = Entry {
            seq: self.next_seq,
            event: PendingEvent {
                post,
                deliver_at,
                magnitude,
            },
        };
        self.next_seq += 1;
        self.heap.push(Reverse(entry));
    }

    /// Delivery step of the earliest event
    pub fn next_due(&self) -> Option<i64> {
        self.heap.peek().map(|Reverse(entry)| entry.event.deliver_at)
    }

    /// Remove and return the earliest event if it is due at `now`.
    /// An empty queue yields `None`.
    pub fn pop_due(&mut self, now: i64) -> Option<PendingEvent> {
        match self.next_due() {
            Some(at) if at <= now => self.heap.pop().map(|Reverse(entry)| entry.event),
            _ => None,
        }
    }

    /// Apply every event due at `now` to `input`, earliest first.
    /// Returns the number of events delivered.
    pub fn deliver_due(&mut self, now: i64, input: &mut [f64]) -> usize {
        let mut delivered = 0;
        while let Some(event) = self.pop_due(now) {
            if let Some(slot) = input.get_mut(event.post) {
                *slot += event.magnitude;
            }
            delivered += 1;
        }
        delivered
    }

    /// Number of pending events
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Drop every pending event
    pub fn clear(&mut self) {
        self.heap.clear();
        self.next_seq = 0;
    }

    /// Pending events in delivery order
    pub fn snapshot(&self) -> Vec<PendingEvent> {
        let mut entries: Vec<&Entry> = self.heap.iter().map(|Reverse(entry)| entry).collect();
        entries.sort();
        entries.into_iter().map(|entry| entry.event).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_queue_is_noop() {
        let mut queue = DelayQueue::new();
        assert_eq!(queue.pop_due(100), None);
        let mut input = vec![0.0; 2];
        assert_eq!(queue.deliver_due(100, &mut input), 0);
        assert_eq!(input, vec![0.0, 0.0]);
    }

    #[test]
    fn test_only_due_events_drain() {
        let mut queue = DelayQueue::new();
        queue.push(0, 5, 1.0);
        queue.push(1, 3, 2.0);
        queue.push(0, 8, 4.0);

        let mut input = vec![0.0; 2];
        assert_eq!(queue.deliver_due(2, &mut input), 0);
        assert_eq!(queue.deliver_due(5, &mut input), 2);
        assert_eq!(input, vec![1.0, 2.0]);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.next_due(), Some(8));
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let mut queue = DelayQueue::new();
        queue.push(2, 4, 0.5);
        queue.push(0, 4, 0.25);
        queue.push(1, 1, 1.0);
        queue.push(3, 4, 0.125);

        let order: Vec<usize> = std::iter::from_fn(|| queue.pop_due(10))
            .map(|e| e.post)
            .collect();
        assert_eq!(order, vec![1, 2, 0, 3]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_snapshot_in_delivery_order() {
        let mut queue = DelayQueue::new();
        queue.push(0, 9, 1.0);
        queue.push(1, 2, 1.0);
        queue.push(2, 2, 1.0);
        let times: Vec<(i64, usize)> = queue
            .snapshot()
            .iter()
            .map(|e| (e.deliver_at, e.post))
            .collect();
        assert_eq!(times, vec![(2, 1), (2, 2), (9, 0)]);
        queue.clear();
        assert!(queue.is_empty());
    }

    #[test]
    fn test_out_of_range_destination_is_dropped() {
        let mut queue = DelayQueue::new();
        queue.push(7, 0, 1.0);
        let mut input = vec![0.0; 2];
        assert_eq!(queue.deliver_due(0, &mut input), 1);
        assert_eq!(input, vec![0.0, 0.0]);
    }
}
