use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// Pending announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeakRequest {
    pub text: String,
    pub priority: i32,
    seq: u64,
}

impl Ord for SpeakRequest {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.priority, Reverse(self.seq)).cmp(&(other.priority, Reverse(other.seq)))
    }
}

impl PartialOrd for SpeakRequest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Bounded priority queue: highest priority first, FIFO within a priority.
#[derive(Debug)]
pub struct SpeakQueue {
    heap: BinaryHeap<SpeakRequest>,
    capacity: usize,
    next_seq: u64,
}

impl SpeakQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::new(),
            capacity: capacity.max(1),
            next_seq: 0,
        }
    }

    /// Returns false (and drops the text) when the queue is full.
    pub fn push(&mut self, text: String, priority: i32) -> bool {
        if self.heap.len() >= self.capacity {
            return false;
        }
        self.heap.push(SpeakRequest {
            text,
            priority,
            seq: self.next_seq,
        });
        self.next_seq += 1;
        true
    }

    pub fn pop(&mut self) -> Option<SpeakRequest> {
        self.heap.pop()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
