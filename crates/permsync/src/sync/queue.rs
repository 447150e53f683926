//! Priority queue of in-flight sync requests.
//!
//! A manual binary heap (array plus a `(kind, id) → slot` index) so entries
//! can be merged, released, and removed by key in O(log n). At most one
//! entry exists per `(kind, id)`; an acquired entry stays in the heap but is
//! invisible to further acquisitions until released or removed.
//!
//! Every enqueue pokes a capacity-one notification (`tokio::sync::Notify`
//! stores at most one permit), so bursts of enqueues collapse into a single
//! consumer wake-up.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::RwLock;

use tokio::sync::Notify;

use super::request::{RequestKind, RequestMeta};

#[derive(Debug, Clone)]
struct QueuedRequest {
    meta: RequestMeta,
    acquired: bool,
    /// Insertion sequence; breaks ordering ties FIFO.
    seq: u64,
}

#[derive(Debug, Default)]
struct QueueInner {
    heap: Vec<QueuedRequest>,
    index: HashMap<(RequestKind, u32), usize>,
    next_seq: u64,
}

impl QueueInner {
    fn less(&self, a: usize, b: usize) -> bool {
        match self.heap[a].meta.queue_order(&self.heap[b].meta) {
            Ordering::Less => true,
            Ordering::Greater => false,
            Ordering::Equal => self.heap[a].seq < self.heap[b].seq,
        }
    }

    fn swap_entries(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.index.insert(key_of(&self.heap[a].meta), a);
        self.index.insert(key_of(&self.heap[b].meta), b);
    }

    fn sift_up(&mut self, mut pos: usize) -> usize {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if !self.less(pos, parent) {
                break;
            }
            self.swap_entries(pos, parent);
            pos = parent;
        }
        pos
    }

    fn sift_down(&mut self, mut pos: usize) {
        loop {
            let left = 2 * pos + 1;
            if left >= self.heap.len() {
                break;
            }
            let right = left + 1;
            let mut child = left;
            if right < self.heap.len() && self.less(right, left) {
                child = right;
            }
            if !self.less(child, pos) {
                break;
            }
            self.swap_entries(pos, child);
            pos = child;
        }
    }

    /// Restore the heap property for an entry whose key changed in place.
    fn fix(&mut self, pos: usize) {
        if self.sift_up(pos) == pos {
            self.sift_down(pos);
        }
    }

    fn push(&mut self, meta: RequestMeta) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let pos = self.heap.len();
        self.index.insert(key_of(&meta), pos);
        self.heap.push(QueuedRequest {
            meta,
            acquired: false,
            seq,
        });
        self.sift_up(pos);
    }

    fn remove_at(&mut self, pos: usize) {
        let last = self.heap.len() - 1;
        if pos != last {
            self.swap_entries(pos, last);
        }
        let removed = self.heap.pop();
        if let Some(removed) = removed {
            self.index.remove(&key_of(&removed.meta));
        }
        if pos < self.heap.len() {
            self.fix(pos);
        }
    }
}

fn key_of(meta: &RequestMeta) -> (RequestKind, u32) {
    (meta.kind, meta.id)
}

/// Thread-safe priority queue of sync requests with keyed de-duplication.
#[derive(Debug, Default)]
pub struct RequestQueue {
    inner: RwLock<QueueInner>,
    notify_enqueue: Notify,
}

impl RequestQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a request or merge it into the existing entry for the same
    /// `(kind, id)`.
    ///
    /// Merging keeps the higher priority and the earlier `next_sync_at`
    /// (`None` counts as the earliest). An entry that is currently acquired
    /// is left untouched: the in-flight run will finish and remove it, and
    /// the caller may enqueue again afterwards.
    ///
    /// Returns `true` when an existing queued entry was updated in place.
    pub fn enqueue(&self, meta: RequestMeta) -> bool {
        let updated = {
            let mut inner = self.write_lock();
            match inner.index.get(&key_of(&meta)).copied() {
                Some(pos) if inner.heap[pos].acquired => false,
                Some(pos) => {
                    let entry = &mut inner.heap[pos];
                    entry.meta.priority = entry.meta.priority.max(meta.priority);
                    entry.meta.next_sync_at = match (entry.meta.next_sync_at, meta.next_sync_at) {
                        (Some(a), Some(b)) => Some(a.min(b)),
                        _ => None,
                    };
                    inner.fix(pos);
                    true
                }
                None => {
                    inner.push(meta);
                    false
                }
            }
        };

        self.notify_enqueue.notify_one();
        updated
    }

    /// Acquire the best eligible request: the non-acquired entry that
    /// schedules first. Returns `None` when every entry is acquired or the
    /// queue is empty.
    pub fn acquire_next(&self) -> Option<RequestMeta> {
        let mut inner = self.write_lock();
        let mut best: Option<usize> = None;
        for pos in 0..inner.heap.len() {
            if inner.heap[pos].acquired {
                continue;
            }
            best = match best {
                Some(current) if !inner.less(pos, current) => Some(current),
                _ => Some(pos),
            };
        }
        let pos = best?;
        inner.heap[pos].acquired = true;
        Some(inner.heap[pos].meta.clone())
    }

    /// Clear the acquired flag so the entry becomes eligible again.
    pub fn release(&self, kind: RequestKind, id: u32) {
        let mut inner = self.write_lock();
        if let Some(pos) = inner.index.get(&(kind, id)).copied() {
            inner.heap[pos].acquired = false;
        }
    }

    /// Delete the entry for `(kind, id)`.
    ///
    /// With `only_if_acquired` set, an entry that is not currently acquired
    /// is left alone; this is how a finished sync removes its own entry
    /// without racing a concurrent re-enqueue. Returns whether an entry was
    /// removed.
    pub fn remove(&self, kind: RequestKind, id: u32, only_if_acquired: bool) -> bool {
        let mut inner = self.write_lock();
        let Some(pos) = inner.index.get(&(kind, id)).copied() else {
            return false;
        };
        if only_if_acquired && !inner.heap[pos].acquired {
            return false;
        }
        inner.remove_at(pos);
        true
    }

    /// Number of entries, acquired ones included.
    pub fn len(&self) -> usize {
        self.read_lock().heap.len()
    }

    /// Whether the queue holds no entries.
    pub fn is_empty(&self) -> bool {
        self.read_lock().heap.is_empty()
    }

    /// Copy of all entries in scheduling order, with their acquired flags.
    pub fn snapshot(&self) -> Vec<(RequestMeta, bool)> {
        let inner = self.read_lock();
        let mut entries: Vec<&QueuedRequest> = inner.heap.iter().collect();
        entries.sort_by(|a, b| {
            a.meta
                .queue_order(&b.meta)
                .then_with(|| a.seq.cmp(&b.seq))
        });
        entries
            .into_iter()
            .map(|entry| (entry.meta.clone(), entry.acquired))
            .collect()
    }

    /// Wait until the next enqueue poke.
    pub async fn notified(&self) {
        self.notify_enqueue.notified().await;
    }

    /// Poke the enqueue notification without adding an entry. Used by the
    /// consumer's one-shot wait timers.
    pub fn notify_enqueue(&self) {
        self.notify_enqueue.notify_one();
    }

    fn read_lock(&self) -> std::sync::RwLockReadGuard<'_, QueueInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_lock(&self) -> std::sync::RwLockWriteGuard<'_, QueueInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}
