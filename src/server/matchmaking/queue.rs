/// FIFO matchmaking queue with O(1) removal from any position.
///
/// Nodes live in an arena addressed by slot index and are doubly linked through those
/// indices; an id → slot map gives constant-time lookup. A key is in the index iff its
/// node is linked into the list.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;

use crate::server::connection::ConnectionSession;

/// Anything that can wait in the queue, identified by a stable key.
pub trait Queued {
    fn queue_key(&self) -> String;
}

impl Queued for Arc<ConnectionSession> {
    fn queue_key(&self) -> String {
        self.id()
    }
}

struct Node<T> {
    item: T,
    key: String,
    prev: Option<usize>,
    next: Option<usize>,
}

pub struct MatchmakingQueue<T> {
    slots: Vec<Option<Node<T>>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    index: HashMap<String, usize>,
}

impl<T> Default for MatchmakingQueue<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            index: HashMap::new(),
        }
    }
}

impl<T: Queued> MatchmakingQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn is_queued(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Append to the tail. Returns false (and does nothing) if the key is already queued.
    pub fn enqueue(&mut self, item: T) -> bool {
        let key = item.queue_key();
        if self.index.contains_key(&key) {
            debug!("[Matchmaking] {} already queued", key);
            return false;
        }
        let node = Node { item, key: key.clone(), prev: self.tail, next: None };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(node);
                slot
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };
        match self.tail.and_then(|tail| self.node_mut(tail)) {
            Some(tail) => tail.next = Some(slot),
            None => self.head = Some(slot),
        }
        self.tail = Some(slot);
        self.index.insert(key, slot);
        true
    }

    /// Pop the longest-waiting entry.
    pub fn dequeue(&mut self) -> Option<T> {
        let head = self.head?;
        self.unlink(head)
    }

    /// Splice an entry out wherever it sits. No-op if absent.
    pub fn remove_by_id(&mut self, key: &str) -> Option<T> {
        let slot = *self.index.get(key)?;
        self.unlink(slot)
    }

    /// Pop the two longest-waiting entries, or nothing if fewer than two are waiting.
    ///
    /// Check and both pops happen under the same `&mut` borrow, so a caller holding the
    /// queue's lock gets them as one critical section.
    pub fn try_pair_next(&mut self) -> Option<(T, T)> {
        self.head.and_then(|head| self.node(head))?.next?;
        let first = self.dequeue()?;
        let second = self.dequeue()?;
        Some((first, second))
    }

    /// Walk the queue from head to tail.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            let node = self.node(cursor?)?;
            cursor = node.next;
            Some(&node.item)
        })
    }

    fn unlink(&mut self, slot: usize) -> Option<T> {
        let node = self.slots.get_mut(slot)?.take()?;
        match node.prev.and_then(|prev| self.node_mut(prev)) {
            Some(prev) => prev.next = node.next,
            None => self.head = node.next,
        }
        match node.next.and_then(|next| self.node_mut(next)) {
            Some(next) => next.prev = node.prev,
            None => self.tail = node.prev,
        }
        self.index.remove(&node.key);
        self.free.push(slot);
        Some(node.item)
    }

    fn node(&self, slot: usize) -> Option<&Node<T>> {
        self.slots.get(slot)?.as_ref()
    }

    fn node_mut(&mut self, slot: usize) -> Option<&mut Node<T>> {
        self.slots.get_mut(slot)?.as_mut()
    }

    #[cfg(test)]
    fn assert_consistent(&self) {
        let keys: Vec<String> = self.iter().map(|item| item.queue_key()).collect();
        assert_eq!(keys.len(), self.index.len(), "list and index disagree on length");
        for key in &keys {
            let slot = self.index.get(key).copied().expect("listed key is indexed");
            assert_eq!(self.node(slot).expect("indexed slot is live").key, *key);
        }
        let mut backwards = Vec::new();
        let mut cursor = self.tail;
        while let Some(node) = cursor.and_then(|slot| self.node(slot)) {
            backwards.push(node.key.clone());
            cursor = node.prev;
        }
        backwards.reverse();
        assert_eq!(backwards, keys, "prev links disagree with next links");
    }
}
