//! Lock-swap insert buffer.
//!
//! Producers push decoded events while a flusher periodically snapshots the
//! accumulated batch. `take_snapshot` swaps the backing vector out under the
//! lock, so producers never observe a half-drained buffer and the flusher
//! walks its snapshot without holding the lock.

use std::mem;
use std::sync::Mutex;

pub struct InsertBuffer<T> {
    items: Mutex<Vec<T>>,
}

impl<T> InsertBuffer<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
        }
    }

    /// Appends one item. Cheap; contends only with a concurrent snapshot.
    pub fn push(&self, item: T) {
        match self.items.lock() {
            Ok(mut guard) => guard.push(item),
            Err(poisoned) => poisoned.into_inner().push(item),
        }
    }

    /// Number of buffered items right now.
    pub fn len(&self) -> usize {
        match self.items.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Swaps the buffer for an empty one and returns everything accumulated
    /// so far, in insertion order.
    pub fn take_snapshot(&self) -> Vec<T> {
        match self.items.lock() {
            Ok(mut guard) => mem::take(&mut *guard),
            Err(poisoned) => mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl<T> Default for InsertBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn snapshot_drains_and_preserves_order() {
        let buffer = InsertBuffer::new();
        for i in 0..10 {
            buffer.push(i);
        }
        let snapshot = buffer.take_snapshot();
        assert_eq!(snapshot, (0..10).collect::<Vec<_>>());
        assert!(buffer.is_empty());
    }

    #[test]
    fn pushes_after_snapshot_land_in_fresh_buffer() {
        let buffer = InsertBuffer::new();
        buffer.push(1);
        let first = buffer.take_snapshot();
        buffer.push(2);
        assert_eq!(first, vec![1]);
        assert_eq!(buffer.take_snapshot(), vec![2]);
    }

    #[test]
    fn concurrent_pushes_are_never_lost() {
        let buffer = Arc::new(InsertBuffer::new());
        let mut handles = Vec::new();
        for t in 0..4 {
            let buffer = Arc::clone(&buffer);
            handles.push(thread::spawn(move || {
                for i in 0..1000 {
                    buffer.push(t * 1000 + i);
                }
            }));
        }
        let drainer = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                let mut seen = Vec::new();
                for _ in 0..50 {
                    seen.extend(buffer.take_snapshot());
                    thread::yield_now();
                }
                seen
            })
        };
        for handle in handles {
            handle.join().unwrap();
        }
        let mut seen = drainer.join().unwrap();
        seen.extend(buffer.take_snapshot());
        seen.sort_unstable();
        assert_eq!(seen, (0..4000).collect::<Vec<_>>());
    }
}
