//! Tail window for prompt matching.
//!
//! Only the last N bytes of a command's output are searched for the prompt,
//! so matching cost per chunk stays flat no matter how much a bulk command
//! prints. The full output lives elsewhere; this window is a bounded copy.

use bytes::{Buf, BytesMut};

/// Bounded trailing slice of received bytes.
#[derive(Debug)]
pub struct TailWindow {
    window: BytesMut,
    capacity: usize,
}

impl TailWindow {
    /// Create a window keeping at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: BytesMut::with_capacity(capacity * 2),
            capacity,
        }
    }

    /// Append a chunk, dropping the oldest bytes beyond capacity.
    pub fn push(&mut self, data: &[u8]) {
        if data.len() >= self.capacity {
            self.window.clear();
            self.window.extend_from_slice(&data[data.len() - self.capacity..]);
            return;
        }
        self.window.extend_from_slice(data);
        if self.window.len() > self.capacity {
            let excess = self.window.len() - self.capacity;
            // O(1) pointer bump; the storage is reclaimed on the next reserve.
            self.window.advance(excess);
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.window
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.window.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_pushes_accumulate() {
        let mut tail = TailWindow::new(100);
        tail.push(b"Hello, ");
        tail.push(b"world!");
        assert_eq!(tail.as_slice(), b"Hello, world!");
    }

    #[test]
    fn test_window_keeps_only_the_tail() {
        let mut tail = TailWindow::new(10);
        tail.push(b"router#");
        tail.push(&[b'x'; 100]);
        tail.push(b"\nrouter#");
        assert_eq!(tail.len(), 10);
        assert_eq!(tail.as_slice(), b"xx\nrouter#");
    }

    #[test]
    fn test_oversized_chunk_is_cut() {
        let mut tail = TailWindow::new(4);
        tail.push(b"ab");
        tail.push(b"0123456789");
        assert_eq!(tail.as_slice(), b"6789");
    }

    #[test]
    fn test_clear() {
        let mut tail = TailWindow::new(8);
        tail.push(b"data");
        tail.clear();
        assert!(tail.is_empty());
        assert_eq!(tail.capacity(), 8);
    }
}
