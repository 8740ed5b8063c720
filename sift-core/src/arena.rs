//! Span Arena for Per-Partition Plans
//!
//! Stores many short lists (child node IDs, resolved dictionary entries) in a
//! single contiguous buffer. Lists are referenced by `(offset, length)` spans
//! instead of owning their own `Vec`, so binding a query to a partition does
//! one growing allocation per arena rather than one per node.
//!
//! ## Memory Layout
//!
//! ```text
//! Arena Buffer: [list0][list1][list2]...[free space]
//!               ^      ^      ^
//!               |      |      |
//! Spans:       (0,3)  (3,1)  (4,5) ...
//! ```
//!
//! Items are only ever appended, so spans stay valid for the arena's life.

/// Reference to a list stored in a [`SpanArena`] - 8 bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Span {
    offset: u32,
    len: u32,
}

impl Span {
    /// The empty span.
    pub const EMPTY: Span = Span { offset: 0, len: 0 };

    /// Creates a new span.
    #[inline(always)]
    pub const fn new(offset: u32, len: u32) -> Self {
        Self { offset, len }
    }

    /// Returns the offset in the arena.
    #[inline(always)]
    pub const fn offset(self) -> usize {
        self.offset as usize
    }

    /// Returns the number of items.
    #[inline(always)]
    pub const fn len(self) -> usize {
        self.len as usize
    }

    /// Returns true if the span covers no items.
    #[inline(always)]
    pub const fn is_empty(self) -> bool {
        self.len == 0
    }
}

/// Append-only storage for span-addressed lists.
#[derive(Debug, Clone)]
pub struct SpanArena<T> {
    buffer: Vec<T>,
}

impl<T> Default for SpanArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SpanArena<T> {
    /// Creates a new empty arena.
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Returns the total number of items stored.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if nothing is stored.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Appends a list, moving its items in, and returns its span.
    pub fn push_iter<I>(&mut self, items: I) -> Span
    where
        I: IntoIterator<Item = T>,
    {
        let offset = self.buffer.len();
        self.buffer.extend(items);
        Span::new(offset as u32, (self.buffer.len() - offset) as u32)
    }

    /// Gets the list behind a span.
    #[inline(always)]
    pub fn get(&self, span: Span) -> &[T] {
        &self.buffer[span.offset()..span.offset() + span.len()]
    }
}

impl<T: Copy> SpanArena<T> {
    /// Appends a copy of `items` and returns its span.
    pub fn push_slice(&mut self, items: &[T]) -> Span {
        let offset = self.buffer.len();
        self.buffer.extend_from_slice(items);
        Span::new(offset as u32, items.len() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_push_get() {
        let mut arena = SpanArena::new();

        let a = arena.push_slice(&[1u32, 2, 3]);
        let b = arena.push_iter(10u32..12);
        let c = arena.push_slice(&[]);

        assert_eq!(arena.get(a), &[1, 2, 3]);
        assert_eq!(arena.get(b), &[10, 11]);
        assert!(c.is_empty());
        assert_eq!(arena.get(c), &[] as &[u32]);
        assert_eq!(arena.len(), 5);
    }

    #[test]
    fn spans_are_stable_across_growth() {
        let mut arena = SpanArena::new();
        let first = arena.push_slice(&[7u32, 8]);
        for i in 0..1000u32 {
            arena.push_slice(&[i, i + 1, i + 2]);
        }
        assert_eq!(arena.get(first), &[7, 8]);
        assert_eq!(arena.len(), 3002);
        assert!(!arena.is_empty());
    }

    #[test]
    fn owned_items_move_in() {
        let mut arena = SpanArena::new();
        let names = arena.push_iter(vec![String::from("cat"), String::from("dog")]);
        assert_eq!(arena.get(names), &["cat".to_string(), "dog".to_string()]);
        assert_eq!(arena.get(Span::EMPTY), &[] as &[String]);
    }
}
