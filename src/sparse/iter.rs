//! Logical-position cursor and iterator
//!
//! Walks every position of a sparse array's index space (explicit and
//! implicit alike) in row-major order. Movement is mixed-radix odometer
//! arithmetic, so a cursor supports random access by arbitrary signed
//! offsets and a well-defined distance between any two positions.

use super::SparseArray;
use crate::dtype::Element;
use crate::index;

/// Random-access position walker over a sparse array's logical index space
///
/// The one-past-the-end position has the leading level equal to its extent
/// and every trailing level zero.
pub struct Cursor<'a, 'h, T: Element, const R: usize> {
    array: &'a SparseArray<'h, T, R>,
    idx: [usize; R],
}

impl<'a, 'h, T: Element, const R: usize> Cursor<'a, 'h, T, R> {
    pub(crate) fn new(array: &'a SparseArray<'h, T, R>, idx: [usize; R]) -> Self {
        Self { array, idx }
    }

    /// Current logical index tuple
    pub fn index(&self) -> [usize; R] {
        self.idx
    }

    /// Whether the cursor sits one past the last position
    pub fn at_end(&self) -> bool {
        self.idx[0] >= self.array.dims()[0]
    }

    /// Resolve the element at the current position
    pub fn value(&self) -> T {
        debug_assert!(!self.at_end());
        self.array.value_at_pos(self.idx)
    }

    /// Move by a signed offset with carry/borrow across all levels
    pub fn advance(&mut self, delta: isize) {
        index::advance(&mut self.idx, &self.array.dims(), delta);
    }

    /// Signed distance from `other` to `self`, in flattened-index units:
    /// `self == other advanced by the result`
    pub fn distance_from(&self, other: &Self) -> isize {
        debug_assert!(std::ptr::eq(self.array, other.array));
        index::distance(&self.idx, &other.idx, &self.array.dims())
    }
}

impl<T: Element, const R: usize> Clone for Cursor<'_, '_, T, R> {
    fn clone(&self) -> Self {
        Self {
            array: self.array,
            idx: self.idx,
        }
    }
}

impl<T: Element, const R: usize> PartialEq for Cursor<'_, '_, T, R> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.array, other.array) && self.idx == other.idx
    }
}

impl<T: Element, const R: usize> std::fmt::Debug for Cursor<'_, '_, T, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor").field("idx", &self.idx).finish()
    }
}

/// Iterator over every logical position of a sparse array, yielding resolved
/// values in row-major order
pub struct SparseIter<'a, 'h, T: Element, const R: usize> {
    cursor: Cursor<'a, 'h, T, R>,
    remaining: usize,
}

impl<'a, 'h, T: Element, const R: usize> SparseIter<'a, 'h, T, R> {
    pub(crate) fn new(array: &'a SparseArray<'h, T, R>) -> Self {
        Self {
            cursor: array.begin(),
            remaining: array.size(),
        }
    }
}

impl<T: Element, const R: usize> Iterator for SparseIter<'_, '_, T, R> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.remaining == 0 {
            return None;
        }
        let v = self.cursor.value();
        self.cursor.advance(1);
        self.remaining -= 1;
        Some(v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T: Element, const R: usize> ExactSizeIterator for SparseIter<'_, '_, T, R> {}
