//! Element proxies: a sparse array plus one logical index tuple

use super::SparseArray;
use crate::dtype::Element;
use crate::error::Result;
use crate::index;

/// Read-only element proxy
///
/// Binds a borrowed array and a logical index tuple; the lookup happens on
/// [`get`](Entry::get), not at construction, so a proxy may be formed for an
/// out-of-range tuple and probed with [`in_bounds`](Entry::in_bounds).
pub struct Entry<'a, 'h, T: Element, const R: usize> {
    array: &'a SparseArray<'h, T, R>,
    idx: [isize; R],
}

impl<'a, 'h, T: Element, const R: usize> Entry<'a, 'h, T, R> {
    pub(crate) fn new(array: &'a SparseArray<'h, T, R>, idx: [isize; R]) -> Self {
        Self { array, idx }
    }

    /// The bound index tuple
    pub fn index(&self) -> [isize; R] {
        self.idx
    }

    /// Whether the tuple resolves inside the array's shape
    pub fn in_bounds(&self) -> bool {
        in_bounds(&self.idx, &self.array.dims())
    }

    /// Resolve the element: stored value if explicit, implicit otherwise
    pub fn get(&self) -> Result<T> {
        self.array.get(self.idx)
    }
}

/// Mutable element proxy; [`set`](EntryMut::set) performs the full
/// insert / overwrite / erase write dispatch
pub struct EntryMut<'a, 'h, T: Element, const R: usize> {
    array: &'a mut SparseArray<'h, T, R>,
    idx: [isize; R],
}

impl<'a, 'h, T: Element, const R: usize> EntryMut<'a, 'h, T, R> {
    pub(crate) fn new(array: &'a mut SparseArray<'h, T, R>, idx: [isize; R]) -> Self {
        Self { array, idx }
    }

    /// The bound index tuple
    pub fn index(&self) -> [isize; R] {
        self.idx
    }

    /// Whether the tuple resolves inside the array's shape
    pub fn in_bounds(&self) -> bool {
        in_bounds(&self.idx, &self.array.dims())
    }

    /// Resolve the element: stored value if explicit, implicit otherwise
    pub fn get(&self) -> Result<T> {
        self.array.get(self.idx)
    }

    /// Write through to the array
    pub fn set(&mut self, value: T) -> Result<()> {
        self.array.set(self.idx, value)
    }
}

fn in_bounds<const R: usize>(idx: &[isize; R], dims: &[usize; R]) -> bool {
    (0..R).all(|level| index::normalize(idx[level], dims[level], level).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_reports_bounds_and_reads_lazily() {
        let s = SparseArray::<f64, 2>::from_rules([2, 2], &[([1, 0], 3.0)], 0.0).unwrap();
        let hit = s.entry([1, 0]);
        assert!(hit.in_bounds());
        assert_eq!(hit.get().unwrap(), 3.0);

        let miss = s.entry([0, 1]);
        assert_eq!(miss.get().unwrap(), 0.0);

        let outside = s.entry([2, 0]);
        assert!(!outside.in_bounds());
        assert!(outside.get().is_err());
    }

    #[test]
    fn entry_mut_writes_through() {
        let mut s = SparseArray::<f64, 2>::from_dims([2, 2], 0.0).unwrap();
        s.entry_mut([0, 1]).set(4.5).unwrap();
        assert_eq!(s.nnz(), 1);
        assert_eq!(s.get([0, 1]).unwrap(), 4.5);
    }
}
