//! Rank-generic sparse arrays in CSR form with an implicit background value
//!
//! Storage is the classic values / column-tuples / row-pointer triple.
//! Column tuples (arity `R - 1`, or 1 when `R == 1`) are kept flat and
//! 1-based, sorted and unique within each row; `row_index` is non-decreasing
//! with `row_index[0] == 0` and `row_index[last] == nnz`. The public API is
//! 0-based with negative-index wrap; the 1-based correction happens at this
//! boundary.

pub mod entry;
pub mod iter;

pub use entry::{Entry, EntryMut};
pub use iter::{Cursor, SparseIter};

use crate::access::{Access, AccessMode};
use crate::dense::{alloc_vec, strict_ptr, DenseArray};
use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::host::{DenseHandle, Host, SparseHandle};
use crate::index;
use std::cmp::Ordering;
use std::marker::PhantomData;
use std::ptr::NonNull;

/// Explicit-capacity reserved outright for small arrays
const RESERVE_SMALL: usize = 1000;
/// Largest size that still reserves [`RESERVE_SMALL`] slots
const RESERVE_MEDIUM_LIMIT: usize = 250_000;

/// Capacity hint for explicit storage when sparsifying.
///
/// A caller-supplied density in [0, 1] wins; otherwise small arrays reserve
/// their full size, medium arrays a fixed slab, large arrays `2 * sqrt(size)`.
/// Purely an optimization hint; the thresholds are tunable.
fn reserve_hint(size: usize, density: Option<f64>) -> usize {
    match density {
        Some(d) if (0.0..=1.0).contains(&d) => (d * size as f64).round() as usize,
        _ if size <= RESERVE_SMALL => size,
        _ if size <= RESERVE_MEDIUM_LIMIT => RESERVE_SMALL,
        _ => ((size as f64).sqrt() * 2.0).round() as usize,
    }
}

/// Locally owned CSR triple
#[derive(Clone, Debug)]
struct Csr<T> {
    values: Vec<T>,
    /// Flat 1-based column tuples, stride = arity
    columns: Vec<usize>,
    row_index: Vec<usize>,
}

impl<T: Copy> Csr<T> {
    fn erase(&mut self, row: usize, slot: usize, arity: usize) {
        self.values.remove(slot);
        self.columns.drain(slot * arity..(slot + 1) * arity);
        for s in &mut self.row_index[row + 1..] {
            *s -= 1;
        }
    }

    fn insert(&mut self, row: usize, slot: usize, key: &[usize], value: T) {
        self.values.insert(slot, value);
        let at = slot * key.len();
        for (offset, &c) in key.iter().enumerate() {
            self.columns.insert(at + offset, c);
        }
        for s in &mut self.row_index[row + 1..] {
            *s += 1;
        }
    }
}

/// Borrowed CSR triple living in host buffers
///
/// Index buffers are the host's own `i64` arrays; reads convert. A missing
/// row-pointer buffer stands for an all-zero `row_index` (only legal when
/// `nnz == 0`).
#[derive(Copy, Clone, Debug)]
struct RawCsr<T> {
    values: NonNull<T>,
    columns: NonNull<i64>,
    row_index: Option<NonNull<i64>>,
    nnz: usize,
}

impl<T: Copy> RawCsr<T> {
    unsafe fn value(&self, k: usize) -> T {
        *self.values.as_ptr().add(k)
    }

    unsafe fn column(&self, k: usize, arity: usize, level: usize) -> usize {
        *self.columns.as_ptr().add(k * arity + level) as usize
    }

    unsafe fn row(&self, slot: usize) -> usize {
        match self.row_index {
            Some(p) => *p.as_ptr().add(slot) as usize,
            None => 0,
        }
    }
}

/// Backing storage of a sparse array, tagged by ownership state
enum Backing<'h, T> {
    Empty,
    Owned(Csr<T>),
    Proxy {
        raw: RawCsr<T>,
        _host: PhantomData<&'h ()>,
    },
    Shared {
        raw: RawCsr<T>,
        handle: SparseHandle,
        host: &'h dyn Host,
    },
}

/// Rank-generic sparse array bridging host sparse handles
pub struct SparseArray<'h, T: Element, const R: usize> {
    dims: [usize; R],
    size: usize,
    implicit: T,
    backing: Backing<'h, T>,
}

impl<'h, T: Element, const R: usize> SparseArray<'h, T, R> {
    /// Column-tuple arity: the trailing levels, or the single level at rank 1
    const ARITY: usize = if R <= 1 { 1 } else { R - 1 };

    fn row_count_of(dims: &[usize; R]) -> usize {
        if R == 1 {
            1
        } else {
            dims[0]
        }
    }

    fn row_count(&self) -> usize {
        Self::row_count_of(&self.dims)
    }

    /// All-implicit array of the given shape
    pub fn from_dims(dims: [usize; R], implicit: T) -> Result<Self> {
        let size = index::flattened_size(&dims);
        let slots = Self::row_count_of(&dims) + 1;
        let mut row_index = alloc_vec(slots)?;
        row_index.resize(slots, 0);
        Ok(Self {
            dims,
            size,
            implicit,
            backing: Backing::Owned(Csr {
                values: Vec::new(),
                columns: Vec::new(),
                row_index,
            }),
        })
    }

    /// Build from (index, value) rules.
    ///
    /// Out-of-bounds rules are a dimension error. Rules are stable-sorted by
    /// index tuple; duplicate indices keep the last occurrence; rules whose
    /// value equals `implicit` are dropped before `row_index` is computed, so
    /// `row_index[last] == nnz` always holds.
    pub fn from_rules(dims: [usize; R], rules: &[([isize; R], T)], implicit: T) -> Result<Self> {
        let mut entries: Vec<([usize; R], T)> = alloc_vec(rules.len())?;
        for &(idx, v) in rules {
            let mut pos = [0usize; R];
            for level in 0..R {
                pos[level] = index::normalize(idx[level], dims[level], level).map_err(|_| {
                    Error::dimension(format!("rule index {idx:?} out of bounds for {dims:?}"))
                })?;
            }
            entries.push((pos, v));
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        let mut kept: Vec<([usize; R], T)> = Vec::with_capacity(entries.len());
        for e in entries {
            if let Some(last) = kept.last_mut() {
                if last.0 == e.0 {
                    *last = e;
                    continue;
                }
            }
            kept.push(e);
        }
        kept.retain(|&(_, v)| v != implicit);

        let mut out = Self::from_dims(dims, implicit)?;
        let csr = out.owned_mut();
        csr.values.reserve(kept.len());
        csr.columns.reserve(kept.len() * Self::ARITY);
        for (pos, v) in kept {
            let row = if R == 1 { 0 } else { pos[0] };
            csr.row_index[row + 1] += 1;
            csr.values.push(v);
            if R == 1 {
                csr.columns.push(pos[0] + 1);
            } else {
                for level in 1..R {
                    csr.columns.push(pos[level] + 1);
                }
            }
        }
        let slots = csr.row_index.len();
        for s in 1..slots {
            csr.row_index[s] += csr.row_index[s - 1];
        }
        Ok(out)
    }

    /// Sparsify a dense array: scan row-major, push every value that differs
    /// from `implicit` as an explicit entry
    pub fn from_dense(
        dense: &DenseArray<'_, T, R>,
        implicit: T,
        density: Option<f64>,
    ) -> Result<Self> {
        let dims = dense.dims();
        let size = dense.size();
        let rows = Self::row_count_of(&dims);
        let per_row = if rows == 0 { 0 } else { size / rows };
        let hint = reserve_hint(size, density);

        let mut out = Self::from_dims(dims, implicit)?;
        let csr = out.owned_mut();
        csr.values.reserve(hint);
        csr.columns.reserve(hint * Self::ARITY);
        let data = dense.as_slice();
        for row in 0..rows {
            for within in 0..per_row {
                let v = data[row * per_row + within];
                if v == implicit {
                    continue;
                }
                csr.values.push(v);
                if R == 1 {
                    csr.columns.push(within + 1);
                } else {
                    let mut tuple = [0usize; R];
                    let mut rem = within;
                    for level in (1..R).rev() {
                        tuple[level] = rem % dims[level] + 1;
                        rem /= dims[level];
                    }
                    for level in 1..R {
                        csr.columns.push(tuple[level]);
                    }
                }
            }
            csr.row_index[row + 1] = csr.values.len();
        }
        Ok(out)
    }

    /// Wrap a host sparse handle under the requested access mode.
    ///
    /// Borrows the host's CSR buffers zero-copy when the explicit-value kind
    /// strictly matches `T` and a borrow was requested. A proxy request on a
    /// mismatched layout degrades to an owned element-converted copy; a
    /// shared request on a mismatched layout is a type error, since a copy
    /// cannot provide write-back semantics.
    pub fn from_handle(host: &'h dyn Host, handle: SparseHandle, mode: AccessMode) -> Result<Self> {
        let got = host.sparse_rank(handle);
        if got != R {
            return Err(Error::Rank { expected: R, got });
        }
        let host_dims = host.sparse_dims(handle);
        let mut dims = [0usize; R];
        dims.copy_from_slice(&host_dims);
        let size = index::flattened_size(&dims);

        let values_h = host.sparse_explicit_values(handle);
        let columns_h = host.sparse_column_indices(handle);
        let rows_h = host.sparse_row_pointers(handle);
        let implicit_h = host.sparse_implicit_value(handle);

        let kind = match values_h {
            Some(h) => host.dense_kind(h),
            None => host.dense_kind(implicit_h),
        };
        let implicit =
            DenseArray::<T, 1>::from_handle(host, implicit_h, AccessMode::Owned)?.at([0])?;
        let nnz = values_h.map(|h| host.dense_len(h)).unwrap_or(0);
        let layout_match = T::STRICT == Some(kind);

        let backing = match mode {
            AccessMode::Owned => {
                Backing::Owned(Self::copy_host_csr(host, values_h, columns_h, rows_h, &dims)?)
            }
            AccessMode::Proxy | AccessMode::Shared if layout_match => {
                let raw = RawCsr {
                    values: match values_h {
                        Some(h) => strict_ptr(host, h, kind),
                        None => NonNull::dangling(),
                    },
                    columns: match columns_h {
                        Some(h) => NonNull::new(host.dense_integer_data(h))
                            .unwrap_or(NonNull::dangling()),
                        None => NonNull::dangling(),
                    },
                    row_index: rows_h.and_then(|h| NonNull::new(host.dense_integer_data(h))),
                    nnz,
                };
                match mode {
                    AccessMode::Proxy => Backing::Proxy {
                        raw,
                        _host: PhantomData,
                    },
                    _ => Backing::Shared { raw, handle, host },
                }
            }
            AccessMode::Proxy => {
                log::debug!(
                    "sparse wrap: {} handle does not strictly match element type, copying",
                    kind
                );
                Backing::Owned(Self::copy_host_csr(host, values_h, columns_h, rows_h, &dims)?)
            }
            AccessMode::Shared => {
                return Err(Error::type_error(format!(
                    "shared access to a {kind} sparse handle needs a strictly matching element type"
                )));
            }
        };
        Ok(Self {
            dims,
            size,
            implicit,
            backing,
        })
    }

    /// Element-converted owned copy of a host handle's CSR triple
    fn copy_host_csr(
        host: &dyn Host,
        values_h: Option<DenseHandle>,
        columns_h: Option<DenseHandle>,
        rows_h: Option<DenseHandle>,
        dims: &[usize; R],
    ) -> Result<Csr<T>> {
        let values = match values_h {
            Some(h) => {
                let a = DenseArray::<T, 1>::from_handle(host, h, AccessMode::Owned)?;
                a.as_slice().to_vec()
            }
            None => Vec::new(),
        };
        let columns = match columns_h {
            Some(h) => {
                let a = DenseArray::<i64, 2>::from_handle(host, h, AccessMode::Owned)?;
                a.as_slice().iter().map(|&c| c as usize).collect()
            }
            None => Vec::new(),
        };
        let slots = Self::row_count_of(dims) + 1;
        let row_index = match rows_h {
            Some(h) => {
                let a = DenseArray::<i64, 1>::from_handle(host, h, AccessMode::Owned)?;
                a.as_slice().iter().map(|&s| s as usize).collect()
            }
            None => vec![0; slots],
        };
        debug_assert_eq!(row_index.len(), slots);
        debug_assert_eq!(*row_index.last().unwrap_or(&0), values.len());
        Ok(Csr {
            values,
            columns,
            row_index,
        })
    }

    /// Ownership tag of the backing storage
    pub fn access(&self) -> Access {
        match self.backing {
            Backing::Empty => Access::Empty,
            Backing::Owned(_) => Access::Owned,
            Backing::Proxy { .. } => Access::Proxy,
            Backing::Shared { .. } => Access::Shared,
        }
    }

    /// Rank of the array
    pub const fn rank(&self) -> usize {
        R
    }

    /// Extents per dimension
    pub fn dims(&self) -> [usize; R] {
        self.dims
    }

    /// Total logical element count
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of explicit entries
    pub fn nnz(&self) -> usize {
        match &self.backing {
            Backing::Empty => 0,
            Backing::Owned(csr) => csr.values.len(),
            Backing::Proxy { raw, .. } | Backing::Shared { raw, .. } => raw.nnz,
        }
    }

    /// The background value of all non-explicit positions
    pub fn implicit_value(&self) -> T {
        self.implicit
    }

    /// Copy of the row-pointer array
    pub fn row_index(&self) -> Vec<usize> {
        (0..=self.row_count()).map(|s| self.row_index_at(s)).collect()
    }

    /// Copy of the flat 1-based column tuples
    pub fn column_tuples(&self) -> Vec<usize> {
        let arity = Self::ARITY;
        (0..self.nnz() * arity)
            .map(|flat| self.column_at(flat / arity, flat % arity))
            .collect()
    }

    fn storage_value(&self, k: usize) -> T {
        match &self.backing {
            Backing::Owned(csr) => csr.values[k],
            Backing::Proxy { raw, .. } | Backing::Shared { raw, .. } => unsafe { raw.value(k) },
            Backing::Empty => unreachable!("storage read on empty backing"),
        }
    }

    fn column_at(&self, k: usize, level: usize) -> usize {
        match &self.backing {
            Backing::Owned(csr) => csr.columns[k * Self::ARITY + level],
            Backing::Proxy { raw, .. } | Backing::Shared { raw, .. } => unsafe {
                raw.column(k, Self::ARITY, level)
            },
            Backing::Empty => unreachable!("column read on empty backing"),
        }
    }

    fn row_index_at(&self, slot: usize) -> usize {
        match &self.backing {
            Backing::Empty => 0,
            Backing::Owned(csr) => csr.row_index[slot],
            Backing::Proxy { raw, .. } | Backing::Shared { raw, .. } => unsafe { raw.row(slot) },
        }
    }

    fn owned_mut(&mut self) -> &mut Csr<T> {
        match &mut self.backing {
            Backing::Owned(csr) => csr,
            _ => unreachable!("backing must be owned here"),
        }
    }

    fn normalize(&self, idx: [isize; R]) -> Result<[usize; R]> {
        let mut pos = [0usize; R];
        for level in 0..R {
            pos[level] = index::normalize(idx[level], self.dims[level], level)?;
        }
        Ok(pos)
    }

    /// Row and 1-based column key of a normalized position
    fn locate(&self, pos: &[usize; R]) -> (usize, [usize; R]) {
        let mut key = [0usize; R];
        if R == 1 {
            key[0] = pos[0] + 1;
            (0, key)
        } else {
            for level in 1..R {
                key[level - 1] = pos[level] + 1;
            }
            (pos[0], key)
        }
    }

    fn compare_columns(&self, k: usize, key: &[usize; R]) -> Ordering {
        for level in 0..Self::ARITY {
            match self.column_at(k, level).cmp(&key[level]) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        Ordering::Equal
    }

    /// Binary-search a row's column range for a key; `Err` carries the
    /// insertion slot
    fn search(&self, row: usize, key: &[usize; R]) -> std::result::Result<usize, usize> {
        let mut lo = self.row_index_at(row);
        let mut hi = self.row_index_at(row + 1);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.compare_columns(mid, key) {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => return Ok(mid),
            }
        }
        Err(lo)
    }

    /// Bounds-checked element read; negative indices count from the end
    pub fn get(&self, idx: [isize; R]) -> Result<T> {
        let pos = self.normalize(idx)?;
        Ok(self.value_at_pos(pos))
    }

    /// Unchecked element read for hot loops; bounds are debug-asserted
    pub fn value_at(&self, idx: [isize; R]) -> T {
        let mut pos = [0usize; R];
        for level in 0..R {
            pos[level] = index::normalize_unchecked(idx[level], self.dims[level]);
        }
        self.value_at_pos(pos)
    }

    pub(crate) fn value_at_pos(&self, pos: [usize; R]) -> T {
        if self.nnz() == 0 {
            return self.implicit;
        }
        let (row, key) = self.locate(&pos);
        match self.search(row, &key) {
            Ok(k) => self.storage_value(k),
            Err(_) => self.implicit,
        }
    }

    fn require_structural(&self, what: &str) -> Result<()> {
        if matches!(self.backing, Backing::Shared { .. }) {
            return Err(Error::structural(format!(
                "cannot {what} on shared sparse storage"
            )));
        }
        Ok(())
    }

    /// Copy the backing triple into owned storage; no-op when already owned
    fn promote_to_owned(&mut self) -> Result<()> {
        if matches!(self.backing, Backing::Owned(_)) {
            return Ok(());
        }
        log::debug!("sparse mutation promotes borrowed backing to owned");
        let nnz = self.nnz();
        let arity = Self::ARITY;
        let mut values = alloc_vec(nnz)?;
        let mut columns = alloc_vec(nnz * arity)?;
        let mut row_index = alloc_vec(self.row_count() + 1)?;
        for k in 0..nnz {
            values.push(self.storage_value(k));
            for level in 0..arity {
                columns.push(self.column_at(k, level));
            }
        }
        for slot in 0..=self.row_count() {
            row_index.push(self.row_index_at(slot));
        }
        // Replacing a shared backing would skip its disown; callers gate that.
        debug_assert!(!matches!(self.backing, Backing::Shared { .. }));
        self.backing = Backing::Owned(Csr {
            values,
            columns,
            row_index,
        });
        Ok(())
    }

    /// Bounds-checked element write with the insert / overwrite / erase
    /// dispatch.
    ///
    /// Writing `implicit` into an explicit position erases it; writing a
    /// non-implicit value into an implicit position inserts. Mutation on a
    /// proxy backing first promotes to an owned copy. A shared backing only
    /// permits in-place overwrite of an existing explicit entry; any
    /// structural change is an error and leaves the array unchanged.
    pub fn set(&mut self, idx: [isize; R], value: T) -> Result<()> {
        let pos = self.normalize(idx)?;
        self.set_at_pos(pos, value)
    }

    pub(crate) fn set_at_pos(&mut self, pos: [usize; R], value: T) -> Result<()> {
        let (row, key) = self.locate(&pos);
        match self.search(row, &key) {
            Ok(slot) => {
                if value == self.implicit {
                    self.require_structural("erase an explicit entry")?;
                    self.promote_to_owned()?;
                    self.owned_mut().erase(row, slot, Self::ARITY);
                } else {
                    if matches!(self.backing, Backing::Proxy { .. }) {
                        self.promote_to_owned()?;
                    }
                    match &mut self.backing {
                        Backing::Owned(csr) => csr.values[slot] = value,
                        Backing::Shared { raw, .. } => unsafe {
                            *raw.values.as_ptr().add(slot) = value;
                        },
                        Backing::Proxy { .. } | Backing::Empty => {
                            unreachable!("explicit entry found on non-mutable backing")
                        }
                    }
                }
            }
            Err(slot) => {
                if value == self.implicit {
                    return Ok(());
                }
                self.require_structural("insert a new explicit entry")?;
                self.promote_to_owned()?;
                let arity = Self::ARITY;
                self.owned_mut().insert(row, slot, &key[..arity], value);
            }
        }
        Ok(())
    }

    /// Element proxy bound to a logical index tuple
    pub fn entry(&self, idx: [isize; R]) -> Entry<'_, 'h, T, R> {
        Entry::new(self, idx)
    }

    /// Mutable element proxy bound to a logical index tuple
    pub fn entry_mut(&mut self, idx: [isize; R]) -> EntryMut<'_, 'h, T, R> {
        EntryMut::new(self, idx)
    }

    /// Cursor at the first logical position
    pub fn begin(&self) -> Cursor<'_, 'h, T, R> {
        Cursor::new(self, [0; R])
    }

    /// Cursor one past the last logical position
    pub fn end(&self) -> Cursor<'_, 'h, T, R> {
        let mut idx = [0; R];
        idx[0] = self.dims[0];
        Cursor::new(self, idx)
    }

    /// Iterate every logical position (explicit and implicit) in row-major
    /// order
    pub fn iter(&self) -> SparseIter<'_, 'h, T, R> {
        SparseIter::new(self)
    }

    /// Compact out explicit entries that now equal the implicit value and
    /// rebuild `row_index`; O(nnz).
    ///
    /// A no-op (also legal on borrowed backings) when nothing has to be
    /// dropped. Otherwise a proxy backing promotes first, and a shared
    /// backing is a structural error.
    pub fn refresh_implicit(&mut self) -> Result<()> {
        let implicit = self.implicit;
        let stale = (0..self.nnz()).any(|k| self.storage_value(k) == implicit);
        if !stale {
            return Ok(());
        }
        self.require_structural("drop stale explicit entries")?;
        self.promote_to_owned()?;
        let arity = Self::ARITY;
        let rows = self.row_count();
        let csr = self.owned_mut();
        let mut w = 0usize;
        for row in 0..rows {
            let (lo, hi) = (csr.row_index[row], csr.row_index[row + 1]);
            csr.row_index[row] = w;
            for k in lo..hi {
                if csr.values[k] != implicit {
                    csr.values[w] = csr.values[k];
                    for level in 0..arity {
                        csr.columns[w * arity + level] = csr.columns[k * arity + level];
                    }
                    w += 1;
                }
            }
        }
        csr.row_index[rows] = w;
        csr.values.truncate(w);
        csr.columns.truncate(w * arity);
        Ok(())
    }

    /// Apply `f` to the implicit value and every explicit value in place,
    /// optionally compacting afterwards.
    ///
    /// Structure is untouched, so in-place application is legal on shared
    /// backing; a proxy backing promotes first. With `refresh` set, entries
    /// that now equal the new implicit value are compacted out (subject to
    /// the [`refresh_implicit`](Self::refresh_implicit) backing rules).
    pub fn transform(&mut self, f: impl Fn(T) -> T, refresh: bool) -> Result<()> {
        self.implicit = f(self.implicit);
        if matches!(self.backing, Backing::Proxy { .. }) {
            self.promote_to_owned()?;
        }
        match &mut self.backing {
            Backing::Empty => {}
            Backing::Owned(csr) => {
                for v in &mut csr.values {
                    *v = f(*v);
                }
            }
            Backing::Shared { raw, .. } => {
                for k in 0..raw.nnz {
                    unsafe {
                        let p = raw.values.as_ptr().add(k);
                        *p = f(*p);
                    }
                }
            }
            Backing::Proxy { .. } => unreachable!("proxy was promoted above"),
        }
        if refresh {
            self.refresh_implicit()?;
        }
        Ok(())
    }

    /// Densify: a dense array filled with the implicit value, explicit
    /// entries scattered in; O(size + nnz)
    pub fn to_dense(&self) -> Result<DenseArray<'static, T, R>> {
        let mut dense = DenseArray::filled(self.dims, self.implicit)?;
        let rows = self.row_count();
        let data = dense.as_mut_slice();
        for row in 0..rows {
            for k in self.row_index_at(row)..self.row_index_at(row + 1) {
                let mut pos = [0usize; R];
                if R == 1 {
                    pos[0] = self.column_at(k, 0) - 1;
                } else {
                    pos[0] = row;
                    for level in 1..R {
                        pos[level] = self.column_at(k, level - 1) - 1;
                    }
                }
                data[index::flatten_usize(&pos, &self.dims)] = self.storage_value(k);
            }
        }
        Ok(dense)
    }

    /// Copy-assign from another array of the same shape.
    ///
    /// On a shared destination the explicit structure (implicit value,
    /// columns, row pointers) must match exactly and only values are copied
    /// in place; any difference is a structural error. Other destinations
    /// take a deep owned copy.
    pub fn assign(&mut self, other: &SparseArray<'_, T, R>) -> Result<()> {
        if self.dims != other.dims {
            return Err(Error::dimension(format!(
                "arrays have different dimensions: {:?} vs {:?}",
                self.dims, other.dims
            )));
        }
        if let Backing::Shared { raw, .. } = &self.backing {
            let same_structure = self.implicit == other.implicit
                && raw.nnz == other.nnz()
                && self.row_index() == other.row_index()
                && self.column_tuples() == other.column_tuples();
            if !same_structure {
                return Err(Error::structural(
                    "assignment into shared sparse storage requires identical structure",
                ));
            }
            for k in 0..raw.nnz {
                unsafe { *raw.values.as_ptr().add(k) = other.storage_value(k) };
            }
            return Ok(());
        }
        self.implicit = other.implicit;
        self.backing = Backing::Owned(other.owned_copy()?);
        Ok(())
    }

    fn owned_copy(&self) -> Result<Csr<T>> {
        let nnz = self.nnz();
        let arity = Self::ARITY;
        let mut values = alloc_vec(nnz)?;
        let mut columns = alloc_vec(nnz * arity)?;
        let mut row_index = alloc_vec(self.row_count() + 1)?;
        for k in 0..nnz {
            values.push(self.storage_value(k));
            for level in 0..arity {
                columns.push(self.column_at(k, level));
            }
        }
        for slot in 0..=self.row_count() {
            row_index.push(self.row_index_at(slot));
        }
        Ok(Csr {
            values,
            columns,
            row_index,
        })
    }

    /// Extract to a fresh host sparse handle.
    ///
    /// Builds 1-based explicit positions `[nnz, R]`, values, dims and
    /// implicit value as dense handles and moves all four into the host's
    /// from-explicit-positions constructor.
    pub fn to_handle(&self, host: &dyn Host) -> Result<SparseHandle> {
        let nnz = self.nnz();
        let rows = self.row_count();
        let mut positions: Vec<i64> = alloc_vec(nnz * R)?;
        let mut values: Vec<T> = alloc_vec(nnz)?;
        for row in 0..rows {
            for k in self.row_index_at(row)..self.row_index_at(row + 1) {
                if R > 1 {
                    positions.push(row as i64 + 1);
                }
                for level in 0..Self::ARITY {
                    positions.push(self.column_at(k, level) as i64);
                }
                values.push(self.storage_value(k));
            }
        }
        let dims: Vec<i64> = self.dims.iter().map(|&d| d as i64).collect();

        let positions_h = {
            let mut a = DenseArray::<i64, 2>::manual(host, [nnz, R])?;
            a.as_mut_slice().copy_from_slice(&positions);
            a.into_handle(host)?
        };
        let dims_h = {
            let mut a = DenseArray::<i64, 1>::manual(host, [R])?;
            a.as_mut_slice().copy_from_slice(&dims);
            a.into_handle(host)?
        };
        let values_h = export_values(host, &values)?;
        let implicit_h = export_values(host, &[self.implicit])?;
        host.sparse_from_explicit(positions_h, values_h, dims_h, implicit_h)
    }
}

/// Move a value slice into a fresh dense handle: host-allocated directly for
/// strict element types, copied out at the convert kind otherwise
fn export_values<T: Element>(host: &dyn Host, data: &[T]) -> Result<DenseHandle> {
    if T::STRICT.is_some() {
        let mut a = DenseArray::<T, 1>::manual(host, [data.len()])?;
        a.as_mut_slice().copy_from_slice(data);
        a.into_handle(host)
    } else {
        DenseArray::<T, 1>::from_slice([data.len()], data)?.to_handle(host)
    }
}

impl<T: Element, const R: usize> Default for SparseArray<'_, T, R> {
    fn default() -> Self {
        Self {
            dims: [0; R],
            size: 0,
            implicit: T::zero(),
            backing: Backing::Empty,
        }
    }
}

impl<T: Element, const R: usize> Clone for SparseArray<'_, T, R> {
    /// Cloning always produces a fresh owned deep copy, whatever the source
    /// tag.
    fn clone(&self) -> Self {
        Self {
            dims: self.dims,
            size: self.size,
            implicit: self.implicit,
            backing: match self.backing {
                Backing::Empty => Backing::Empty,
                _ => Backing::Owned(Csr {
                    values: (0..self.nnz()).map(|k| self.storage_value(k)).collect(),
                    columns: self.column_tuples(),
                    row_index: self.row_index(),
                }),
            },
        }
    }
}

impl<T: Element, const R: usize> PartialEq for SparseArray<'_, T, R> {
    fn eq(&self, other: &Self) -> bool {
        if self.dims != other.dims {
            return false;
        }
        if self.implicit == other.implicit {
            return self.nnz() == other.nnz()
                && self.row_index() == other.row_index()
                && self.column_tuples() == other.column_tuples()
                && (0..self.nnz()).all(|k| self.storage_value(k) == other.storage_value(k));
        }
        // Differing implicit values: any position implicit in both arrays
        // would disagree, so combined nnz must cover every position.
        if self.nnz() + other.nnz() < self.size {
            return false;
        }
        self.iter().zip(other.iter()).all(|(a, b)| a == b)
    }
}

impl<T: Element, const R: usize> std::fmt::Debug for SparseArray<'_, T, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SparseArray")
            .field("dims", &self.dims)
            .field("access", &self.access())
            .field("implicit", &self.implicit)
            .field("nnz", &self.nnz())
            .finish()
    }
}

impl<T: Element, const R: usize> Drop for SparseArray<'_, T, R> {
    fn drop(&mut self) {
        if let Backing::Shared { handle, host, .. } = &self.backing {
            host.sparse_disown(*handle);
        }
    }
}
