//! Rank-generic dense arrays over host or local buffers
//!
//! A [`DenseArray`] couples a statically ranked shape with a flat row-major
//! buffer under the five-state ownership model: the buffer may be locally
//! owned, borrowed from a host handle for one call (proxy), host-allocated
//! but exclusively managed here (manual), or jointly referenced (shared).

use crate::access::{self, Access, AccessMode, BorrowDecision};
use crate::dtype::{convert_element, Element, HostKind, HostScalar};
use crate::error::{Error, Result};
use crate::host::{DenseHandle, Host};
use crate::index;
use std::marker::PhantomData;
use std::ptr::NonNull;

/// Backing buffer of a dense array, tagged by ownership state
enum Storage<'h, T> {
    Empty,
    Owned(Vec<T>),
    Proxy {
        ptr: NonNull<T>,
        _host: PhantomData<&'h ()>,
    },
    Manual {
        ptr: NonNull<T>,
        handle: DenseHandle,
        host: &'h dyn Host,
    },
    Shared {
        ptr: NonNull<T>,
        handle: DenseHandle,
        host: &'h dyn Host,
    },
}

/// Rank-generic dense array bridging host dense handles
///
/// `'h` is the lifetime of the host borrow backing any non-owned state; it is
/// unconstrained for purely local arrays. Invariants: `size` is the product
/// of `dims`; a buffer is present exactly when the tag is not `Empty`; a
/// foreign handle is retained exactly for `Manual` and `Shared`.
pub struct DenseArray<'h, T: Element, const R: usize> {
    dims: [usize; R],
    size: usize,
    storage: Storage<'h, T>,
}

/// Allocate a zero-length-checked local buffer, surfacing failure as a
/// memory error instead of aborting.
pub(crate) fn alloc_vec<T>(len: usize) -> Result<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| Error::Memory { elems: len })?;
    Ok(v)
}

/// Read one cell of a host buffer at the given kind
///
/// # Safety
/// `handle`'s data pointer must be valid for `offset` per the host contract.
unsafe fn host_cell(host: &dyn Host, handle: DenseHandle, kind: HostKind, offset: usize) -> HostScalar {
    match kind {
        HostKind::Integer => HostScalar::Integer(*host.dense_integer_data(handle).add(offset)),
        HostKind::Real => HostScalar::Real(*host.dense_real_data(handle).add(offset)),
        HostKind::Complex => HostScalar::Complex(*host.dense_complex_data(handle).add(offset)),
    }
}

/// Write one cell of a host buffer at the given kind
///
/// # Safety
/// As [`host_cell`].
unsafe fn set_host_cell(
    host: &dyn Host,
    handle: DenseHandle,
    kind: HostKind,
    offset: usize,
    cell: HostScalar,
) -> Result<()> {
    match kind {
        HostKind::Integer => *host.dense_integer_data(handle).add(offset) = cell.as_integer()?,
        HostKind::Real => *host.dense_real_data(handle).add(offset) = cell.as_real()?,
        HostKind::Complex => *host.dense_complex_data(handle).add(offset) = cell.as_complex(),
    }
    Ok(())
}

/// Raw strict-matched data pointer of a handle, cast to the element type
///
/// Caller must have verified `T::STRICT == Some(kind)`.
pub(crate) fn strict_ptr<T: Element>(
    host: &dyn Host,
    handle: DenseHandle,
    kind: HostKind,
) -> NonNull<T> {
    let raw = match kind {
        HostKind::Integer => host.dense_integer_data(handle) as *mut T,
        HostKind::Real => host.dense_real_data(handle) as *mut T,
        HostKind::Complex => host.dense_complex_data(handle) as *mut T,
    };
    debug_assert_eq!(T::STRICT, Some(kind));
    NonNull::new(raw).unwrap_or(NonNull::dangling())
}

impl<'h, T: Element, const R: usize> DenseArray<'h, T, R> {
    /// Wrap a host dense handle under the requested access mode.
    ///
    /// Borrows the host buffer zero-copy when its storage kind strictly
    /// matches `T` and a borrow was requested; otherwise copies element-wise
    /// (with kind conversion) into a fresh owned buffer, forcing the tag to
    /// `Owned` regardless of the request.
    pub fn from_handle(host: &'h dyn Host, handle: DenseHandle, mode: AccessMode) -> Result<Self> {
        let got = host.dense_rank(handle);
        if got != R {
            return Err(Error::Rank { expected: R, got });
        }
        let host_dims = host.dense_dims(handle);
        let mut dims = [0usize; R];
        dims.copy_from_slice(&host_dims);
        let size = host.dense_len(handle);
        debug_assert_eq!(size, index::flattened_size(&dims));

        let kind = host.dense_kind(handle);
        let layout_match = T::STRICT == Some(kind);
        let storage = match access::resolve(mode, layout_match) {
            BorrowDecision::BorrowProxy => Storage::Proxy {
                ptr: strict_ptr(host, handle, kind),
                _host: PhantomData,
            },
            BorrowDecision::BorrowShared => Storage::Shared {
                ptr: strict_ptr(host, handle, kind),
                handle,
                host,
            },
            BorrowDecision::Copy => {
                if mode != AccessMode::Owned {
                    log::debug!(
                        "dense wrap: {} handle does not strictly match element type, copying",
                        kind
                    );
                }
                let mut buf = alloc_vec::<T>(size)?;
                for offset in 0..size {
                    let cell = unsafe { host_cell(host, handle, kind, offset) };
                    buf.push(T::from_host(cell)?);
                }
                Storage::Owned(buf)
            }
        };
        Ok(Self {
            dims,
            size,
            storage,
        })
    }

    /// Owned, zero-filled array of the given shape
    pub fn zeros(dims: [usize; R]) -> Result<Self> {
        Self::filled(dims, T::zero())
    }

    /// Owned array of the given shape, every element `value`
    pub fn filled(dims: [usize; R], value: T) -> Result<Self> {
        let size = index::flattened_size(&dims);
        let mut buf = alloc_vec(size)?;
        buf.resize(size, value);
        Ok(Self {
            dims,
            size,
            storage: Storage::Owned(buf),
        })
    }

    /// Owned array from literal row-major data
    pub fn from_slice(dims: [usize; R], data: &[T]) -> Result<Self> {
        let size = index::flattened_size(&dims);
        if data.len() != size {
            return Err(Error::dimension(format!(
                "data length {} does not match shape {:?}",
                data.len(),
                dims
            )));
        }
        let mut buf = alloc_vec(size)?;
        buf.extend_from_slice(data);
        Ok(Self {
            dims,
            size,
            storage: Storage::Owned(buf),
        })
    }

    /// Host-allocated array of the given shape, exclusively managed here.
    ///
    /// Asks the host for a fresh handle of `T`'s strict kind; fails with a
    /// type error when `T` has none.
    pub fn manual(host: &'h dyn Host, dims: [usize; R]) -> Result<Self> {
        let kind = T::STRICT.ok_or_else(|| {
            Error::type_error("element type has no strict host kind for manual allocation")
        })?;
        let handle = host.dense_alloc(kind, &dims)?;
        let size = index::flattened_size(&dims);
        Ok(Self {
            dims,
            size,
            storage: Storage::Manual {
                ptr: strict_ptr(host, handle, kind),
                handle,
                host,
            },
        })
    }

    /// Deep-copy an array of a different element type, with kind conversion
    pub fn convert_from<U: Element>(other: &DenseArray<'_, U, R>) -> Result<Self> {
        let mut buf = alloc_vec(other.size)?;
        for &v in other.as_slice() {
            buf.push(convert_element(v)?);
        }
        Ok(Self {
            dims: other.dims,
            size: other.size,
            storage: Storage::Owned(buf),
        })
    }

    /// Ownership tag of the backing buffer
    pub fn access(&self) -> Access {
        match self.storage {
            Storage::Empty => Access::Empty,
            Storage::Owned(_) => Access::Owned,
            Storage::Proxy { .. } => Access::Proxy,
            Storage::Manual { .. } => Access::Manual,
            Storage::Shared { .. } => Access::Shared,
        }
    }

    /// Rank of the array
    pub const fn rank(&self) -> usize {
        R
    }

    /// Total element count
    pub fn size(&self) -> usize {
        self.size
    }

    /// Extents per dimension
    pub fn dims(&self) -> [usize; R] {
        self.dims
    }

    /// Extent of one dimension
    pub fn dim(&self, level: usize) -> usize {
        self.dims[level]
    }

    /// Flat row-major view of the buffer; empty for the `Empty` state
    pub fn as_slice(&self) -> &[T] {
        match &self.storage {
            Storage::Empty => &[],
            Storage::Owned(v) => v,
            Storage::Proxy { ptr, .. }
            | Storage::Manual { ptr, .. }
            | Storage::Shared { ptr, .. } => unsafe {
                std::slice::from_raw_parts(ptr.as_ptr(), self.size)
            },
        }
    }

    /// Mutable flat view; writes to proxy/shared states go through to the
    /// host buffer
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        match &mut self.storage {
            Storage::Empty => &mut [],
            Storage::Owned(v) => v,
            Storage::Proxy { ptr, .. }
            | Storage::Manual { ptr, .. }
            | Storage::Shared { ptr, .. } => unsafe {
                std::slice::from_raw_parts_mut(ptr.as_ptr(), self.size)
            },
        }
    }

    /// Bounds-checked element read; negative indices count from the end
    pub fn at(&self, idx: [isize; R]) -> Result<T> {
        let offset = index::flatten(&idx, &self.dims)?;
        Ok(self.as_slice()[offset])
    }

    /// Bounds-checked mutable element access
    pub fn at_mut(&mut self, idx: [isize; R]) -> Result<&mut T> {
        let offset = index::flatten(&idx, &self.dims)?;
        Ok(&mut self.as_mut_slice()[offset])
    }

    /// Unchecked element read for hot loops; bounds are debug-asserted
    pub fn value(&self, idx: [isize; R]) -> T {
        let offset = index::flatten_unchecked(&idx, &self.dims);
        self.as_slice()[offset]
    }

    /// Unchecked mutable element access
    pub fn value_mut(&mut self, idx: [isize; R]) -> &mut T {
        let offset = index::flatten_unchecked(&idx, &self.dims);
        &mut self.as_mut_slice()[offset]
    }

    /// Iterate the buffer in row-major order
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.as_slice().iter()
    }

    fn check_same_dims(&self, other_dims: &[usize; R]) -> Result<()> {
        if &self.dims != other_dims {
            return Err(Error::dimension(format!(
                "arrays have different dimensions: {:?} vs {:?}",
                self.dims, other_dims
            )));
        }
        Ok(())
    }

    /// Copy-assign from another array of the same shape.
    ///
    /// Shape mismatch is a dimension error and mutates neither operand.
    pub fn assign(&mut self, other: &DenseArray<'_, T, R>) -> Result<()> {
        self.check_same_dims(&other.dims)?;
        if std::ptr::eq(self.as_slice().as_ptr(), other.as_slice().as_ptr()) {
            return Ok(());
        }
        self.as_mut_slice().copy_from_slice(other.as_slice());
        Ok(())
    }

    /// Move-assign from another array of the same shape.
    ///
    /// Swaps the backing storage in O(1) when both sides own their buffers
    /// (owned or manual); degrades to an element copy when either side is
    /// borrowed, since pointer identity cannot be transferred out of a
    /// borrow.
    pub fn assign_take(&mut self, mut other: DenseArray<'h, T, R>) -> Result<()> {
        self.check_same_dims(&other.dims)?;
        let both_own = matches!(self.storage, Storage::Owned(_) | Storage::Manual { .. })
            && matches!(other.storage, Storage::Owned(_) | Storage::Manual { .. });
        if both_own {
            std::mem::swap(&mut self.storage, &mut other.storage);
        } else {
            self.as_mut_slice().copy_from_slice(other.as_slice());
        }
        Ok(())
    }

    /// Extract to a fresh host handle by copy.
    ///
    /// Always allocates a new handle of `T`'s convert kind and copies the
    /// data in with kind conversion.
    pub fn to_handle(&self, host: &dyn Host) -> Result<DenseHandle> {
        let kind = T::CONVERT;
        let handle = host.dense_alloc(kind, &self.dims)?;
        for (offset, &v) in self.as_slice().iter().enumerate() {
            unsafe { set_host_cell(host, handle, kind, offset, v.to_host())? };
        }
        Ok(handle)
    }

    /// Extract to a host handle by move.
    ///
    /// A `Manual` array transfers its existing handle directly and is left
    /// empty (its later drop is a no-op); every other state falls back to
    /// [`to_handle`](Self::to_handle).
    pub fn into_handle(mut self, host: &dyn Host) -> Result<DenseHandle> {
        if let Storage::Manual { handle, .. } = self.storage {
            self.storage = Storage::Empty;
            return Ok(handle);
        }
        self.to_handle(host)
    }
}

impl<T: Element, const R: usize> Default for DenseArray<'_, T, R> {
    fn default() -> Self {
        Self {
            dims: [0; R],
            size: 0,
            storage: Storage::Empty,
        }
    }
}

impl<T: Element, const R: usize> Clone for DenseArray<'_, T, R> {
    /// Cloning always produces a fresh owned deep copy, whatever the source
    /// tag.
    fn clone(&self) -> Self {
        Self {
            dims: self.dims,
            size: self.size,
            storage: match self.storage {
                Storage::Empty => Storage::Empty,
                _ => Storage::Owned(self.as_slice().to_vec()),
            },
        }
    }
}

impl<T: Element, const R: usize> PartialEq for DenseArray<'_, T, R> {
    fn eq(&self, other: &Self) -> bool {
        if self.dims != other.dims {
            return false;
        }
        let (a, b) = (self.as_slice(), other.as_slice());
        std::ptr::eq(a.as_ptr(), b.as_ptr()) || a == b
    }
}

impl<T: Element, const R: usize> std::fmt::Debug for DenseArray<'_, T, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DenseArray")
            .field("dims", &self.dims)
            .field("access", &self.access())
            .field("data", &self.as_slice())
            .finish()
    }
}

impl<T: Element, const R: usize> Drop for DenseArray<'_, T, R> {
    fn drop(&mut self) {
        match &self.storage {
            Storage::Empty | Storage::Owned(_) | Storage::Proxy { .. } => {}
            Storage::Manual { handle, host, .. } => host.dense_free(*handle),
            Storage::Shared { handle, host, .. } => host.dense_disown(*handle),
        }
    }
}

/// Rank-1 dense array
pub type List<'h, T> = DenseArray<'h, T, 1>;
/// Rank-2 dense array
pub type Matrix<'h, T> = DenseArray<'h, T, 2>;
