//! The host runtime, consumed as an opaque service
//!
//! Everything this layer knows about the host fits in the [`Host`] trait:
//! dense handle primitives, sparse handle primitives, and an abort predicate.
//! Handles are opaque ids; data access goes through per-kind raw pointers
//! whose buffers stay valid for the lifetime of the host borrow (one call).

pub mod mem;

pub use mem::MemHost;

use crate::dtype::{HostComplex, HostKind};
use crate::error::Result;

/// Opaque id of a host dense array
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct DenseHandle(pub u64);

/// Opaque id of a host sparse array
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SparseHandle(pub u64);

/// Service interface of the host numerical runtime
///
/// Single-threaded per invocation; implementations are consumed as
/// `&dyn Host` borrowed for the scope of one call. Primitives that can fail
/// on the host side return `Error::Host` with the host's own status code.
///
/// # Safety contract
///
/// Raw data pointers returned by the `*_data` methods must point to buffers
/// of the length reported for the handle, laid out per the reported kind,
/// and must remain valid and unmoved for the lifetime of the `Host` borrow.
pub trait Host {
    /// Allocate a new dense handle of the given kind and shape, zero-filled
    fn dense_alloc(&self, kind: HostKind, dims: &[usize]) -> Result<DenseHandle>;
    /// Free a dense handle previously allocated through this host
    fn dense_free(&self, handle: DenseHandle);
    /// Release this layer's reference on a jointly held dense handle
    fn dense_disown(&self, handle: DenseHandle);
    /// Rank of a dense handle
    fn dense_rank(&self, handle: DenseHandle) -> usize;
    /// Extents of a dense handle
    fn dense_dims(&self, handle: DenseHandle) -> Vec<usize>;
    /// Flattened element count of a dense handle
    fn dense_len(&self, handle: DenseHandle) -> usize;
    /// Storage kind of a dense handle
    fn dense_kind(&self, handle: DenseHandle) -> HostKind;
    /// Raw integer data pointer; valid only when the kind is `Integer`
    fn dense_integer_data(&self, handle: DenseHandle) -> *mut i64;
    /// Raw real data pointer; valid only when the kind is `Real`
    fn dense_real_data(&self, handle: DenseHandle) -> *mut f64;
    /// Raw complex data pointer; valid only when the kind is `Complex`
    fn dense_complex_data(&self, handle: DenseHandle) -> *mut HostComplex;

    /// Rank of a sparse handle
    fn sparse_rank(&self, handle: SparseHandle) -> usize;
    /// Extents of a sparse handle
    fn sparse_dims(&self, handle: SparseHandle) -> Vec<usize>;
    /// Explicit values of a sparse handle as a dense handle; `None` when the
    /// handle stores no explicit entries
    fn sparse_explicit_values(&self, handle: SparseHandle) -> Option<DenseHandle>;
    /// Column indices (1-based, flattened `[nnz, arity]`) as a dense handle
    fn sparse_column_indices(&self, handle: SparseHandle) -> Option<DenseHandle>;
    /// CSR row pointers as a dense handle
    fn sparse_row_pointers(&self, handle: SparseHandle) -> Option<DenseHandle>;
    /// Implicit value as a one-element dense handle
    fn sparse_implicit_value(&self, handle: SparseHandle) -> DenseHandle;
    /// Build a sparse handle from explicit positions.
    ///
    /// `positions` is a `[nnz, rank]` integer handle of 1-based indices,
    /// `values` a length-nnz handle, `dims` a length-rank integer handle,
    /// `implicit` a one-element handle. The host takes ownership of all four
    /// argument handles whether or not construction succeeds.
    fn sparse_from_explicit(
        &self,
        positions: DenseHandle,
        values: DenseHandle,
        dims: DenseHandle,
        implicit: DenseHandle,
    ) -> Result<SparseHandle>;
    /// Release this layer's reference on a jointly held sparse handle
    fn sparse_disown(&self, handle: SparseHandle);

    /// Abort predicate, polled by long-running algorithms built on this
    /// layer. The core never polls it.
    fn aborted(&self) -> bool;
}
