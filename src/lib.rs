//! # numlink
//!
//! **Typed, rank-generic array bridging for an opaque numerical host runtime.**
//!
//! numlink connects a host runtime's dense and sparse array handles with
//! statically typed Rust values: `DenseArray<T, R>` and `SparseArray<T, R>`
//! carry their rank in the type, their element type decides zero-copy
//! borrowing versus converting copies, and a five-state ownership model
//! (empty / owned / proxy / manual / shared) makes every buffer's lifecycle
//! explicit. This is a data-structure and memory-contract layer; numerical
//! algorithms live above it.
//!
//! ## What's here
//!
//! - **Dense arrays**: row-major, const-generic rank, bounds-checked and
//!   unchecked indexing with negative-index wrap
//! - **Sparse arrays**: CSR with an implicit background value, rule and
//!   dense construction, in-place writes with structural updates, logical
//!   cursors and iterators
//! - **Element bridge**: strict (bit-identical) and convert (widening)
//!   mappings between Rust element types and the host's three storage kinds
//! - **Call adapter**: argument marshaling, result submission, and a single
//!   error-recovery point that maps failures to host status codes
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use numlink::prelude::*;
//!
//! let ctx = CallContext::new(&host);
//! let (status, ret) = ctx.invoke(&args, |ctx, reader| {
//!     let mut a: DenseArray<f64, 2> = reader.dense(PassMode::ConstRef)?;
//!     reader.finish()?;
//!     // ... work on `a` ...
//!     ctx.submit_dense(a)
//! });
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_inception)]

pub mod access;
pub mod adapter;
pub mod dense;
pub mod dtype;
pub mod error;
pub mod host;
pub mod index;
pub mod sparse;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::access::{Access, AccessMode};
    pub use crate::adapter::{ArgReader, CallContext, HostArg, PassMode, RetValue};
    pub use crate::dense::{DenseArray, List, Matrix};
    pub use crate::dtype::{Element, HostComplex, HostKind, HostScalar};
    pub use crate::error::{Error, Result};
    pub use crate::host::{DenseHandle, Host, MemHost, SparseHandle};
    pub use crate::sparse::{Cursor, Entry, EntryMut, SparseArray, SparseIter};
}
