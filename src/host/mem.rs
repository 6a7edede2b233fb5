//! In-memory host: reference implementation of the [`Host`] service
//!
//! Backs the integration tests. Buffers live in boxed slices so raw data
//! pointers stay stable while the handle table grows, and ownership events
//! (free, disown) are counted so transfer properties are observable.

use super::{DenseHandle, Host, SparseHandle};
use crate::dtype::{HostComplex, HostKind};
use crate::error::{Error, Result};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

/// A kind-tagged host buffer
#[derive(Debug, Clone)]
enum DenseBuf {
    Integer(Box<[i64]>),
    Real(Box<[f64]>),
    Complex(Box<[HostComplex]>),
}

impl DenseBuf {
    fn zeroed(kind: HostKind, len: usize) -> Self {
        match kind {
            HostKind::Integer => Self::Integer(vec![0i64; len].into_boxed_slice()),
            HostKind::Real => Self::Real(vec![0f64; len].into_boxed_slice()),
            HostKind::Complex => {
                Self::Complex(vec![HostComplex::default(); len].into_boxed_slice())
            }
        }
    }

    fn kind(&self) -> HostKind {
        match self {
            Self::Integer(_) => HostKind::Integer,
            Self::Real(_) => HostKind::Real,
            Self::Complex(_) => HostKind::Complex,
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Integer(b) => b.len(),
            Self::Real(b) => b.len(),
            Self::Complex(b) => b.len(),
        }
    }

    fn eq_cell_of(&self, i: usize, other: &DenseBuf, j: usize) -> bool {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => a[i] == b[j],
            (Self::Real(a), Self::Real(b)) => a[i] == b[j],
            (Self::Complex(a), Self::Complex(b)) => a[i] == b[j],
            _ => false,
        }
    }

    fn copy_cell(&self, i: usize) -> DenseBuf {
        match self {
            Self::Integer(b) => Self::Integer(vec![b[i]].into_boxed_slice()),
            Self::Real(b) => Self::Real(vec![b[i]].into_boxed_slice()),
            Self::Complex(b) => Self::Complex(vec![b[i]].into_boxed_slice()),
        }
    }

    fn gather(&self, order: &[usize]) -> DenseBuf {
        match self {
            Self::Integer(b) => Self::Integer(order.iter().map(|&i| b[i]).collect()),
            Self::Real(b) => Self::Real(order.iter().map(|&i| b[i]).collect()),
            Self::Complex(b) => Self::Complex(order.iter().map(|&i| b[i]).collect()),
        }
    }
}

#[derive(Debug)]
struct DenseObj {
    dims: Vec<usize>,
    buf: DenseBuf,
}

/// Sparse object: component arrays held as dense handles, the way the host
/// hands them back out.
#[derive(Debug)]
struct SparseObj {
    dims: Vec<usize>,
    values: Option<DenseHandle>,
    columns: Option<DenseHandle>,
    row_pointers: Option<DenseHandle>,
    implicit: DenseHandle,
}

#[derive(Default)]
struct Arena {
    next_id: u64,
    dense: HashMap<u64, DenseObj>,
    sparse: HashMap<u64, SparseObj>,
}

/// In-memory [`Host`] implementation
#[derive(Default)]
pub struct MemHost {
    arena: RefCell<Arena>,
    abort: Cell<bool>,
    dense_freed: Cell<usize>,
    dense_disowned: Cell<usize>,
    sparse_disowned: Cell<usize>,
}

impl MemHost {
    /// Create an empty host
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm or clear the abort predicate
    pub fn set_abort(&self, abort: bool) {
        self.abort.set(abort);
    }

    /// Number of live dense handles
    pub fn dense_live(&self) -> usize {
        self.arena.borrow().dense.len()
    }

    /// Number of live sparse handles
    pub fn sparse_live(&self) -> usize {
        self.arena.borrow().sparse.len()
    }

    /// Number of dense handles freed so far
    pub fn dense_freed(&self) -> usize {
        self.dense_freed.get()
    }

    /// Number of dense disown events so far
    pub fn dense_disowned(&self) -> usize {
        self.dense_disowned.get()
    }

    /// Number of sparse disown events so far
    pub fn sparse_disowned(&self) -> usize {
        self.sparse_disowned.get()
    }

    fn insert_dense(&self, dims: Vec<usize>, buf: DenseBuf) -> DenseHandle {
        let mut arena = self.arena.borrow_mut();
        arena.next_id += 1;
        let id = arena.next_id;
        log::trace!("mem host: dense #{id} kind {} dims {:?}", buf.kind(), dims);
        arena.dense.insert(id, DenseObj { dims, buf });
        DenseHandle(id)
    }

    /// Create an integer dense handle from literal data
    pub fn dense_from_i64(&self, dims: &[usize], data: &[i64]) -> DenseHandle {
        assert_eq!(data.len(), dims.iter().product::<usize>());
        self.insert_dense(dims.to_vec(), DenseBuf::Integer(data.into()))
    }

    /// Create a real dense handle from literal data
    pub fn dense_from_f64(&self, dims: &[usize], data: &[f64]) -> DenseHandle {
        assert_eq!(data.len(), dims.iter().product::<usize>());
        self.insert_dense(dims.to_vec(), DenseBuf::Real(data.into()))
    }

    /// Create a complex dense handle from literal data
    pub fn dense_from_complex(&self, dims: &[usize], data: &[HostComplex]) -> DenseHandle {
        assert_eq!(data.len(), dims.iter().product::<usize>());
        self.insert_dense(dims.to_vec(), DenseBuf::Complex(data.into()))
    }

    /// Read an integer dense handle back out (test support)
    pub fn read_i64(&self, handle: DenseHandle) -> Vec<i64> {
        match &self.arena.borrow().dense[&handle.0].buf {
            DenseBuf::Integer(b) => b.to_vec(),
            other => panic!("handle is not Integer: {:?}", other.kind()),
        }
    }

    /// Read a real dense handle back out (test support)
    pub fn read_f64(&self, handle: DenseHandle) -> Vec<f64> {
        match &self.arena.borrow().dense[&handle.0].buf {
            DenseBuf::Real(b) => b.to_vec(),
            other => panic!("handle is not Real: {:?}", other.kind()),
        }
    }

    /// Read a complex dense handle back out (test support)
    pub fn read_complex(&self, handle: DenseHandle) -> Vec<HostComplex> {
        match &self.arena.borrow().dense[&handle.0].buf {
            DenseBuf::Complex(b) => b.to_vec(),
            other => panic!("handle is not Complex: {:?}", other.kind()),
        }
    }

    fn take_dense(&self, handle: DenseHandle, what: &str) -> DenseObj {
        self.arena
            .borrow_mut()
            .dense
            .remove(&handle.0)
            .unwrap_or_else(|| panic!("unknown dense handle for {what}"))
    }
}

impl Host for MemHost {
    fn dense_alloc(&self, kind: HostKind, dims: &[usize]) -> Result<DenseHandle> {
        let len = dims.iter().product();
        Ok(self.insert_dense(dims.to_vec(), DenseBuf::zeroed(kind, len)))
    }

    fn dense_free(&self, handle: DenseHandle) {
        self.take_dense(handle, "free");
        self.dense_freed.set(self.dense_freed.get() + 1);
    }

    fn dense_disown(&self, handle: DenseHandle) {
        assert!(
            self.arena.borrow().dense.contains_key(&handle.0),
            "disown of unknown dense handle"
        );
        self.dense_disowned.set(self.dense_disowned.get() + 1);
    }

    fn dense_rank(&self, handle: DenseHandle) -> usize {
        self.arena.borrow().dense[&handle.0].dims.len()
    }

    fn dense_dims(&self, handle: DenseHandle) -> Vec<usize> {
        self.arena.borrow().dense[&handle.0].dims.clone()
    }

    fn dense_len(&self, handle: DenseHandle) -> usize {
        self.arena.borrow().dense[&handle.0].buf.len()
    }

    fn dense_kind(&self, handle: DenseHandle) -> HostKind {
        self.arena.borrow().dense[&handle.0].buf.kind()
    }

    fn dense_integer_data(&self, handle: DenseHandle) -> *mut i64 {
        match &self.arena.borrow().dense[&handle.0].buf {
            DenseBuf::Integer(b) => b.as_ptr() as *mut i64,
            other => panic!("integer data requested from {:?} handle", other.kind()),
        }
    }

    fn dense_real_data(&self, handle: DenseHandle) -> *mut f64 {
        match &self.arena.borrow().dense[&handle.0].buf {
            DenseBuf::Real(b) => b.as_ptr() as *mut f64,
            other => panic!("real data requested from {:?} handle", other.kind()),
        }
    }

    fn dense_complex_data(&self, handle: DenseHandle) -> *mut HostComplex {
        match &self.arena.borrow().dense[&handle.0].buf {
            DenseBuf::Complex(b) => b.as_ptr() as *mut HostComplex,
            other => panic!("complex data requested from {:?} handle", other.kind()),
        }
    }

    fn sparse_rank(&self, handle: SparseHandle) -> usize {
        self.arena.borrow().sparse[&handle.0].dims.len()
    }

    fn sparse_dims(&self, handle: SparseHandle) -> Vec<usize> {
        self.arena.borrow().sparse[&handle.0].dims.clone()
    }

    fn sparse_explicit_values(&self, handle: SparseHandle) -> Option<DenseHandle> {
        self.arena.borrow().sparse[&handle.0].values
    }

    fn sparse_column_indices(&self, handle: SparseHandle) -> Option<DenseHandle> {
        self.arena.borrow().sparse[&handle.0].columns
    }

    fn sparse_row_pointers(&self, handle: SparseHandle) -> Option<DenseHandle> {
        self.arena.borrow().sparse[&handle.0].row_pointers
    }

    fn sparse_implicit_value(&self, handle: SparseHandle) -> DenseHandle {
        self.arena.borrow().sparse[&handle.0].implicit
    }

    fn sparse_from_explicit(
        &self,
        positions: DenseHandle,
        values: DenseHandle,
        dims: DenseHandle,
        implicit: DenseHandle,
    ) -> Result<SparseHandle> {
        // Takes ownership of all four argument handles.
        let pos_obj = self.take_dense(positions, "sparse positions");
        let val_obj = self.take_dense(values, "sparse values");
        let dims_obj = self.take_dense(dims, "sparse dims");
        let imp_obj = self.take_dense(implicit, "sparse implicit");

        let shape: Vec<usize> = match &dims_obj.buf {
            DenseBuf::Integer(b) => b.iter().map(|&d| d as usize).collect(),
            _ => return Err(Error::host(1, "sparse dims handle must be Integer")),
        };
        let rank = shape.len();
        let pos: Vec<i64> = match &pos_obj.buf {
            DenseBuf::Integer(b) => b.to_vec(),
            _ => return Err(Error::host(1, "sparse positions handle must be Integer")),
        };
        if pos_obj.dims.len() != 2 || pos_obj.dims[1] != rank {
            return Err(Error::host(3, "sparse positions handle must be [nnz, rank]"));
        }
        let nnz_in = pos_obj.dims[0];
        if val_obj.buf.len() != nnz_in || imp_obj.buf.len() != 1 {
            return Err(Error::host(3, "sparse values/implicit length mismatch"));
        }
        for row in pos.chunks_exact(rank) {
            for (level, &p) in row.iter().enumerate() {
                if p < 1 || p as usize > shape[level] {
                    return Err(Error::host(3, "sparse position out of range"));
                }
            }
        }

        // Sort positions row-major, last duplicate wins, implicit-valued
        // entries dropped.
        let mut order: Vec<usize> = (0..nnz_in).collect();
        order.sort_by(|&a, &b| pos[a * rank..(a + 1) * rank].cmp(&pos[b * rank..(b + 1) * rank]));
        let mut kept: Vec<usize> = Vec::with_capacity(nnz_in);
        for &entry in &order {
            if let Some(&last) = kept.last() {
                if pos[last * rank..(last + 1) * rank] == pos[entry * rank..(entry + 1) * rank] {
                    kept.pop();
                }
            }
            kept.push(entry);
        }
        kept.retain(|&entry| !val_obj.buf.eq_cell_of(entry, &imp_obj.buf, 0));
        let nnz = kept.len();

        let arity = if rank == 1 { 1 } else { rank - 1 };
        let rows = if rank == 1 { 1 } else { shape[0] };
        let mut columns = Vec::with_capacity(nnz * arity);
        let mut row_pointers = vec![0i64; rows + 1];
        for &entry in &kept {
            let tuple = &pos[entry * rank..(entry + 1) * rank];
            let row = if rank == 1 { 0 } else { tuple[0] as usize - 1 };
            row_pointers[row + 1] += 1;
            columns.extend_from_slice(&tuple[rank - arity..]);
        }
        for row in 0..rows {
            row_pointers[row + 1] += row_pointers[row];
        }
        let values_buf = val_obj.buf.gather(&kept);

        let values_h = (nnz > 0).then(|| self.insert_dense(vec![nnz], values_buf));
        let columns_h =
            (nnz > 0).then(|| self.insert_dense(vec![nnz, arity], DenseBuf::Integer(columns.into())));
        let row_ptr_h = self.insert_dense(
            vec![rows + 1],
            DenseBuf::Integer(row_pointers.into_boxed_slice()),
        );
        let implicit_h = self.insert_dense(vec![1], imp_obj.buf.copy_cell(0));

        let mut arena = self.arena.borrow_mut();
        arena.next_id += 1;
        let id = arena.next_id;
        arena.sparse.insert(
            id,
            SparseObj {
                dims: shape,
                values: values_h,
                columns: columns_h,
                row_pointers: Some(row_ptr_h),
                implicit: implicit_h,
            },
        );
        Ok(SparseHandle(id))
    }

    fn sparse_disown(&self, handle: SparseHandle) {
        assert!(
            self.arena.borrow().sparse.contains_key(&handle.0),
            "disown of unknown sparse handle"
        );
        self.sparse_disowned.set(self.sparse_disowned.get() + 1);
    }

    fn aborted(&self) -> bool {
        self.abort.get()
    }
}
