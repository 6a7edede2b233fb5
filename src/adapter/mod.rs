//! Call adapter: argument marshaling, result submission, error recovery
//!
//! The single boundary between host invocations and typed array code. A
//! [`CallContext`] wraps the host for the scope of one call, an [`ArgReader`]
//! walks the raw argument list with typed extractors, and
//! [`CallContext::invoke`] is the one recovery point: every error raised
//! below it is recorded in the last-error slot and mapped to a numeric
//! status.

use crate::access::AccessMode;
use crate::dense::DenseArray;
use crate::dtype::{Element, HostComplex};
use crate::error::{Error, Result, STATUS_OK};
use crate::host::{DenseHandle, Host, SparseHandle};
use crate::sparse::SparseArray;
use std::cell::RefCell;

/// One raw argument cell as the host delivers it
#[derive(Debug, Clone, PartialEq)]
pub enum HostArg {
    /// A boolean scalar
    Boolean(bool),
    /// An integer scalar
    Integer(i64),
    /// A real scalar
    Real(f64),
    /// A complex scalar
    Complex(HostComplex),
    /// A UTF-8 string
    String(String),
    /// A dense array handle
    Dense(DenseHandle),
    /// A sparse array handle
    Sparse(SparseHandle),
}

impl HostArg {
    fn describe(&self) -> &'static str {
        match self {
            Self::Boolean(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::Complex(_) => "complex",
            Self::String(_) => "string",
            Self::Dense(_) => "dense array",
            Self::Sparse(_) => "sparse array",
        }
    }
}

/// Declared passing mode of an array argument
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PassMode {
    /// Copy in; the caller keeps nothing
    Value,
    /// Borrow for reading within this call
    ConstRef,
    /// Borrow with shared write-back semantics
    MutRef,
}

impl PassMode {
    /// The access mode an array argument is wrapped with
    pub fn access(self) -> AccessMode {
        match self {
            Self::Value => AccessMode::Owned,
            Self::ConstRef => AccessMode::Proxy,
            Self::MutRef => AccessMode::Shared,
        }
    }
}

/// Result of an invocation, mirrored back to the host
#[derive(Debug, Clone, PartialEq)]
pub enum RetValue {
    /// No result
    Void,
    /// A boolean scalar
    Boolean(bool),
    /// An integer scalar
    Integer(i64),
    /// A real scalar
    Real(f64),
    /// A complex scalar
    Complex(HostComplex),
    /// An owned UTF-8 string
    String(String),
    /// A dense array handle, ownership passed to the host
    Dense(DenseHandle),
    /// A sparse array handle, ownership passed to the host
    Sparse(SparseHandle),
}

/// Typed walker over a raw argument list
///
/// Extractors consume arguments left to right; asking for more arguments
/// than were passed, a mismatched argument kind, or leaving arguments
/// unconsumed (checked by [`finish`](ArgReader::finish)) is a function
/// error.
pub struct ArgReader<'call, 'h> {
    host: &'h dyn Host,
    args: &'call [HostArg],
    next: usize,
}

impl<'call, 'h> ArgReader<'call, 'h> {
    pub(crate) fn new(host: &'h dyn Host, args: &'call [HostArg]) -> Self {
        Self {
            host,
            args,
            next: 0,
        }
    }

    fn take(&mut self, expected: &str) -> Result<&'call HostArg> {
        let arg = self.args.get(self.next).ok_or_else(|| {
            Error::function(format!(
                "argument {} ({expected}) missing, only {} passed",
                self.next + 1,
                self.args.len()
            ))
        })?;
        self.next += 1;
        Ok(arg)
    }

    fn mismatch(&self, expected: &str, got: &HostArg) -> Error {
        Error::function(format!(
            "argument {} is a {}, expected {expected}",
            self.next,
            got.describe()
        ))
    }

    /// Boolean argument
    pub fn boolean(&mut self) -> Result<bool> {
        match self.take("boolean")? {
            HostArg::Boolean(b) => Ok(*b),
            other => Err(self.mismatch("boolean", other)),
        }
    }

    /// Integer argument; never coerced from other kinds
    pub fn integer(&mut self) -> Result<i64> {
        match self.take("integer")? {
            HostArg::Integer(i) => Ok(*i),
            other => Err(self.mismatch("integer", other)),
        }
    }

    /// Real argument; an integer argument widens
    pub fn real(&mut self) -> Result<f64> {
        match self.take("real")? {
            HostArg::Real(r) => Ok(*r),
            HostArg::Integer(i) => Ok(*i as f64),
            other => Err(self.mismatch("real", other)),
        }
    }

    /// Complex argument; real and integer arguments widen
    pub fn complex(&mut self) -> Result<HostComplex> {
        match self.take("complex")? {
            HostArg::Complex(z) => Ok(*z),
            HostArg::Real(r) => Ok(HostComplex { re: *r, im: 0.0 }),
            HostArg::Integer(i) => Ok(HostComplex {
                re: *i as f64,
                im: 0.0,
            }),
            other => Err(self.mismatch("complex", other)),
        }
    }

    /// String argument, copied out of the argument list
    pub fn string(&mut self) -> Result<String> {
        match self.take("string")? {
            HostArg::String(s) => Ok(s.clone()),
            other => Err(self.mismatch("string", other)),
        }
    }

    /// Dense array argument, wrapped per the declared passing mode
    pub fn dense<T: Element, const R: usize>(
        &mut self,
        mode: PassMode,
    ) -> Result<DenseArray<'h, T, R>> {
        let host = self.host;
        match self.take("dense array")? {
            HostArg::Dense(handle) => DenseArray::from_handle(host, *handle, mode.access()),
            other => Err(self.mismatch("dense array", other)),
        }
    }

    /// Sparse array argument, wrapped per the declared passing mode
    pub fn sparse<T: Element, const R: usize>(
        &mut self,
        mode: PassMode,
    ) -> Result<SparseArray<'h, T, R>> {
        let host = self.host;
        match self.take("sparse array")? {
            HostArg::Sparse(handle) => SparseArray::from_handle(host, *handle, mode.access()),
            other => Err(self.mismatch("sparse array", other)),
        }
    }

    /// Assert that every argument was consumed
    pub fn finish(&self) -> Result<()> {
        if self.next != self.args.len() {
            return Err(Error::function(format!(
                "{} arguments passed, {} consumed",
                self.args.len(),
                self.next
            )));
        }
        Ok(())
    }
}

/// Per-invocation call state: the host borrow, the last-error slot and an
/// append-only diagnostic log, both cleared at the start of each
/// [`invoke`](CallContext::invoke)
pub struct CallContext<'h> {
    host: &'h dyn Host,
    last_error: RefCell<Option<(i32, String)>>,
    diagnostics: RefCell<Vec<String>>,
}

impl<'h> CallContext<'h> {
    /// Wrap a host borrow for the scope of one or more invocations
    pub fn new(host: &'h dyn Host) -> Self {
        Self {
            host,
            last_error: RefCell::new(None),
            diagnostics: RefCell::new(Vec::new()),
        }
    }

    /// The host this context wraps
    pub fn host(&self) -> &'h dyn Host {
        self.host
    }

    /// Poll the host's abort predicate
    pub fn aborted(&self) -> bool {
        self.host.aborted()
    }

    /// Append a line to the diagnostic log
    pub fn log(&self, message: impl Into<String>) {
        self.diagnostics.borrow_mut().push(message.into());
    }

    /// Snapshot of the diagnostic log
    pub fn diagnostics(&self) -> Vec<String> {
        self.diagnostics.borrow().clone()
    }

    /// Status code and message of the last failed invocation, if any
    pub fn last_error(&self) -> Option<(i32, String)> {
        self.last_error.borrow().clone()
    }

    /// Clear the last-error slot
    pub fn clear_error(&self) {
        self.last_error.borrow_mut().take();
    }

    /// Submit a dense result, transferring the handle directly when the
    /// array exclusively owns one
    pub fn submit_dense<T: Element, const R: usize>(
        &self,
        array: DenseArray<'_, T, R>,
    ) -> Result<RetValue> {
        Ok(RetValue::Dense(array.into_handle(self.host)?))
    }

    /// Submit a sparse result as a fresh host handle
    pub fn submit_sparse<T: Element, const R: usize>(
        &self,
        array: &SparseArray<'_, T, R>,
    ) -> Result<RetValue> {
        Ok(RetValue::Sparse(array.to_handle(self.host)?))
    }

    /// Run one invocation: marshal arguments through an [`ArgReader`], call
    /// `f`, and map the outcome to a host status.
    ///
    /// Success returns status 0 with the result. Any error is logged,
    /// recorded in the last-error slot, and mapped to its numeric status;
    /// no result is produced.
    pub fn invoke<F>(&self, args: &[HostArg], f: F) -> (i32, Option<RetValue>)
    where
        F: FnOnce(&Self, &mut ArgReader<'_, 'h>) -> Result<RetValue>,
    {
        self.last_error.borrow_mut().take();
        self.diagnostics.borrow_mut().clear();
        let mut reader = ArgReader::new(self.host, args);
        match f(self, &mut reader) {
            Ok(ret) => (STATUS_OK, Some(ret)),
            Err(e) => {
                log::error!("invocation failed: {e}");
                let status = e.status();
                *self.last_error.borrow_mut() = Some((status, e.to_string()));
                (status, None)
            }
        }
    }
}
