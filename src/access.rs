//! Ownership tags and the borrow-vs-copy decision table

/// Ownership state of an array's backing buffer
///
/// The closed five-state model of this layer's memory contract:
///
/// | tag      | who holds the resource | released by              |
/// |----------|------------------------|--------------------------|
/// | `Empty`  | nobody                 | nothing                  |
/// | `Owned`  | this array             | local deallocation       |
/// | `Proxy`  | the host, per call     | nothing (borrow)         |
/// | `Manual` | this array             | host free on the handle  |
/// | `Shared` | host and this array    | host reference decrement |
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Access {
    /// No buffer; a default-constructed or moved-from array
    Empty,
    /// Locally allocated and freed buffer
    Owned,
    /// Buffer borrowed from a host handle for the scope of one call
    Proxy,
    /// Host-allocated buffer exclusively managed (and freed) by this layer
    Manual,
    /// Buffer jointly referenced with the host; released by disowning
    Shared,
}

/// Requested access when wrapping a host handle
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AccessMode {
    /// Exclusive ownership: always copy out of the handle
    Owned,
    /// Borrow the handle's buffer for this call
    Proxy,
    /// Jointly reference the handle's buffer, with write-back semantics
    Shared,
}

/// Outcome of the borrow-vs-copy decision
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BorrowDecision {
    /// Copy element-wise into a fresh owned buffer (tag forced to `Owned`)
    Copy,
    /// Borrow the host pointer directly with tag `Proxy`
    BorrowProxy,
    /// Borrow the host pointer directly with tag `Shared`
    BorrowShared,
}

/// Decide between borrowing and copying when wrapping a host handle.
///
/// A pure function of the requested access and whether the handle's storage
/// kind strictly matches the element type. Borrowing requires both a layout
/// match and a borrow-style request; everything else copies.
#[inline]
pub fn resolve(mode: AccessMode, layout_match: bool) -> BorrowDecision {
    match (mode, layout_match) {
        (AccessMode::Owned, _) => BorrowDecision::Copy,
        (AccessMode::Proxy, false) => BorrowDecision::Copy,
        (AccessMode::Shared, false) => BorrowDecision::Copy,
        (AccessMode::Proxy, true) => BorrowDecision::BorrowProxy,
        (AccessMode::Shared, true) => BorrowDecision::BorrowShared,
    }
}
