//! Host storage kinds and the element type bridge
//!
//! The host runtime stores dense data in exactly three cell layouts: 64-bit
//! integers, 64-bit reals, and double-precision complex pairs. This module
//! maps Rust element types onto those kinds twice over: a *strict* match
//! (bit-identical layout, enables zero-copy borrowing) and a *convert* match
//! (the kind the type can always be copied through).

mod element;

pub use element::Element;

pub(crate) use element::convert_element;

use crate::error::{Error, Result};
use bytemuck::{Pod, Zeroable};
use num_complex::Complex64;
use std::fmt;

/// Storage kind of a host cell
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum HostKind {
    /// 64-bit signed integer cells
    Integer = 0,
    /// 64-bit floating point cells
    Real = 1,
    /// Double-precision complex cells
    Complex = 2,
}

impl HostKind {
    /// Size of one cell in bytes
    #[inline]
    pub const fn size_in_bytes(self) -> usize {
        match self {
            Self::Integer | Self::Real => 8,
            Self::Complex => 16,
        }
    }
}

impl fmt::Display for HostKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Integer => "Integer",
            Self::Real => "Real",
            Self::Complex => "Complex",
        };
        f.write_str(name)
    }
}

/// The host's complex cell: two consecutive f64 (re, im), C layout
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct HostComplex {
    /// Real part
    pub re: f64,
    /// Imaginary part
    pub im: f64,
}

impl HostComplex {
    /// Create a host complex cell
    #[inline]
    pub const fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }
}

impl From<Complex64> for HostComplex {
    #[inline]
    fn from(z: Complex64) -> Self {
        Self { re: z.re, im: z.im }
    }
}

impl From<HostComplex> for Complex64 {
    #[inline]
    fn from(z: HostComplex) -> Self {
        Complex64::new(z.re, z.im)
    }
}

/// One host cell tagged by its storage kind
///
/// This is the vehicle for element-wise conversion: element types widen into
/// a `HostScalar` at their convert kind and narrow back out of any kind.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum HostScalar {
    /// An integer cell
    Integer(i64),
    /// A real cell
    Real(f64),
    /// A complex cell
    Complex(HostComplex),
}

impl HostScalar {
    /// Storage kind of this cell
    #[inline]
    pub fn kind(&self) -> HostKind {
        match self {
            Self::Integer(_) => HostKind::Integer,
            Self::Real(_) => HostKind::Real,
            Self::Complex(_) => HostKind::Complex,
        }
    }

    /// Narrow to an integer, failing on complex sources
    #[inline]
    pub fn as_integer(self) -> Result<i64> {
        match self {
            Self::Integer(v) => Ok(v),
            Self::Real(v) => Ok(v as i64),
            Self::Complex(_) => Err(Error::type_error("cannot convert a complex cell to Integer")),
        }
    }

    /// Narrow to a real, failing on complex sources
    #[inline]
    pub fn as_real(self) -> Result<f64> {
        match self {
            Self::Integer(v) => Ok(v as f64),
            Self::Real(v) => Ok(v),
            Self::Complex(_) => Err(Error::type_error("cannot convert a complex cell to Real")),
        }
    }

    /// Widen to a complex cell; always succeeds
    #[inline]
    pub fn as_complex(self) -> HostComplex {
        match self {
            Self::Integer(v) => HostComplex::new(v as f64, 0.0),
            Self::Real(v) => HostComplex::new(v, 0.0),
            Self::Complex(z) => z,
        }
    }
}
