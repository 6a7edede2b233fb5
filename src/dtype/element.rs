//! Element trait for mapping Rust types to host storage kinds

use super::{HostComplex, HostKind, HostScalar};
use crate::error::Result;
use num_complex::{Complex32, Complex64};
use num_traits::Zero;
use std::fmt::Debug;

/// Trait for types that can be elements of a bridged array
///
/// This trait connects Rust's type system to the host's three storage kinds.
/// It is implemented for all primitive numeric types and for num-complex's
/// `Complex32`/`Complex64`. A type without a valid host mapping simply does
/// not implement `Element`, which makes "no foreign mapping" a compile error
/// at the construction site.
///
/// # Bounds
/// - `Copy + PartialEq + Debug + 'static` - basic element requirements
/// - `Zero` - zero-filled owned allocation
pub trait Element: Copy + PartialEq + Zero + Debug + 'static {
    /// The host kind whose in-memory representation is bit-identical to
    /// `Self`, if any. A strict match enables zero-copy borrowing of host
    /// buffers.
    const STRICT: Option<HostKind>;

    /// The narrowest host kind `Self` can always be copied through.
    const CONVERT: HostKind;

    /// Narrow a host cell into `Self`.
    ///
    /// Integer/real sources cast with `as` semantics. A complex source into a
    /// non-complex element type is a type error.
    fn from_host(cell: HostScalar) -> Result<Self>;

    /// Widen `self` into a host cell of the `CONVERT` kind. Infallible.
    fn to_host(self) -> HostScalar;
}

/// Convert one element type into another through the host cell model.
///
/// This is exactly the precision a host round-trip would give: the source
/// widens to its convert kind, the target narrows from it. Complex into
/// non-complex fails with a type error.
#[inline]
pub(crate) fn convert_element<U: Element, T: Element>(value: U) -> Result<T> {
    T::from_host(value.to_host())
}

macro_rules! impl_integer_element {
    ($($ty:ty => $strict:expr),* $(,)?) => {$(
        impl Element for $ty {
            const STRICT: Option<HostKind> = $strict;
            const CONVERT: HostKind = HostKind::Integer;

            #[inline]
            fn from_host(cell: HostScalar) -> Result<Self> {
                Ok(cell.as_integer()? as $ty)
            }

            #[inline]
            fn to_host(self) -> HostScalar {
                HostScalar::Integer(self as i64)
            }
        }
    )*};
}

// Strict layout match: any integral type the same width as the host integer
// cell, regardless of signedness.
impl_integer_element! {
    i64 => Some(HostKind::Integer),
    u64 => Some(HostKind::Integer),
    isize => Some(HostKind::Integer),
    usize => Some(HostKind::Integer),
    i32 => None,
    u32 => None,
    i16 => None,
    u16 => None,
    i8 => None,
    u8 => None,
}

impl Element for f64 {
    const STRICT: Option<HostKind> = Some(HostKind::Real);
    const CONVERT: HostKind = HostKind::Real;

    #[inline]
    fn from_host(cell: HostScalar) -> Result<Self> {
        cell.as_real()
    }

    #[inline]
    fn to_host(self) -> HostScalar {
        HostScalar::Real(self)
    }
}

impl Element for f32 {
    const STRICT: Option<HostKind> = None;
    const CONVERT: HostKind = HostKind::Real;

    #[inline]
    fn from_host(cell: HostScalar) -> Result<Self> {
        Ok(cell.as_real()? as f32)
    }

    #[inline]
    fn to_host(self) -> HostScalar {
        HostScalar::Real(self as f64)
    }
}

impl Element for Complex64 {
    const STRICT: Option<HostKind> = Some(HostKind::Complex);
    const CONVERT: HostKind = HostKind::Complex;

    #[inline]
    fn from_host(cell: HostScalar) -> Result<Self> {
        Ok(cell.as_complex().into())
    }

    #[inline]
    fn to_host(self) -> HostScalar {
        HostScalar::Complex(self.into())
    }
}

impl Element for Complex32 {
    const STRICT: Option<HostKind> = None;
    const CONVERT: HostKind = HostKind::Complex;

    #[inline]
    fn from_host(cell: HostScalar) -> Result<Self> {
        let z = cell.as_complex();
        Ok(Complex32::new(z.re as f32, z.im as f32))
    }

    #[inline]
    fn to_host(self) -> HostScalar {
        HostScalar::Complex(HostComplex::new(self.re as f64, self.im as f64))
    }
}
