//! Shape and index helpers: flattening, negative wrap, odometer arithmetic

use crate::error::{Error, Result};

/// Product of all extents
#[inline]
pub fn flattened_size(dims: &[usize]) -> usize {
    dims.iter().product()
}

/// Resolve one possibly negative index against an extent.
///
/// Negative indices count from the end, Python style. Returns the resolved
/// non-negative index or an out-of-range error.
#[inline]
pub fn normalize(index: isize, extent: usize, axis: usize) -> Result<usize> {
    let resolved = if index < 0 {
        index.wrapping_add(extent as isize)
    } else {
        index
    };
    if resolved < 0 || resolved as usize >= extent {
        return Err(Error::OutOfRange {
            axis,
            index,
            extent,
        });
    }
    Ok(resolved as usize)
}

/// Resolve without the range check; debug-asserted only. For hot loops where
/// the caller has already validated.
#[inline]
pub fn normalize_unchecked(index: isize, extent: usize) -> usize {
    let resolved = if index < 0 {
        index.wrapping_add(extent as isize)
    } else {
        index
    };
    debug_assert!(resolved >= 0 && (resolved as usize) < extent);
    resolved as usize
}

/// Row-major flat offset of a checked, possibly negative multi-index.
///
/// `offset = fold over levels of offset * dims[level] + normalize(idx[level])`.
#[inline]
pub fn flatten<const R: usize>(idx: &[isize; R], dims: &[usize; R]) -> Result<usize> {
    let mut offset = 0usize;
    for level in 0..R {
        offset = offset * dims[level] + normalize(idx[level], dims[level], level)?;
    }
    Ok(offset)
}

/// Row-major flat offset without range checks.
#[inline]
pub fn flatten_unchecked<const R: usize>(idx: &[isize; R], dims: &[usize; R]) -> usize {
    let mut offset = 0usize;
    for level in 0..R {
        offset = offset * dims[level] + normalize_unchecked(idx[level], dims[level]);
    }
    offset
}

/// Row-major flat offset of an already non-negative multi-index.
#[inline]
pub fn flatten_usize<const R: usize>(idx: &[usize; R], dims: &[usize; R]) -> usize {
    let mut offset = 0usize;
    for level in 0..R {
        debug_assert!(idx[level] < dims[level] || (level == 0 && idx[0] == dims[0]));
        offset = offset * dims[level] + idx[level];
    }
    offset
}

/// Advance a logical multi-index by a signed offset with mixed-radix
/// ("odometer") carry/borrow across all levels.
///
/// The leading level is unclamped: the one-past-the-end position is
/// `idx[0] == dims[0]` with all trailing levels zero, and arithmetic may move
/// onto and off of it. Behavior for moves beyond that position follows plain
/// mixed-radix arithmetic on the leading digit.
pub fn advance<const R: usize>(idx: &mut [usize; R], dims: &[usize; R], delta: isize) {
    if delta == 0 {
        return;
    }
    if delta > 0 {
        let mut carry = delta as usize;
        for level in (1..R).rev() {
            let dim = dims[level];
            let total = idx[level] + carry;
            idx[level] = total % dim;
            carry = total / dim;
            if carry == 0 {
                return;
            }
        }
        idx[0] += carry;
    } else {
        let mut borrow = delta.unsigned_abs();
        for level in (1..R).rev() {
            let dim = dims[level];
            if idx[level] >= borrow {
                idx[level] -= borrow;
                return;
            }
            let deficit = borrow - idx[level] - 1;
            idx[level] = dim - 1 - (deficit % dim);
            borrow = deficit / dim + 1;
        }
        idx[0] -= borrow;
    }
}

/// Signed distance between two logical multi-indices, in units of flattened
/// row-major index: `a = b + distance(a, b)`.
pub fn distance<const R: usize>(a: &[usize; R], b: &[usize; R], dims: &[usize; R]) -> isize {
    let mut diff = 0isize;
    for level in 0..R {
        diff = diff * dims[level] as isize + (a[level] as isize - b[level] as isize);
    }
    diff
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_wraps_negative() {
        assert_eq!(normalize(-1, 5, 0).unwrap(), 4);
        assert_eq!(normalize(0, 5, 0).unwrap(), 0);
        assert_eq!(normalize(4, 5, 0).unwrap(), 4);
        assert!(normalize(5, 5, 0).is_err());
        assert!(normalize(-6, 5, 0).is_err());
    }

    #[test]
    fn flatten_is_row_major() {
        let dims = [2usize, 3, 4];
        assert_eq!(flatten(&[0, 0, 0], &dims).unwrap(), 0);
        assert_eq!(flatten(&[0, 0, 3], &dims).unwrap(), 3);
        assert_eq!(flatten(&[0, 1, 0], &dims).unwrap(), 4);
        assert_eq!(flatten(&[1, 2, 3], &dims).unwrap(), 23);
        assert_eq!(flatten(&[-1, -1, -1], &dims).unwrap(), 23);
    }

    #[test]
    fn advance_carries_and_borrows() {
        let dims = [2usize, 3, 4];
        let mut idx = [0usize, 0, 0];
        advance(&mut idx, &dims, 5);
        assert_eq!(idx, [0, 1, 1]);
        advance(&mut idx, &dims, 7);
        assert_eq!(idx, [1, 0, 0]);
        advance(&mut idx, &dims, -1);
        assert_eq!(idx, [0, 2, 3]);
        advance(&mut idx, &dims, -11);
        assert_eq!(idx, [0, 0, 0]);
        // onto the end position and back
        advance(&mut idx, &dims, 24);
        assert_eq!(idx, [2, 0, 0]);
        advance(&mut idx, &dims, -24);
        assert_eq!(idx, [0, 0, 0]);
    }

    #[test]
    fn distance_matches_flat_difference() {
        let dims = [3usize, 4];
        let a = [2usize, 1];
        let b = [0usize, 3];
        assert_eq!(distance(&a, &b, &dims), 9 - 3);
        assert_eq!(distance(&b, &a, &dims), 3 - 9);

        let mut idx = b;
        advance(&mut idx, &dims, 6);
        assert_eq!(idx, a);
    }
}
