//! Sparse array behavior: construction, writes, host round trips

use numlink::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn sparsify_roundtrip<const R: usize>(rng: &mut StdRng, dims: [usize; R]) {
    let size: usize = dims.iter().product();
    let data: Vec<f64> = (0..size)
        .map(|_| {
            if rng.gen_bool(0.6) {
                0.0
            } else {
                rng.gen_range(-5.0..5.0)
            }
        })
        .collect();
    let dense = DenseArray::<f64, R>::from_slice(dims, &data).unwrap();
    let sparse = SparseArray::from_dense(&dense, 0.0, None).unwrap();
    let back = sparse.to_dense().unwrap();
    assert_eq!(back, dense, "round trip failed for dims {dims:?}");
    assert_eq!(*sparse.row_index().last().unwrap(), sparse.nnz());
}

#[test]
fn densify_of_sparsify_is_identity() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..20 {
        let n = rng.gen_range(1..40);
        sparsify_roundtrip(&mut rng, [n]);
    }
    for _ in 0..20 {
        let dims = [rng.gen_range(1..12), rng.gen_range(1..12)];
        sparsify_roundtrip(&mut rng, dims);
    }
    for _ in 0..20 {
        let dims = [
            rng.gen_range(1..6),
            rng.gen_range(1..6),
            rng.gen_range(1..6),
        ];
        sparsify_roundtrip(&mut rng, dims);
    }
}

#[test]
fn diagonal_rules_example() {
    let s = SparseArray::<f64, 2>::from_rules(
        [3, 3],
        &[([0, 0], 5.0), ([1, 1], 7.0), ([2, 2], 9.0)],
        0.0,
    )
    .unwrap();
    assert_eq!(s.get([0, 0]).unwrap(), 5.0);
    assert_eq!(s.get([1, 1]).unwrap(), 7.0);
    assert_eq!(s.get([0, 1]).unwrap(), 0.0);
    assert_eq!(s.nnz(), 3);
    assert_eq!(s.row_index(), vec![0, 1, 2, 3]);
}

#[test]
fn writes_shift_row_index_both_ways() {
    let mut s = SparseArray::<f64, 2>::from_rules(
        [3, 3],
        &[([0, 0], 5.0), ([1, 1], 7.0), ([2, 2], 9.0)],
        0.0,
    )
    .unwrap();

    // writing implicit into an explicit slot: nnz down, later slots shift down
    s.set([1, 1], 0.0).unwrap();
    assert_eq!(s.nnz(), 2);
    assert_eq!(s.row_index(), vec![0, 1, 1, 2]);

    // writing a value into an implicit slot: nnz up, later slots shift up
    s.set([1, 0], 4.0).unwrap();
    assert_eq!(s.nnz(), 3);
    assert_eq!(s.row_index(), vec![0, 1, 2, 3]);
    assert_eq!(s.get([1, 0]).unwrap(), 4.0);
    assert_eq!(s.get([2, 2]).unwrap(), 9.0);
}

#[test]
fn host_round_trip_preserves_the_array() {
    let host = MemHost::new();
    let s = SparseArray::<f64, 2>::from_rules(
        [4, 3],
        &[([0, 2], 1.5), ([2, 0], -2.0), ([2, 1], 3.0), ([3, 2], 8.0)],
        0.5,
    )
    .unwrap();
    let handle = s.to_handle(&host).unwrap();

    let back = SparseArray::<f64, 2>::from_handle(&host, handle, AccessMode::Owned).unwrap();
    assert_eq!(back, s);
    assert_eq!(back.implicit_value(), 0.5);
    assert_eq!(back.nnz(), 4);
}

#[test]
fn rank_one_host_round_trip() {
    let host = MemHost::new();
    let s = SparseArray::<i64, 1>::from_rules([6], &[([1], 4), ([4], 9)], 0).unwrap();
    let handle = s.to_handle(&host).unwrap();
    assert_eq!(host.sparse_dims(handle), vec![6]);

    let back = SparseArray::<i64, 1>::from_handle(&host, handle, AccessMode::Proxy).unwrap();
    assert_eq!(back.access(), Access::Proxy);
    assert_eq!(back.get([1]).unwrap(), 4);
    assert_eq!(back.get([4]).unwrap(), 9);
    assert_eq!(back.get([0]).unwrap(), 0);
    assert_eq!(back.row_index(), vec![0, 2]);
}

#[test]
fn proxy_promotes_to_owned_on_structural_write() {
    let host = MemHost::new();
    let s = SparseArray::<f64, 2>::from_rules([2, 2], &[([0, 0], 1.0)], 0.0).unwrap();
    let handle = s.to_handle(&host).unwrap();

    let mut p = SparseArray::<f64, 2>::from_handle(&host, handle, AccessMode::Proxy).unwrap();
    assert_eq!(p.access(), Access::Proxy);
    p.set([1, 1], 2.0).unwrap();
    assert_eq!(p.access(), Access::Owned);
    assert_eq!(p.nnz(), 2);

    // the host's explicit values are untouched
    let host_vals = host.read_f64(host.sparse_explicit_values(handle).unwrap());
    assert_eq!(host_vals, vec![1.0]);
}

#[test]
fn shared_allows_overwrite_but_rejects_structure_changes() {
    let host = MemHost::new();
    let s =
        SparseArray::<f64, 2>::from_rules([2, 2], &[([0, 0], 1.0), ([1, 1], 2.0)], 0.0).unwrap();
    let handle = s.to_handle(&host).unwrap();
    {
        let mut sh = SparseArray::<f64, 2>::from_handle(&host, handle, AccessMode::Shared).unwrap();
        assert_eq!(sh.access(), Access::Shared);

        // in-place overwrite writes through to the host buffer
        sh.set([0, 0], 9.0).unwrap();
        let host_vals = host.read_f64(host.sparse_explicit_values(handle).unwrap());
        assert_eq!(host_vals, vec![9.0, 2.0]);

        // inserting and erasing are structural and must fail unchanged
        let before_rows = sh.row_index();
        assert!(matches!(
            sh.set([0, 1], 5.0),
            Err(Error::StructuralMismatch(_))
        ));
        assert!(matches!(
            sh.set([1, 1], 0.0),
            Err(Error::StructuralMismatch(_))
        ));
        assert_eq!(sh.nnz(), 2);
        assert_eq!(sh.row_index(), before_rows);
        assert_eq!(sh.get([0, 1]).unwrap(), 0.0);
        assert_eq!(sh.get([1, 1]).unwrap(), 2.0);
    }
    assert_eq!(host.sparse_disowned(), 1);
}

#[test]
fn shared_refresh_is_ok_when_nothing_to_drop() {
    let host = MemHost::new();
    let s = SparseArray::<f64, 1>::from_rules([3], &[([0], 1.0)], 0.0).unwrap();
    let handle = s.to_handle(&host).unwrap();

    let mut sh = SparseArray::<f64, 1>::from_handle(&host, handle, AccessMode::Shared).unwrap();
    sh.refresh_implicit().unwrap();
    assert_eq!(sh.access(), Access::Shared);

    // erasing an entry would change the structure and must fail
    sh.set([0], 0.0).unwrap_err();
}

#[test]
fn shared_request_on_mismatched_layout_is_a_type_error() {
    let host = MemHost::new();
    let s = SparseArray::<f64, 1>::from_rules([3], &[([0], 1.0)], 0.0).unwrap();
    let handle = s.to_handle(&host).unwrap();

    let r = SparseArray::<f32, 1>::from_handle(&host, handle, AccessMode::Shared);
    assert!(matches!(r, Err(Error::Type(_))));

    // a proxy request degrades to a converted owned copy instead
    let p = SparseArray::<f32, 1>::from_handle(&host, handle, AccessMode::Proxy).unwrap();
    assert_eq!(p.access(), Access::Owned);
    assert_eq!(p.get([0]).unwrap(), 1.0f32);
}

#[test]
fn assign_into_shared_requires_identical_structure() {
    let host = MemHost::new();
    let s = SparseArray::<f64, 1>::from_rules([4], &[([1], 2.0), ([3], 4.0)], 0.0).unwrap();
    let handle = s.to_handle(&host).unwrap();

    let mut sh = SparseArray::<f64, 1>::from_handle(&host, handle, AccessMode::Shared).unwrap();

    let same_structure =
        SparseArray::<f64, 1>::from_rules([4], &[([1], -2.0), ([3], -4.0)], 0.0).unwrap();
    sh.assign(&same_structure).unwrap();
    let host_vals = host.read_f64(host.sparse_explicit_values(handle).unwrap());
    assert_eq!(host_vals, vec![-2.0, -4.0]);

    let other_structure = SparseArray::<f64, 1>::from_rules([4], &[([0], 1.0)], 0.0).unwrap();
    assert!(matches!(
        sh.assign(&other_structure),
        Err(Error::StructuralMismatch(_))
    ));

    let other_shape = SparseArray::<f64, 1>::from_rules([5], &[([1], 1.0)], 0.0).unwrap();
    assert!(matches!(sh.assign(&other_shape), Err(Error::Dimension(_))));
}

#[test]
fn transform_then_refresh_matches_rebuilding() {
    let mut s = SparseArray::<i64, 2>::from_rules(
        [2, 3],
        &[([0, 0], 1), ([0, 2], 2), ([1, 1], 3)],
        0,
    )
    .unwrap();
    // map 2 -> 0 so one entry becomes implicit
    s.transform(|v| if v == 2 { 0 } else { v * 10 }, true).unwrap();
    assert_eq!(s.nnz(), 2);
    assert_eq!(s.row_index(), vec![0, 1, 2]);
    assert_eq!(s.get([0, 0]).unwrap(), 10);
    assert_eq!(s.get([0, 2]).unwrap(), 0);
    assert_eq!(s.get([1, 1]).unwrap(), 30);

    let rebuilt =
        SparseArray::<i64, 2>::from_rules([2, 3], &[([0, 0], 10), ([1, 1], 30)], 0).unwrap();
    assert_eq!(s, rebuilt);
}

#[test]
fn density_hint_only_affects_capacity() {
    let dense = DenseArray::<f64, 1>::from_slice([8], &[0.0, 1.0, 0.0, 2.0, 0.0, 0.0, 3.0, 0.0])
        .unwrap();
    let a = SparseArray::from_dense(&dense, 0.0, Some(0.5)).unwrap();
    let b = SparseArray::from_dense(&dense, 0.0, None).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.nnz(), 3);
}

#[test]
fn clone_of_a_proxy_is_an_independent_owned_copy() {
    let host = MemHost::new();
    let s = SparseArray::<f64, 1>::from_rules([3], &[([1], 5.0)], 0.0).unwrap();
    let handle = s.to_handle(&host).unwrap();

    let p = SparseArray::<f64, 1>::from_handle(&host, handle, AccessMode::Proxy).unwrap();
    let mut c = p.clone();
    assert_eq!(c.access(), Access::Owned);
    c.set([0], 1.0).unwrap();
    assert_eq!(p.nnz(), 1);
    assert_eq!(c.nnz(), 2);
}
