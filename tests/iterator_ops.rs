//! Logical cursors, iterators and element proxies

use numlink::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[test]
fn begin_advanced_by_size_is_end_for_random_shapes() {
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..10 {
        let s = SparseArray::<f64, 1>::from_dims([rng.gen_range(1..30)], 0.0).unwrap();
        let mut c = s.begin();
        c.advance(s.size() as isize);
        assert_eq!(c, s.end());
    }
    for _ in 0..10 {
        let dims = [rng.gen_range(1..8), rng.gen_range(1..8), rng.gen_range(1..8)];
        let s = SparseArray::<f64, 3>::from_dims(dims, 0.0).unwrap();
        let mut c = s.begin();
        c.advance(s.size() as isize);
        assert_eq!(c, s.end());
        assert_eq!(s.end().distance_from(&s.begin()), s.size() as isize);
    }
}

#[test]
fn cursor_carries_across_levels() {
    let s = SparseArray::<i64, 3>::from_rules([2, 3, 4], &[([1, 2, 3], 5)], 0).unwrap();
    let mut c = s.begin();

    c.advance(23);
    assert_eq!(c.index(), [1, 2, 3]);
    assert_eq!(c.value(), 5);

    c.advance(-13);
    assert_eq!(c.index(), [0, 2, 2]);
    assert_eq!(c.value(), 0);

    let d = s.begin();
    assert_eq!(c.distance_from(&d), 10);
    c.advance(14);
    assert!(c.at_end());
}

#[test]
fn iteration_matches_densified_order() {
    let mut rng = StdRng::seed_from_u64(23);
    let dims = [3usize, 4];
    let data: Vec<f64> = (0..12)
        .map(|_| if rng.gen_bool(0.5) { 0.0 } else { rng.gen_range(1.0..9.0) })
        .collect();
    let dense = DenseArray::<f64, 2>::from_slice(dims, &data).unwrap();
    let sparse = SparseArray::from_dense(&dense, 0.0, None).unwrap();

    let walked: Vec<f64> = sparse.iter().collect();
    assert_eq!(walked, data);
    assert_eq!(sparse.iter().len(), 12);
}

#[test]
fn iterator_resolves_implicit_positions() {
    let s = SparseArray::<i64, 1>::from_rules([5], &[([1], 7), ([3], 8)], -1).unwrap();
    let got: Vec<i64> = s.iter().collect();
    assert_eq!(got, vec![-1, 7, -1, 8, -1]);
}

#[test]
fn entry_proxy_reads_and_reports_bounds() {
    let s = SparseArray::<f64, 2>::from_rules([2, 2], &[([0, 1], 2.5)], 0.0).unwrap();

    assert!(s.entry([1, 1]).in_bounds());
    assert!(s.entry([-2, -1]).in_bounds());
    assert!(!s.entry([2, 0]).in_bounds());

    assert_eq!(s.entry([0, 1]).get().unwrap(), 2.5);
    assert_eq!(s.entry([-2, -1]).get().unwrap(), 2.5);
    assert_eq!(s.entry([1, 1]).get().unwrap(), 0.0);
    assert!(s.entry([0, 2]).get().is_err());
}

#[test]
fn entry_proxy_write_dispatch() {
    let mut s = SparseArray::<f64, 2>::from_dims([2, 2], 0.0).unwrap();

    s.entry_mut([0, 0]).set(1.0).unwrap();
    s.entry_mut([1, 1]).set(2.0).unwrap();
    assert_eq!(s.nnz(), 2);

    // writing implicit through the proxy erases
    s.entry_mut([0, 0]).set(0.0).unwrap();
    assert_eq!(s.nnz(), 1);
    assert_eq!(s.get([1, 1]).unwrap(), 2.0);
}
