//! End-to-end invocations through the call adapter

use numlink::prelude::*;

#[test]
fn mutable_reference_arguments_write_back() {
    let host = MemHost::new();
    let handle = host.dense_from_f64(&[4], &[1.0, 2.0, 3.0, 4.0]);
    let ctx = CallContext::new(&host);

    let (status, ret) = ctx.invoke(&[HostArg::Dense(handle), HostArg::Real(2.0)], |_, reader| {
        let mut a: DenseArray<f64, 1> = reader.dense(PassMode::MutRef)?;
        let factor = reader.real()?;
        reader.finish()?;
        for v in a.as_mut_slice() {
            *v *= factor;
        }
        Ok(RetValue::Void)
    });
    assert_eq!(status, 0);
    assert_eq!(ret, Some(RetValue::Void));
    assert_eq!(host.read_f64(handle), vec![2.0, 4.0, 6.0, 8.0]);
    assert_eq!(host.dense_disowned(), 1);
}

#[test]
fn const_reference_argument_with_a_fresh_dense_result() {
    let host = MemHost::new();
    let handle = host.dense_from_i64(&[3], &[1, 2, 3]);
    let ctx = CallContext::new(&host);

    let (status, ret) = ctx.invoke(&[HostArg::Dense(handle)], |ctx, reader| {
        let a: DenseArray<i64, 1> = reader.dense(PassMode::ConstRef)?;
        reader.finish()?;
        let mut out = DenseArray::<i64, 1>::manual(ctx.host(), a.dims())?;
        for (o, &v) in out.as_mut_slice().iter_mut().zip(a.iter()) {
            *o = v + 10;
        }
        ctx.submit_dense(out)
    });
    assert_eq!(status, 0);
    let out = match ret {
        Some(RetValue::Dense(h)) => h,
        other => panic!("expected a dense result, got {other:?}"),
    };
    assert_eq!(host.read_i64(out), vec![11, 12, 13]);
    // the manual result transferred its handle instead of being freed
    assert_eq!(host.dense_freed(), 0);
    // the const-ref argument borrowed the input without copying or disowning
    assert_eq!(host.read_i64(handle), vec![1, 2, 3]);
    assert_eq!(host.dense_disowned(), 0);
}

#[test]
fn sparse_argument_and_sparse_result() {
    let host = MemHost::new();
    let input = SparseArray::<f64, 2>::from_rules(
        [3, 3],
        &[([0, 0], 1.0), ([1, 2], 2.0), ([2, 1], 3.0)],
        0.0,
    )
    .unwrap();
    let handle = input.to_handle(&host).unwrap();
    let ctx = CallContext::new(&host);

    let (status, ret) = ctx.invoke(&[HostArg::Sparse(handle)], |ctx, reader| {
        let mut s: SparseArray<f64, 2> = reader.sparse(PassMode::ConstRef)?;
        reader.finish()?;
        ctx.log(format!("scaling {} explicit entries", s.nnz()));
        s.transform(|v| v * 2.0, false)?;
        ctx.submit_sparse(&s)
    });
    assert_eq!(status, 0);
    assert_eq!(
        ctx.diagnostics(),
        vec!["scaling 3 explicit entries".to_string()]
    );

    let out = match ret {
        Some(RetValue::Sparse(h)) => h,
        other => panic!("expected a sparse result, got {other:?}"),
    };
    let result = SparseArray::<f64, 2>::from_handle(&host, out, AccessMode::Owned).unwrap();
    assert_eq!(result.get([1, 2]).unwrap(), 4.0);
    assert_eq!(result.get([2, 1]).unwrap(), 6.0);
    assert_eq!(result.nnz(), 3);
}

#[test]
fn by_value_argument_leaves_the_host_buffer_alone() {
    let host = MemHost::new();
    let handle = host.dense_from_f64(&[2], &[1.0, 2.0]);
    let ctx = CallContext::new(&host);

    let (status, _) = ctx.invoke(&[HostArg::Dense(handle)], |_, reader| {
        let mut a: DenseArray<f64, 1> = reader.dense(PassMode::Value)?;
        reader.finish()?;
        assert_eq!(a.access(), Access::Owned);
        *a.at_mut([0])? = 99.0;
        Ok(RetValue::Real(a.at([0])?))
    });
    assert_eq!(status, 0);
    assert_eq!(host.read_f64(handle), vec![1.0, 2.0]);
}

#[test]
fn errors_are_recorded_with_their_status() {
    let host = MemHost::new();
    let handle = host.dense_from_f64(&[2, 2], &[0.0; 4]);
    let ctx = CallContext::new(&host);

    // rank mismatch inside the call
    let (status, ret) = ctx.invoke(&[HostArg::Dense(handle)], |_, reader| {
        let _a: DenseArray<f64, 3> = reader.dense(PassMode::ConstRef)?;
        Ok(RetValue::Void)
    });
    assert_eq!(status, 2);
    assert!(ret.is_none());
    let (code, message) = ctx.last_error().unwrap();
    assert_eq!(code, 2);
    assert!(message.contains("rank"));

    // out-of-range indexing maps to the catch-all status
    let (status, _) = ctx.invoke(&[HostArg::Dense(handle)], |_, reader| {
        let a: DenseArray<f64, 2> = reader.dense(PassMode::ConstRef)?;
        Ok(RetValue::Real(a.at([5, 0])?))
    });
    assert_eq!(status, -1);

    // a successful call clears the slot
    let (status, _) = ctx.invoke(&[], |_, reader| {
        reader.finish()?;
        Ok(RetValue::Void)
    });
    assert_eq!(status, 0);
    assert_eq!(ctx.last_error(), None);
}

#[test]
fn scalar_marshaling_round_trip() {
    let host = MemHost::new();
    let ctx = CallContext::new(&host);
    let args = vec![
        HostArg::Boolean(true),
        HostArg::Integer(-3),
        HostArg::Real(2.5),
        HostArg::Complex(HostComplex::new(1.0, -1.0)),
        HostArg::String("triangular".to_string()),
    ];

    let (status, ret) = ctx.invoke(&args, |_, reader| {
        let flag = reader.boolean()?;
        let n = reader.integer()?;
        let x = reader.real()?;
        let z = reader.complex()?;
        let name = reader.string()?;
        reader.finish()?;
        assert!(flag);
        assert_eq!(z.im, -1.0);
        Ok(RetValue::String(format!("{name}:{n}:{x}")))
    });
    assert_eq!(status, 0);
    assert_eq!(ret, Some(RetValue::String("triangular:-3:2.5".to_string())));
}

#[test]
fn abort_predicate_is_visible_to_callees() {
    let host = MemHost::new();
    let ctx = CallContext::new(&host);
    assert!(!ctx.aborted());
    host.set_abort(true);
    assert!(ctx.aborted());
}
