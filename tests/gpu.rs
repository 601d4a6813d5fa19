use ndarray::{Array, IxDyn};
use rusty_fuser::{gpu, ConvFuser, Fuser, Tensor};

fn values(t: &Tensor) -> Vec<f32> {
    t.data().iter().copied().collect()
}

fn assert_close(left: &[f32], right: &[f32]) {
    assert_eq!(left.len(), right.len());
    for (l, r) in left.iter().zip(right) {
        assert!((l - r).abs() < 1e-4, "{l} vs {r}");
    }
}

// This binary runs in its own process, so flipping the global switch does
// not leak into the unit tests.
#[test]
fn enabled_gpu_matches_cpu_with_or_without_adapter() {
    let a = Tensor::from_data(Array::from_shape_fn(IxDyn(&[6, 9]), |i| (i[0] * 9 + i[1]) as f32 * 0.1 - 2.0));
    let b = Tensor::from_data(Array::from_shape_fn(IxDyn(&[9, 40]), |i| ((i[0] + i[1]) % 4) as f32 - 1.5));
    let expected: Vec<f32> = {
        let a2 = a.data().clone().into_dimensionality::<ndarray::Ix2>().unwrap();
        let b2 = b.data().clone().into_dimensionality::<ndarray::Ix2>().unwrap();
        a2.dot(&b2).iter().copied().collect()
    };

    gpu::set_enabled(true);
    let product = a.matmul(&b).unwrap();
    assert_eq!(product.shape(), vec![6, 40]);
    assert_close(&values(&product), &expected);

    // The whole fuser still runs end to end with the switch on.
    let fuser = ConvFuser::new(vec![2, 3], 4).unwrap();
    let out = fuser
        .fuse(&[Tensor::rand(vec![1, 2, 3, 3]), Tensor::rand(vec![1, 3, 6, 6])])
        .unwrap();
    assert_eq!(out.shape(), vec![1, 4, 6, 6]);
    gpu::set_enabled(false);

    if gpu::GPU_CONTEXT.is_none() {
        assert_eq!(values(&product), expected);
    }
}
