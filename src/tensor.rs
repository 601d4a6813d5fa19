//! A Tensor with autograd capabilities.

mod spatial;

use crate::error::{Error, Result};
use crate::gpu;
use ndarray::{Array, Array2, ArrayD, ArrayView2, Axis, Ix2, IxDyn};
use rand::distributions::{Distribution, Uniform};
use std::cell::{Ref, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Add, Div, Mul, Sub};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Nanoseconds spent in CPU matmul, summed across the process.
pub static CPU_MATMUL_TIME_NS: AtomicU64 = AtomicU64::new(0);

type BackwardOp = Rc<dyn Fn(&Tensor)>;

/// Holds the actual tensor data, its gradient, and graph information.
#[derive(Default)]
pub struct TensorData {
    pub data: ArrayD<f32>,
    pub grad: Option<Tensor>,
    _backward: Option<BackwardOp>,
    _prev: Vec<Tensor>,
}

impl fmt::Debug for TensorData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TensorData")
            .field("shape", &self.data.shape())
            .field("has_grad", &self.grad.is_some())
            .field(
                "_backward",
                &self._backward.as_ref().map(|_| "BackwardOp"),
            )
            .field("_prev", &self._prev.len())
            .finish()
    }
}

/// The public Tensor struct, a shared handle to the underlying data.
/// Cloning a Tensor is cheap as it only copies the Rc pointer.
#[derive(Debug, Clone)]
pub struct Tensor {
    pub inner: Rc<RefCell<TensorData>>,
}

// Identity is pointer identity; the topological sort in `backward` relies on it.
impl PartialEq for Tensor {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}
impl Eq for Tensor {}
impl Hash for Tensor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self.inner.as_ptr()).hash(state);
    }
}

pub(crate) fn view_2d<'a>(
    op: &'static str,
    data: &'a ArrayD<f32>,
) -> Result<ArrayView2<'a, f32>> {
    data.view()
        .into_dimensionality::<Ix2>()
        .map_err(|_| Error::InvalidRank {
            op,
            expected: 2,
            got: data.shape().to_vec(),
        })
}

impl Tensor {
    /// Creates a new tensor from raw data and a shape. This creates a leaf node in the graph.
    pub fn new(data: Vec<f32>, shape: Vec<usize>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        let got = data.len();
        let data = Array::from_shape_vec(IxDyn(&shape), data).map_err(|_| Error::ShapeMismatch {
            op: "new",
            left: vec![got],
            right: vec![expected],
        })?;
        Ok(Self::from_data(data))
    }

    /// Creates a tensor from an existing ndarray::ArrayD. This creates a leaf node.
    pub fn from_data(data: ArrayD<f32>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(TensorData {
                data,
                ..Default::default()
            })),
        }
    }

    pub fn zeros(shape: Vec<usize>) -> Self {
        Self::from_data(Array::zeros(IxDyn(&shape)))
    }

    pub fn full(shape: Vec<usize>, value: f32) -> Self {
        Self::from_data(Array::from_elem(IxDyn(&shape), value))
    }

    pub fn ones_like(tensor: &Tensor) -> Self {
        Self::from_data(Array::ones(IxDyn(&tensor.shape())))
    }

    /// Samples every element uniformly from `[-bound, bound)`.
    pub fn uniform(shape: Vec<usize>, bound: f32) -> Self {
        let mut rng = rand::thread_rng();
        let dist = Uniform::new(-bound, bound);
        Self::from_data(Array::from_shape_simple_fn(IxDyn(&shape), || {
            dist.sample(&mut rng)
        }))
    }

    /// Small random values, suitable for synthetic feature maps.
    pub fn rand(shape: Vec<usize>) -> Self {
        Self::uniform(shape, 0.02)
    }

    // --- Accessors ---
    pub fn shape(&self) -> Vec<usize> {
        self.inner.borrow().data.shape().to_vec()
    }
    pub fn data(&self) -> Ref<'_, ArrayD<f32>> {
        Ref::map(self.inner.borrow(), |d| &d.data)
    }
    /// Replaces the stored values without touching the graph. Used for
    /// running statistics and when restoring saved state.
    pub fn set_data(&self, data: ArrayD<f32>) {
        self.inner.borrow_mut().data = data;
    }
    pub fn grad(&self) -> Option<Tensor> {
        self.inner.borrow().grad.clone()
    }
    pub fn set_grad(&self, grad: Tensor) {
        self.inner.borrow_mut().grad = Some(grad);
    }
    fn add_grad(&self, grad: Tensor) {
        let mut inner = self.inner.borrow_mut();
        if let Some(existing_grad) = inner.grad.take() {
            let new_grad_data = &*existing_grad.data() + &*grad.data();
            inner.grad = Some(Tensor::from_data(new_grad_data));
        } else {
            inner.grad = Some(grad);
        }
    }

    /// Wires a freshly computed tensor into the graph.
    fn with_backward(self, prev: Vec<Tensor>, backward: impl Fn(&Tensor) + 'static) -> Tensor {
        {
            let mut inner = self.inner.borrow_mut();
            inner._prev = prev;
            inner._backward = Some(Rc::new(backward));
        }
        self
    }

    // --- Autograd and Optimizer Methods ---

    /// Kicks off the backpropagation process from this tensor.
    pub fn backward(&self) {
        let mut topo: Vec<Tensor> = Vec::new();
        let mut visited: HashSet<Tensor> = HashSet::new();
        fn build_topo(node: &Tensor, visited: &mut HashSet<Tensor>, topo: &mut Vec<Tensor>) {
            if !visited.contains(node) {
                visited.insert(node.clone());
                for child in &node.inner.borrow()._prev {
                    build_topo(child, visited, topo);
                }
                topo.push(node.clone());
            }
        }
        build_topo(self, &mut visited, &mut topo);

        self.set_grad(Tensor::ones_like(self));

        // Walk in reverse topological order, then drop each intermediate node's
        // edges so Rc cycles through the closures are broken.
        for node in topo.iter().rev() {
            let backward_fn = node.inner.borrow()._backward.clone();
            if let Some(backward_fn) = backward_fn {
                if let Some(grad) = node.grad() {
                    backward_fn(&grad);
                }
                let mut inner = node.inner.borrow_mut();
                inner._prev.clear();
                inner._backward = None;
                inner.grad = None;
            }
        }
    }

    pub fn zero_grad(&self) {
        self.inner.borrow_mut().grad = None;
    }

    /// Takes one gradient step: `data -= lr * grad`.
    pub fn update(&self, lr: f32) {
        let grad_opt = self.inner.borrow().grad.clone();
        if let Some(grad) = grad_opt {
            let update_data = &*grad.data() * lr;
            let mut inner = self.inner.borrow_mut();
            inner.data = &inner.data - &update_data;
        }
    }

    /// Returns a leaf copy of the values with no graph attached.
    pub fn detach(&self) -> Tensor {
        Tensor::from_data(self.data().clone())
    }

    // --- Graph-aware Operations ---

    pub fn relu(&self) -> Tensor {
        let out_data = self.data().mapv(|x| x.max(0.0));
        let self_clone = self.clone();
        Tensor::from_data(out_data).with_backward(vec![self.clone()], move |grad: &Tensor| {
            let relu_grad = {
                let self_data = self_clone.data();
                self_data.mapv(|x| if x > 0.0 { 1.0 } else { 0.0 })
            };
            self_clone.add_grad(Tensor::from_data(&*grad.data() * &relu_grad));
        })
    }

    /// ReLU that overwrites this tensor's storage.
    ///
    /// The node keeps its identity, so the gradient mask is chained in front
    /// of whatever backward op produced it. On a leaf only the values change.
    pub fn relu_(&self) -> &Tensor {
        let mut inner = self.inner.borrow_mut();
        inner.data.mapv_inplace(|x| x.max(0.0));
        if let Some(upstream) = inner._backward.take() {
            let node = Rc::downgrade(&self.inner);
            inner._backward = Some(Rc::new(move |grad: &Tensor| {
                if let Some(node) = node.upgrade() {
                    let masked = {
                        let node = node.borrow();
                        let mask = node.data.mapv(|x| if x > 0.0 { 1.0 } else { 0.0 });
                        &*grad.data() * &mask
                    };
                    upstream(&Tensor::from_data(masked));
                }
            }));
        }
        drop(inner);
        self
    }

    pub fn sqrt(&self) -> Tensor {
        let out_data = self.data().mapv(f32::sqrt);
        let self_clone = self.clone();
        let out = Tensor::from_data(out_data);
        let out_weak = Rc::downgrade(&out.inner);
        out.with_backward(vec![self.clone()], move |grad: &Tensor| {
            if let Some(out_rc) = out_weak.upgrade() {
                // d(sqrt(x))/dx = 1 / (2 * sqrt(x))
                let grad_data = &*grad.data() / &(&out_rc.borrow().data * 2.0);
                self_clone.add_grad(Tensor::from_data(grad_data));
            }
        })
    }

    /// Sums all elements in the tensor, returning a one-element tensor.
    pub fn sum(&self) -> Tensor {
        let out_data = self.data().sum();
        let self_clone = self.clone();
        let self_shape = self.shape();
        Tensor::from_data(ArrayD::from_elem(IxDyn(&[1]), out_data)).with_backward(
            vec![self.clone()],
            move |grad: &Tensor| {
                let grad_val = grad.data().iter().next().copied().unwrap_or(0.0);
                self_clone.add_grad(Tensor::full(self_shape.clone(), grad_val));
            },
        )
    }

    pub fn sum_axis(&self, axis: usize, keep_dims: bool) -> Tensor {
        let ax = Axis(axis);
        let out_data = if keep_dims {
            self.data().sum_axis(ax).insert_axis(ax)
        } else {
            self.data().sum_axis(ax)
        };
        let self_clone = self.clone();
        let self_shape = self.shape();
        Tensor::from_data(out_data).with_backward(vec![self.clone()], move |grad: &Tensor| {
            let grad_data = if keep_dims {
                grad.data().clone()
            } else {
                grad.data().clone().insert_axis(ax)
            };
            if let Some(broadcasted) = grad_data.broadcast(IxDyn(&self_shape)) {
                self_clone.add_grad(Tensor::from_data(broadcasted.to_owned()));
            }
        })
    }

    pub fn mean_axis(&self, axis: usize, keep_dims: bool) -> Tensor {
        let n = self.shape()[axis] as f32;
        self.sum_axis(axis, keep_dims) / n
    }

    pub fn mean(&self) -> Tensor {
        let n = self.data().len() as f32;
        self.sum() / n
    }

    /// Biased (population) variance along an axis.
    pub fn var_axis(&self, axis: usize, keep_dims: bool) -> Tensor {
        let mean = self.mean_axis(axis, true);
        let x_minus_mean = self - &mean;
        let x_minus_mean_sq = &x_minus_mean * &x_minus_mean;
        x_minus_mean_sq.mean_axis(axis, keep_dims)
    }

    /// 2-D matrix multiplication. Runs on the GPU when it is enabled and
    /// available, falling back to ndarray otherwise.
    pub fn matmul(&self, other: &Tensor) -> Result<Tensor> {
        let out_data = {
            let a_data = self.data();
            let b_data = other.data();
            let a = view_2d("matmul", &a_data)?;
            let b = view_2d("matmul", &b_data)?;
            if a.ncols() != b.nrows() {
                return Err(Error::ShapeMismatch {
                    op: "matmul",
                    left: a.shape().to_vec(),
                    right: b.shape().to_vec(),
                });
            }
            matmul_2d(a, b).into_dyn()
        };

        let self_clone = self.clone();
        let other_clone = other.clone();
        Ok(Tensor::from_data(out_data).with_backward(
            vec![self.clone(), other.clone()],
            move |grad: &Tensor| {
                let (grad_a, grad_b) = {
                    let g = grad.data();
                    let a = self_clone.data();
                    let b = other_clone.data();
                    match (view_2d("matmul", &g), view_2d("matmul", &a), view_2d("matmul", &b)) {
                        (Ok(g), Ok(a), Ok(b)) => (g.dot(&b.t()), a.t().dot(&g)),
                        _ => return,
                    }
                };
                self_clone.add_grad(Tensor::from_data(grad_a.into_dyn()));
                other_clone.add_grad(Tensor::from_data(grad_b.into_dyn()));
            },
        ))
    }

    /// Reshapes the tensor, copying into standard layout first when needed.
    pub fn reshape(&self, new_shape: Vec<usize>) -> Result<Tensor> {
        let original_shape = self.shape();
        let reshaped_data = self
            .data()
            .as_standard_layout()
            .into_owned()
            .into_shape(IxDyn(&new_shape))
            .map_err(|_| Error::ShapeMismatch {
                op: "reshape",
                left: original_shape.clone(),
                right: new_shape.clone(),
            })?;

        let self_clone = self.clone();
        Ok(Tensor::from_data(reshaped_data).with_backward(
            vec![self.clone()],
            move |grad: &Tensor| {
                let grad_reshaped = grad
                    .data()
                    .as_standard_layout()
                    .into_owned()
                    .into_shape(IxDyn(&original_shape));
                if let Ok(grad_reshaped) = grad_reshaped {
                    self_clone.add_grad(Tensor::from_data(grad_reshaped));
                }
            },
        ))
    }

    /// Swaps two axes of the tensor.
    pub fn transpose(&self, axis1: usize, axis2: usize) -> Tensor {
        let out_data = {
            let data_ref = self.data();
            let mut view = data_ref.view();
            view.swap_axes(axis1, axis2);
            view.as_standard_layout().into_owned()
        };
        let self_clone = self.clone();
        Tensor::from_data(out_data).with_backward(vec![self.clone()], move |grad: &Tensor| {
            let grad_data = {
                let grad_ref = grad.data();
                let mut grad_view = grad_ref.view();
                grad_view.swap_axes(axis1, axis2);
                grad_view.as_standard_layout().into_owned()
            };
            self_clone.add_grad(Tensor::from_data(grad_data));
        })
    }
}

fn matmul_2d(a: ArrayView2<'_, f32>, b: ArrayView2<'_, f32>) -> Array2<f32> {
    if gpu::USE_GPU.load(Ordering::Relaxed) {
        if let Some(context) = &*gpu::GPU_CONTEXT {
            match gpu::matmul(context, a, b) {
                Ok(out) => return out,
                Err(e) => tracing::warn!(
                    lhs = ?a.shape(),
                    rhs = ?b.shape(),
                    error = %e,
                    "GPU matmul failed, falling back to CPU"
                ),
            }
        }
    }
    let start = std::time::Instant::now();
    let out = a.dot(&b);
    CPU_MATMUL_TIME_NS.fetch_add(start.elapsed().as_nanos() as u64, Ordering::Relaxed);
    out
}

// --- Operator Overloads ---

/// Sums a broadcast gradient back down to the shape of the operand it flows into.
fn sum_grad_to_shape(grad_data: ArrayD<f32>, target_shape: &[usize]) -> ArrayD<f32> {
    let grad_shape = grad_data.shape().to_vec();
    if grad_shape == target_shape {
        return grad_data;
    }

    let mut summed_grad = grad_data;
    let mut axes_to_sum = Vec::new();

    let grad_ndim = grad_shape.len();
    let target_ndim = target_shape.len();
    let offset = grad_ndim.saturating_sub(target_ndim);

    // Prepended axes (e.g. the batch axis for a per-channel parameter).
    axes_to_sum.extend(0..offset);

    // Axes where the target had extent 1.
    for (i, &dim) in target_shape.iter().enumerate() {
        if dim == 1 && grad_shape[i + offset] > 1 {
            axes_to_sum.push(i + offset);
        }
    }

    for &axis in axes_to_sum.iter().rev() {
        summed_grad = summed_grad.sum_axis(Axis(axis));
    }

    let summed_grad_shape = summed_grad.shape().to_vec();
    summed_grad
        .as_standard_layout()
        .into_owned()
        .into_shape(IxDyn(target_shape))
        .unwrap_or_else(|e| {
            panic!(
                "Failed to reshape summed grad from {:?} to {:?}: {}",
                summed_grad_shape, target_shape, e
            )
        })
}

impl Add for &Tensor {
    type Output = Tensor;
    fn add(self, rhs: &Tensor) -> Self::Output {
        let out_data = &*self.data() + &*rhs.data();
        let self_clone = self.clone();
        let rhs_clone = rhs.clone();
        Tensor::from_data(out_data).with_backward(
            vec![self.clone(), rhs.clone()],
            move |grad: &Tensor| {
                let grad_for_self = sum_grad_to_shape(grad.data().clone(), &self_clone.shape());
                self_clone.add_grad(Tensor::from_data(grad_for_self));
                let grad_for_rhs = sum_grad_to_shape(grad.data().clone(), &rhs_clone.shape());
                rhs_clone.add_grad(Tensor::from_data(grad_for_rhs));
            },
        )
    }
}
impl<'a> Add<&'a Tensor> for Tensor { type Output = Tensor; fn add(self, rhs: &'a Tensor) -> Tensor { &self + rhs } }
impl Add<f32> for &Tensor {
    type Output = Tensor;
    fn add(self, rhs: f32) -> Self::Output {
        let out_data = &*self.data() + rhs;
        let self_clone = self.clone();
        Tensor::from_data(out_data).with_backward(vec![self.clone()], move |grad: &Tensor| {
            self_clone.add_grad(grad.detach());
        })
    }
}
impl Add<f32> for Tensor { type Output = Tensor; fn add(self, rhs: f32) -> Tensor { &self + rhs } }

impl Sub for &Tensor {
    type Output = Tensor;
    fn sub(self, rhs: &Tensor) -> Self::Output {
        let out_data = &*self.data() - &*rhs.data();
        let self_clone = self.clone();
        let rhs_clone = rhs.clone();
        Tensor::from_data(out_data).with_backward(
            vec![self.clone(), rhs.clone()],
            move |grad: &Tensor| {
                let grad_for_self = sum_grad_to_shape(grad.data().clone(), &self_clone.shape());
                self_clone.add_grad(Tensor::from_data(grad_for_self));
                let neg_grad = &*grad.data() * -1.0;
                let grad_for_rhs = sum_grad_to_shape(neg_grad, &rhs_clone.shape());
                rhs_clone.add_grad(Tensor::from_data(grad_for_rhs));
            },
        )
    }
}
impl<'a> Sub<&'a Tensor> for Tensor { type Output = Tensor; fn sub(self, rhs: &'a Tensor) -> Tensor { &self - rhs } }

impl Mul for &Tensor {
    type Output = Tensor;
    fn mul(self, rhs: &Tensor) -> Self::Output {
        let out_data = &*self.data() * &*rhs.data();
        let self_clone = self.clone();
        let rhs_clone = rhs.clone();
        Tensor::from_data(out_data).with_backward(
            vec![self.clone(), rhs.clone()],
            move |grad: &Tensor| {
                let grad_for_self = { &*grad.data() * &*rhs_clone.data() };
                self_clone.add_grad(Tensor::from_data(sum_grad_to_shape(
                    grad_for_self,
                    &self_clone.shape(),
                )));
                let grad_for_rhs = { &*grad.data() * &*self_clone.data() };
                rhs_clone.add_grad(Tensor::from_data(sum_grad_to_shape(
                    grad_for_rhs,
                    &rhs_clone.shape(),
                )));
            },
        )
    }
}
impl<'a> Mul<&'a Tensor> for Tensor { type Output = Tensor; fn mul(self, rhs: &'a Tensor) -> Tensor { &self * rhs } }

impl Div for &Tensor {
    type Output = Tensor;
    fn div(self, rhs: &Tensor) -> Self::Output {
        let out_data = &*self.data() / &*rhs.data();
        let self_clone = self.clone();
        let rhs_clone = rhs.clone();
        Tensor::from_data(out_data).with_backward(
            vec![self.clone(), rhs.clone()],
            move |grad: &Tensor| {
                let grad_for_self = { &*grad.data() / &*rhs_clone.data() };
                self_clone.add_grad(Tensor::from_data(sum_grad_to_shape(
                    grad_for_self,
                    &self_clone.shape(),
                )));
                let grad_for_rhs = {
                    let rhs_d = rhs_clone.data();
                    &*grad.data() * &(-&*self_clone.data() / &(&*rhs_d * &*rhs_d))
                };
                rhs_clone.add_grad(Tensor::from_data(sum_grad_to_shape(
                    grad_for_rhs,
                    &rhs_clone.shape(),
                )));
            },
        )
    }
}
impl<'a> Div<&'a Tensor> for Tensor { type Output = Tensor; fn div(self, rhs: &'a Tensor) -> Tensor { &self / rhs } }
impl Div<f32> for &Tensor {
    type Output = Tensor;
    fn div(self, rhs: f32) -> Self::Output {
        let out_data = &*self.data() / rhs;
        let self_clone = self.clone();
        Tensor::from_data(out_data).with_backward(vec![self.clone()], move |grad: &Tensor| {
            self_clone.add_grad(Tensor::from_data(&*grad.data() / rhs));
        })
    }
}
impl Div<f32> for Tensor { type Output = Tensor; fn div(self, rhs: f32) -> Tensor { &self / rhs } }

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tensor(shape: {:?})\n{}", self.shape(), self.data())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_wrong_length() {
        assert!(matches!(
            Tensor::new(vec![1.0, 2.0, 3.0], vec![2, 2]),
            Err(Error::ShapeMismatch { op: "new", .. })
        ));
    }

    #[test]
    fn matmul_matches_hand_computation() {
        let a = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]).unwrap();
        let b = Tensor::new(vec![5.0, 6.0, 7.0, 8.0], vec![2, 2]).unwrap();
        let c = a.matmul(&b).unwrap();
        assert_eq!(c.data().iter().copied().collect::<Vec<_>>(), vec![19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn matmul_rejects_inner_dimension_mismatch() {
        let a = Tensor::zeros(vec![2, 3]);
        let b = Tensor::zeros(vec![2, 3]);
        assert!(matches!(a.matmul(&b), Err(Error::ShapeMismatch { op: "matmul", .. })));
    }

    #[test]
    fn matmul_backward_produces_transposed_products() {
        let a = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]).unwrap();
        let b = Tensor::new(vec![1.0, 0.0, 0.0, 1.0], vec![2, 2]).unwrap();
        a.matmul(&b).unwrap().sum().backward();
        // d(sum(AB))/dA = 1 * B^T
        let grad_a = a.grad().unwrap();
        assert_eq!(grad_a.data().iter().copied().collect::<Vec<_>>(), vec![1.0, 1.0, 1.0, 1.0]);
        let grad_b = b.grad().unwrap();
        assert_eq!(grad_b.data().iter().copied().collect::<Vec<_>>(), vec![4.0, 4.0, 6.0, 6.0]);
    }

    #[test]
    fn broadcast_add_sums_gradient_back() {
        let x = Tensor::zeros(vec![3, 4]);
        let bias = Tensor::zeros(vec![3, 1]);
        (&x + &bias).sum().backward();
        let grad = bias.grad().unwrap();
        assert_eq!(grad.shape(), vec![3, 1]);
        assert!(grad.data().iter().all(|&g| g == 4.0));
    }

    #[test]
    fn relu_in_place_masks_upstream_gradient() {
        let x = Tensor::new(vec![-1.0, 2.0, -3.0, 4.0], vec![4]).unwrap();
        let y = &x * &Tensor::full(vec![4], 1.0);
        y.relu_();
        assert_eq!(y.data().iter().copied().collect::<Vec<_>>(), vec![0.0, 2.0, 0.0, 4.0]);
        y.sum().backward();
        let grad = x.grad().unwrap();
        assert_eq!(grad.data().iter().copied().collect::<Vec<_>>(), vec![0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn transpose_then_reshape_keeps_logical_order() {
        let x = Tensor::new((0..6).map(|v| v as f32).collect(), vec![2, 3]).unwrap();
        let t = x.transpose(0, 1).reshape(vec![6]).unwrap();
        assert_eq!(
            t.data().iter().copied().collect::<Vec<_>>(),
            vec![0.0, 3.0, 1.0, 4.0, 2.0, 5.0]
        );
    }

    #[test]
    fn var_axis_is_biased() {
        let x = Tensor::new(vec![1.0, 3.0], vec![1, 2]).unwrap();
        let v = x.var_axis(1, false);
        assert_eq!(v.data().iter().copied().collect::<Vec<_>>(), vec![1.0]);
    }
}
