//! Optimizers for updating model parameters between forward passes.

use crate::tensor::Tensor;

pub trait Optimizer {
    /// Clears the gradients of all parameters managed by the optimizer.
    fn zero_grad(&mut self);
    /// Updates the parameters based on their gradients.
    fn step(&mut self);
}

/// Plain stochastic gradient descent with per-tensor gradient-norm clipping.
pub struct Sgd {
    params: Vec<Tensor>,
    lr: f32,
    clip_norm: Option<f32>,
}

impl Sgd {
    pub fn new(params: Vec<Tensor>, lr: f32) -> Self {
        tracing::info!(lr, params = params.len(), "initializing SGD optimizer");
        Self {
            params,
            lr,
            clip_norm: Some(1.0),
        }
    }

    /// `None` disables clipping.
    pub fn with_clip_norm(mut self, clip_norm: Option<f32>) -> Self {
        self.clip_norm = clip_norm;
        self
    }
}

impl Optimizer for Sgd {
    fn zero_grad(&mut self) {
        for p in &self.params {
            p.zero_grad();
        }
    }

    fn step(&mut self) {
        for p in &self.params {
            if let (Some(clip), Some(grad)) = (self.clip_norm, p.grad()) {
                let norm = grad.data().iter().map(|&g| g * g).sum::<f32>().sqrt();
                if norm > clip {
                    let clipped = grad.data().mapv(|g| g * clip / norm);
                    p.set_grad(Tensor::from_data(clipped));
                }
            }
            p.update(self.lr);
        }
    }
}
