//! Batch normalization over the channel axis of NCHW feature maps.

use crate::error::{Error, Result};
use crate::nn::Module;
use crate::tensor::Tensor;
use ndarray::Axis;
use ndarray::arr0;
use std::cell::Cell;

pub struct BatchNorm2d {
    num_features: usize,
    eps: f32,
    momentum: f32,
    gamma: Tensor, // Learnable gain, [C]
    beta: Tensor,  // Learnable shift, [C]
    running_mean: Tensor,
    running_var: Tensor,
    // 0-d counter, stored as a tensor so it travels with the state dict.
    batches_tracked: Tensor,
    training: Cell<bool>,
}

impl BatchNorm2d {
    /// `eps = 1e-5`, `momentum = 0.1`, starting in training mode.
    pub fn new(num_features: usize) -> Result<Self> {
        Self::with_options(num_features, 1e-5, 0.1)
    }

    pub fn with_options(num_features: usize, eps: f32, momentum: f32) -> Result<Self> {
        if num_features == 0 {
            return Err(Error::InvalidConfig(
                "BatchNorm2d needs at least one feature".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&momentum) || !(eps > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "BatchNorm2d needs eps > 0 and momentum in [0, 1], got eps={eps} momentum={momentum}"
            )));
        }
        tracing::info!(num_features, eps, momentum, "initializing BatchNorm2d");
        Ok(Self {
            num_features,
            eps,
            momentum,
            gamma: Tensor::full(vec![num_features], 1.0),
            beta: Tensor::zeros(vec![num_features]),
            running_mean: Tensor::zeros(vec![num_features]),
            running_var: Tensor::full(vec![num_features], 1.0),
            batches_tracked: Tensor::zeros(Vec::new()),
            training: Cell::new(true),
        })
    }

    pub fn is_training(&self) -> bool {
        self.training.get()
    }

    pub fn running_mean(&self) -> &Tensor {
        &self.running_mean
    }

    pub fn running_var(&self) -> &Tensor {
        &self.running_var
    }

    pub fn batches_tracked(&self) -> u64 {
        self.batches_tracked.data().iter().next().map_or(0, |&v| v as u64)
    }

    /// Folds this batch's statistics into the running estimates.
    /// `running_var` tracks the unbiased variance.
    fn update_running_stats(&self, mean: &Tensor, var: &Tensor, count: usize) {
        let m = self.momentum;
        let correction = count as f32 / (count - 1) as f32;
        let batch_mean = mean.data().index_axis(Axis(1), 0).to_owned();
        let batch_var = var.data().index_axis(Axis(1), 0).mapv(|v| v * correction);

        let new_mean = &*self.running_mean.data() * (1.0 - m) + &(batch_mean * m);
        let new_var = &*self.running_var.data() * (1.0 - m) + &(batch_var * m);
        self.running_mean.set_data(new_mean);
        self.running_var.set_data(new_var);
        let tracked = self.batches_tracked() + 1;
        self.batches_tracked.set_data(arr0(tracked as f32).into_dyn());
    }
}

impl Module for BatchNorm2d {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let shape = input.shape();
        if shape.len() != 4 {
            return Err(Error::InvalidRank {
                op: "BatchNorm2d",
                expected: 4,
                got: shape,
            });
        }
        let (n, c, h, w) = (shape[0], shape[1], shape[2], shape[3]);
        if c != self.num_features {
            return Err(Error::ChannelMismatch {
                layer: "BatchNorm2d",
                expected: self.num_features,
                got: c,
            });
        }
        let count = n * h * w;

        // Per-channel statistics are taken over [C, N*H*W].
        let x = input.transpose(0, 1).reshape(vec![c, count])?;

        let (mean, var) = if self.training.get() {
            if count < 2 {
                return Err(Error::DegenerateBatch {
                    layer: "BatchNorm2d",
                    shape,
                });
            }
            let mean = x.mean_axis(1, true);
            let var = x.var_axis(1, true);
            self.update_running_stats(&mean, &var, count);
            (mean, var)
        } else {
            let as_column = |t: &Tensor| Tensor::from_data(t.data().clone().insert_axis(Axis(1)));
            (as_column(&self.running_mean), as_column(&self.running_var))
        };

        let normalized = (&x - &mean) / &(&var + self.eps).sqrt();
        let gamma = self.gamma.reshape(vec![c, 1])?;
        let beta = self.beta.reshape(vec![c, 1])?;
        let y = &(&normalized * &gamma) + &beta;

        Ok(y.reshape(vec![c, n, h, w])?.transpose(0, 1))
    }

    fn named_parameters(&self) -> Vec<(String, Tensor)> {
        vec![
            ("weight".to_string(), self.gamma.clone()),
            ("bias".to_string(), self.beta.clone()),
        ]
    }

    fn named_buffers(&self) -> Vec<(String, Tensor)> {
        vec![
            ("running_mean".to_string(), self.running_mean.clone()),
            ("running_var".to_string(), self.running_var.clone()),
            ("num_batches_tracked".to_string(), self.batches_tracked.clone()),
        ]
    }

    fn train(&self, mode: bool) {
        self.training.set(mode);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel_input() -> Tensor {
        // Channel 0 holds 1..=4, channel 1 holds 10 everywhere.
        Tensor::new(vec![1.0, 2.0, 10.0, 10.0, 3.0, 4.0, 10.0, 10.0], vec![2, 2, 1, 2]).unwrap()
    }

    #[test]
    fn training_output_is_zero_mean_unit_variance_per_channel() {
        let bn = BatchNorm2d::new(2).unwrap();
        let y = bn.forward(&channel_input()).unwrap();
        assert_eq!(y.shape(), vec![2, 2, 1, 2]);

        let data = y.data();
        let channel0: Vec<f32> = data.index_axis(Axis(1), 0).iter().copied().collect();
        let mean: f32 = channel0.iter().sum::<f32>() / 4.0;
        let var: f32 = channel0.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / 4.0;
        assert!(mean.abs() < 1e-5);
        assert!((var - 1.0).abs() < 1e-3);

        // A constant channel normalizes to zero.
        assert!(data.index_axis(Axis(1), 1).iter().all(|v| v.abs() < 1e-3));
    }

    #[test]
    fn training_updates_running_statistics_with_momentum() {
        let bn = BatchNorm2d::new(2).unwrap();
        bn.forward(&channel_input()).unwrap();

        let mean: Vec<f32> = bn.running_mean().data().iter().copied().collect();
        let var: Vec<f32> = bn.running_var().data().iter().copied().collect();
        // 0.9 * 0 + 0.1 * 2.5 and 0.9 * 0 + 0.1 * 10
        assert!((mean[0] - 0.25).abs() < 1e-6);
        assert!((mean[1] - 1.0).abs() < 1e-6);
        // Unbiased variance of 1..=4 is 5/3: 0.9 * 1 + 0.1 * 5/3
        assert!((var[0] - (0.9 + 0.1 * 5.0 / 3.0)).abs() < 1e-5);
        assert!((var[1] - 0.9).abs() < 1e-6);
        assert_eq!(bn.batches_tracked(), 1);
    }

    #[test]
    fn eval_mode_uses_running_statistics() {
        let bn = BatchNorm2d::new(2).unwrap();
        bn.train(false);
        let x = channel_input();
        let y = bn.forward(&x).unwrap();
        // Fresh statistics are mean 0 / var 1, so eval is nearly the identity.
        for (a, b) in x.data().iter().zip(y.data().iter()) {
            assert!((a / (1.0f32 + 1e-5).sqrt() - b).abs() < 1e-5);
        }
        assert_eq!(bn.batches_tracked(), 0);
    }

    #[test]
    fn batch_counter_is_a_scalar_buffer() {
        let bn = BatchNorm2d::new(2).unwrap();
        assert!(bn.is_training());
        bn.forward(&channel_input()).unwrap();
        bn.forward(&channel_input()).unwrap();

        let state = bn.state_dict();
        let tracked = &state["num_batches_tracked"];
        assert_eq!(tracked.ndim(), 0);
        assert_eq!(tracked.iter().copied().collect::<Vec<_>>(), vec![2.0]);

        let restored = BatchNorm2d::new(2).unwrap();
        restored.load_state_dict(&state).unwrap();
        assert_eq!(restored.batches_tracked(), 2);

        restored.train(false);
        assert!(!restored.is_training());
        restored.forward(&channel_input()).unwrap();
        assert_eq!(restored.batches_tracked(), 2);
    }

    #[test]
    fn training_rejects_single_value_per_channel() {
        let bn = BatchNorm2d::new(3).unwrap();
        assert!(matches!(
            bn.forward(&Tensor::rand(vec![1, 3, 1, 1])),
            Err(Error::DegenerateBatch { .. })
        ));
        bn.train(false);
        assert!(bn.forward(&Tensor::rand(vec![1, 3, 1, 1])).is_ok());
    }

    #[test]
    fn rejects_wrong_channel_count() {
        let bn = BatchNorm2d::new(4).unwrap();
        assert!(matches!(
            bn.forward(&Tensor::rand(vec![2, 3, 2, 2])),
            Err(Error::ChannelMismatch { expected: 4, got: 3, .. })
        ));
    }

    #[test]
    fn affine_parameters_receive_gradients() {
        let bn = BatchNorm2d::new(2).unwrap();
        bn.forward(&channel_input()).unwrap().sum().backward();
        let names: Vec<String> = bn.named_parameters().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["weight", "bias"]);
        for p in bn.parameters() {
            assert_eq!(p.grad().expect("parameter gradient").shape(), vec![2]);
        }
        // Buffers are never part of the graph.
        assert!(bn.running_mean().grad().is_none());
    }
}
