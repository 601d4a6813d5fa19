pub mod activation;
pub mod batch_norm;
pub mod conv;
pub mod sequential;

pub use activation::ReLU;
pub use batch_norm::BatchNorm2d;
pub use conv::Conv2d;
pub use sequential::Sequential;

use crate::error::{Error, Result};
use crate::tensor::Tensor;
use ndarray::ArrayD;
use std::collections::BTreeMap;

/// Named parameters and buffers of a module, detached from the graph.
pub type StateDict = BTreeMap<String, ArrayD<f32>>;

/// A trait for a neural network module.
pub trait Module {
    /// Performs a forward pass on the module.
    fn forward(&self, input: &Tensor) -> Result<Tensor>;

    /// Learnable parameters, paired with their names.
    fn named_parameters(&self) -> Vec<(String, Tensor)>;

    /// Non-learnable state such as running statistics.
    fn named_buffers(&self) -> Vec<(String, Tensor)> {
        Vec::new()
    }

    /// Switches between training and evaluation behaviour.
    fn train(&self, _mode: bool) {}

    /// Returns a vector of all learnable parameters in the module.
    fn parameters(&self) -> Vec<Tensor> {
        self.named_parameters().into_iter().map(|(_, p)| p).collect()
    }

    /// Zeros out the gradients for all parameters in the module.
    fn zero_grad(&self) {
        for p in self.parameters() {
            p.zero_grad();
        }
    }

    fn state_dict(&self) -> StateDict {
        self.named_parameters()
            .into_iter()
            .chain(self.named_buffers())
            .map(|(name, t)| {
                let data = t.data().clone();
                (name, data)
            })
            .collect()
    }

    /// Copies values from `state` into this module's parameters and buffers.
    /// Every entry the module owns must be present with a matching shape.
    fn load_state_dict(&self, state: &StateDict) -> Result<()> {
        let entries: Vec<_> = self
            .named_parameters()
            .into_iter()
            .chain(self.named_buffers())
            .collect();
        for (name, tensor) in &entries {
            let value = state
                .get(name)
                .ok_or_else(|| Error::MissingState(name.clone()))?;
            if value.shape() != tensor.shape().as_slice() {
                return Err(Error::StateShape {
                    name: name.clone(),
                    expected: tensor.shape(),
                    got: value.shape().to_vec(),
                });
            }
        }
        for (name, tensor) in entries {
            if let Some(value) = state.get(&name) {
                tensor.set_data(value.clone());
            }
        }
        Ok(())
    }
}
