//! Activation functions.

use crate::error::Result;
use crate::nn::Module;
use crate::tensor::Tensor;

/// `max(0, x)`. With `inplace` set the input tensor's storage is overwritten
/// and returned instead of allocating a new node.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReLU {
    inplace: bool,
}

impl ReLU {
    pub fn new(inplace: bool) -> Self {
        Self { inplace }
    }
}

impl Module for ReLU {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        if self.inplace {
            Ok(input.relu_().clone())
        } else {
            Ok(input.relu())
        }
    }

    fn named_parameters(&self) -> Vec<(String, Tensor)> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inplace_variant_reuses_the_input_node() {
        let x = Tensor::new(vec![-2.0, 0.5, 3.0, -0.1], vec![1, 1, 2, 2]).unwrap();
        let y = ReLU::new(true).forward(&x).unwrap();
        assert_eq!(y, x);
        assert_eq!(x.data().iter().copied().collect::<Vec<_>>(), vec![0.0, 0.5, 3.0, 0.0]);
    }

    #[test]
    fn out_of_place_variant_leaves_input_untouched() {
        let x = Tensor::new(vec![-2.0, 0.5], vec![2]).unwrap();
        let y = ReLU::new(false).forward(&x).unwrap();
        assert_ne!(y, x);
        assert_eq!(x.data().iter().copied().collect::<Vec<_>>(), vec![-2.0, 0.5]);
        assert_eq!(y.data().iter().copied().collect::<Vec<_>>(), vec![0.0, 0.5]);
    }
}
