//! Ordered composition of modules.

use crate::error::Result;
use crate::nn::Module;
use crate::tensor::Tensor;

/// Applies its stages one after another. Parameter and buffer names are
/// prefixed with the stage index (`"0.weight"`, `"1.running_mean"`, ...).
#[derive(Default)]
pub struct Sequential {
    stages: Vec<Box<dyn Module>>,
}

impl Sequential {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, stage: impl Module + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }
}

fn prefixed(index: usize, named: Vec<(String, Tensor)>) -> impl Iterator<Item = (String, Tensor)> {
    named
        .into_iter()
        .map(move |(name, t)| (format!("{index}.{name}"), t))
}

impl Module for Sequential {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let mut x = input.clone();
        for stage in &self.stages {
            x = stage.forward(&x)?;
        }
        Ok(x)
    }

    fn named_parameters(&self) -> Vec<(String, Tensor)> {
        self.stages
            .iter()
            .enumerate()
            .flat_map(|(i, s)| prefixed(i, s.named_parameters()))
            .collect()
    }

    fn named_buffers(&self) -> Vec<(String, Tensor)> {
        self.stages
            .iter()
            .enumerate()
            .flat_map(|(i, s)| prefixed(i, s.named_buffers()))
            .collect()
    }

    fn train(&self, mode: bool) {
        for stage in &self.stages {
            stage.train(mode);
        }
    }
}
