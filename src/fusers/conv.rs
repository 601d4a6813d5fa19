//! Convolutional camera/LiDAR fuser.

use crate::error::{Error, Result};
use crate::fusers::{check_inputs, Fuser, FuserConfig};
use crate::nn::conv::Conv2dConfig;
use crate::nn::{BatchNorm2d, Conv2d, Module, ReLU, Sequential};
use crate::tensor::Tensor;

/// Concatenates its inputs along the channel axis and applies
/// `Conv2d(3x3, padding 1, no bias) -> BatchNorm2d -> ReLU`.
///
/// Input 1 (usually the LiDAR BEV map) defines the output grid. Input 0
/// (usually the camera map) is bilinearly resampled onto that grid when its
/// spatial size differs. Any further inputs must already match.
pub struct ConvFuser {
    config: FuserConfig,
    pipeline: Sequential,
}

impl ConvFuser {
    /// Registry tag.
    pub const TYPE: &'static str = "ConvFuser";

    pub fn new(in_channels: Vec<usize>, out_channels: usize) -> Result<Self> {
        Self::from_config(&FuserConfig::new(Self::TYPE, in_channels, out_channels))
    }

    pub fn from_config(config: &FuserConfig) -> Result<Self> {
        config.validate()?;
        tracing::info!(
            in_channels = ?config.in_channels,
            out_channels = config.out_channels,
            "initializing ConvFuser"
        );

        let projection = Conv2dConfig::new(config.total_in_channels(), config.out_channels, 3)
            .with_padding(1)
            .with_bias(false);
        let pipeline = Sequential::new()
            .push(Conv2d::new(projection)?)
            .push(BatchNorm2d::new(config.out_channels)?)
            .push(ReLU::new(true));

        Ok(Self {
            config: config.clone(),
            pipeline,
        })
    }

    /// Registry constructor.
    pub fn build(config: &FuserConfig) -> Result<Box<dyn Fuser>> {
        Ok(Box::new(Self::from_config(config)?))
    }
}

fn spatial(shape: &[usize]) -> (usize, usize) {
    (shape[2], shape[3])
}

impl Fuser for ConvFuser {
    fn fuse(&self, inputs: &[Tensor]) -> Result<Tensor> {
        check_inputs(&self.config.in_channels, inputs)?;
        for (index, input) in inputs.iter().enumerate() {
            tracing::debug!(index, shape = ?input.shape(), "ConvFuser input");
        }

        let target = spatial(&inputs[1].shape());
        let mut aligned = inputs.to_vec();
        let source = spatial(&aligned[0].shape());
        if source != target {
            tracing::debug!(from = ?source, to = ?target, "resizing feature map 0");
            aligned[0] = aligned[0].interpolate_bilinear(target)?;
        }

        for (index, input) in aligned.iter().enumerate().skip(2) {
            let got = spatial(&input.shape());
            if got != target {
                return Err(Error::SpatialMismatch {
                    index,
                    expected: target,
                    got,
                });
            }
        }

        let stacked = Tensor::concat(&aligned, 1)?;
        self.pipeline.forward(&stacked)
    }

    fn in_channels(&self) -> &[usize] {
        &self.config.in_channels
    }

    fn out_channels(&self) -> usize {
        self.config.out_channels
    }

    fn transform(&self) -> &dyn Module {
        &self.pipeline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_has_projection_then_norm_parameters() {
        let fuser = ConvFuser::new(vec![4, 8], 16).unwrap();
        let names: Vec<String> = fuser
            .transform()
            .named_parameters()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["0.weight", "1.weight", "1.bias"]);
    }

    #[test]
    fn equal_grids_skip_resampling() {
        let fuser = ConvFuser::new(vec![2, 3], 4).unwrap();
        let out = fuser
            .fuse(&[Tensor::rand(vec![1, 2, 5, 6]), Tensor::rand(vec![1, 3, 5, 6])])
            .unwrap();
        assert_eq!(out.shape(), vec![1, 4, 5, 6]);
    }

    #[test]
    fn third_input_must_already_be_aligned() {
        let fuser = ConvFuser::new(vec![1, 1, 1], 2).unwrap();
        let inputs = [
            Tensor::rand(vec![1, 1, 2, 2]),
            Tensor::rand(vec![1, 1, 4, 4]),
            Tensor::rand(vec![1, 1, 3, 3]),
        ];
        assert!(matches!(
            fuser.fuse(&inputs),
            Err(Error::SpatialMismatch { index: 2, expected: (4, 4), got: (3, 3) })
        ));
    }

    #[test]
    fn output_is_non_negative() {
        let fuser = ConvFuser::new(vec![3, 3], 5).unwrap();
        let out = fuser
            .fuse(&[Tensor::uniform(vec![2, 3, 4, 4], 1.0), Tensor::uniform(vec![2, 3, 4, 4], 1.0)])
            .unwrap();
        assert!(out.data().iter().all(|&v| v >= 0.0));
    }
}
