//! 2-D convolution over NCHW feature maps.

use crate::error::{Error, Result};
use crate::nn::Module;
use crate::tensor::Tensor;

/// Hyper-parameters of a [`Conv2d`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conv2dConfig {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel_size: usize,
    pub stride: usize,
    pub padding: usize,
    pub bias: bool,
}

impl Conv2dConfig {
    pub fn new(in_channels: usize, out_channels: usize, kernel_size: usize) -> Self {
        Self {
            in_channels,
            out_channels,
            kernel_size,
            stride: 1,
            padding: 0,
            bias: true,
        }
    }

    pub fn with_padding(mut self, padding: usize) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    pub fn with_bias(mut self, bias: bool) -> Self {
        self.bias = bias;
        self
    }
}

/// Square-kernel convolution, computed as an unfold followed by one GEMM.
pub struct Conv2d {
    config: Conv2dConfig,
    weight: Tensor,
    bias: Option<Tensor>,
}

impl Conv2d {
    pub fn new(config: Conv2dConfig) -> Result<Self> {
        let Conv2dConfig {
            in_channels,
            out_channels,
            kernel_size,
            stride,
            ..
        } = config;
        if in_channels == 0 || out_channels == 0 || kernel_size == 0 || stride == 0 {
            return Err(Error::InvalidConfig(format!(
                "Conv2d needs positive sizes, got {config:?}"
            )));
        }
        tracing::info!(
            in_channels,
            out_channels,
            kernel_size,
            padding = config.padding,
            bias = config.bias,
            "initializing Conv2d"
        );

        // Same bound as a Kaiming-uniform init with a = sqrt(5).
        let fan_in = in_channels * kernel_size * kernel_size;
        let bound = 1.0 / (fan_in as f32).sqrt();
        let weight = Tensor::uniform(vec![out_channels, in_channels, kernel_size, kernel_size], bound);
        let bias = config
            .bias
            .then(|| Tensor::uniform(vec![1, out_channels, 1, 1], bound));

        Ok(Self {
            config,
            weight,
            bias,
        })
    }

    pub fn in_channels(&self) -> usize {
        self.config.in_channels
    }

    pub fn out_channels(&self) -> usize {
        self.config.out_channels
    }

    pub fn weight(&self) -> &Tensor {
        &self.weight
    }
}

impl Module for Conv2d {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let shape = input.shape();
        if shape.len() != 4 {
            return Err(Error::InvalidRank {
                op: "Conv2d",
                expected: 4,
                got: shape,
            });
        }
        if shape[1] != self.in_channels() {
            return Err(Error::ChannelMismatch {
                layer: "Conv2d",
                expected: self.in_channels(),
                got: shape[1],
            });
        }

        let Conv2dConfig {
            in_channels,
            out_channels,
            kernel_size: k,
            stride,
            padding,
            ..
        } = self.config;

        // [C*k*k, N*Ho*Wo]
        let cols = input.unfold(k, stride, padding)?;
        let n = shape[0];
        let h_out = (shape[2] + 2 * padding - k) / stride + 1;
        let w_out = (shape[3] + 2 * padding - k) / stride + 1;

        // [Cout, C*k*k] x [C*k*k, N*Ho*Wo] -> [Cout, N, Ho, Wo] -> [N, Cout, Ho, Wo]
        let kernel = self.weight.reshape(vec![out_channels, in_channels * k * k])?;
        let out = kernel
            .matmul(&cols)?
            .reshape(vec![out_channels, n, h_out, w_out])?
            .transpose(0, 1);

        Ok(match &self.bias {
            Some(bias) => &out + bias,
            None => out,
        })
    }

    fn named_parameters(&self) -> Vec<(String, Tensor)> {
        let mut params = vec![("weight".to_string(), self.weight.clone())];
        if let Some(bias) = &self.bias {
            params.push(("bias".to_string(), bias.clone()));
        }
        params
    }
}
