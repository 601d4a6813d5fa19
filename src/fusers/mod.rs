//! Multi-modal feature fusers.
//!
//! A fuser takes one feature map per sensor modality, brings them onto a
//! common spatial grid, and maps the stacked channels through a learned
//! transform. Fusers are built from a [`FuserConfig`], usually through a
//! [`FuserRegistry`](crate::registry::FuserRegistry).

pub mod conv;

pub use conv::ConvFuser;

use crate::error::{Error, Result};
use crate::nn::Module;
use crate::tensor::Tensor;
use serde::{Deserialize, Serialize};

/// Construction-time settings for a fuser, as they appear in a model config:
///
/// ```toml
/// type = "ConvFuser"
/// in_channels = [80, 256]
/// out_channels = 256
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuserConfig {
    /// Registry tag selecting the implementation.
    #[serde(rename = "type")]
    pub kind: String,
    /// Channel count of each input, in input order.
    pub in_channels: Vec<usize>,
    pub out_channels: usize,
}

impl FuserConfig {
    pub fn new(kind: impl Into<String>, in_channels: Vec<usize>, out_channels: usize) -> Self {
        Self {
            kind: kind.into(),
            in_channels,
            out_channels,
        }
    }

    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    pub fn from_json_str(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }

    /// Width of the concatenated input the transform expects.
    pub fn total_in_channels(&self) -> usize {
        self.in_channels.iter().sum()
    }

    /// At least two inputs, and every channel count positive.
    pub fn validate(&self) -> Result<()> {
        if self.in_channels.len() < 2 {
            return Err(Error::InvalidConfig(format!(
                "{} fuses at least 2 feature maps, got in_channels={:?}",
                self.kind, self.in_channels
            )));
        }
        if let Some(index) = self.in_channels.iter().position(|&c| c == 0) {
            return Err(Error::InvalidConfig(format!(
                "{}: in_channels[{index}] must be positive",
                self.kind
            )));
        }
        if self.out_channels == 0 {
            return Err(Error::InvalidConfig(format!(
                "{}: out_channels must be positive",
                self.kind
            )));
        }
        Ok(())
    }
}

/// A layer that combines per-modality feature maps into one.
pub trait Fuser {
    /// Fuses `inputs` (one `[N, C_i, H_i, W_i]` map per modality) into a
    /// single `[N, out_channels, H, W]` map.
    fn fuse(&self, inputs: &[Tensor]) -> Result<Tensor>;

    fn in_channels(&self) -> &[usize];

    fn out_channels(&self) -> usize;

    /// The learned stages applied after alignment and concatenation. Use it
    /// to reach parameters, switch train/eval mode, or save state.
    fn transform(&self) -> &dyn Module;
}

/// Validates the shapes of fuser inputs against the configured channel
/// counts: matching count, rank 4, per-input channels, shared batch size.
pub(crate) fn check_inputs(in_channels: &[usize], inputs: &[Tensor]) -> Result<()> {
    if inputs.len() != in_channels.len() {
        return Err(Error::InputCount {
            expected: in_channels.len(),
            got: inputs.len(),
        });
    }
    let mut batch = None;
    for (index, (input, &expected)) in inputs.iter().zip(in_channels).enumerate() {
        let shape = input.shape();
        if shape.len() != 4 {
            return Err(Error::InvalidRank {
                op: "fuse",
                expected: 4,
                got: shape,
            });
        }
        if shape[1] != expected {
            return Err(Error::InputChannels {
                index,
                expected,
                got: shape[1],
            });
        }
        match batch {
            None => batch = Some(shape[0]),
            Some(n) if n != shape[0] => {
                return Err(Error::BatchMismatch {
                    index,
                    expected: n,
                    got: shape[0],
                })
            }
            Some(_) => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_toml_config() {
        let config = FuserConfig::from_toml_str(
            r#"
            type = "ConvFuser"
            in_channels = [80, 256]
            out_channels = 256
            "#,
        )
        .unwrap();
        assert_eq!(config, FuserConfig::new("ConvFuser", vec![80, 256], 256));
        assert_eq!(config.total_in_channels(), 336);
    }

    #[test]
    fn parses_json_config() {
        let config =
            FuserConfig::from_json_str(r#"{"type": "ConvFuser", "in_channels": [4, 8], "out_channels": 16}"#)
                .unwrap();
        assert_eq!(config.in_channels, vec![4, 8]);
        assert_eq!(config.out_channels, 16);
    }

    #[test]
    fn missing_field_is_a_parse_error() {
        assert!(matches!(
            FuserConfig::from_json_str(r#"{"type": "ConvFuser", "in_channels": [4, 8]}"#),
            Err(Error::Json(_))
        ));
        assert!(matches!(
            FuserConfig::from_toml_str("in_channels = [4, 8]\nout_channels = 2"),
            Err(Error::Toml(_))
        ));
    }

    #[test]
    fn validate_rejects_single_input_and_zero_widths() {
        assert!(FuserConfig::new("ConvFuser", vec![4], 8).validate().is_err());
        assert!(FuserConfig::new("ConvFuser", vec![4, 0], 8).validate().is_err());
        assert!(FuserConfig::new("ConvFuser", vec![4, 8], 0).validate().is_err());
        assert!(FuserConfig::new("ConvFuser", vec![4, 8, 2], 8).validate().is_ok());
    }

    #[test]
    fn check_inputs_reports_first_batch_mismatch() {
        let inputs = vec![Tensor::zeros(vec![2, 1, 3, 3]), Tensor::zeros(vec![3, 1, 3, 3])];
        assert!(matches!(
            check_inputs(&[1, 1], &inputs),
            Err(Error::BatchMismatch { index: 1, expected: 2, got: 3 })
        ));
    }
}
