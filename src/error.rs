//! Error type shared by the tensor engine, the layers and the fusers.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// An operator received a tensor of the wrong rank.
    #[error("{op}: expected a {expected}-D tensor, got shape {got:?}")]
    InvalidRank {
        op: &'static str,
        expected: usize,
        got: Vec<usize>,
    },

    /// Two tensors that must agree on a dimension do not.
    #[error("{op}: incompatible shapes {left:?} and {right:?}")]
    ShapeMismatch {
        op: &'static str,
        left: Vec<usize>,
        right: Vec<usize>,
    },

    /// A layer received a tensor whose channel dimension it was not built for.
    #[error("{layer}: expected {expected} input channels, got {got}")]
    ChannelMismatch {
        layer: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("fuser expects {expected} feature maps, got {got}")]
    InputCount { expected: usize, got: usize },

    #[error("feature map {index}: expected {expected} channels, got {got}")]
    InputChannels {
        index: usize,
        expected: usize,
        got: usize,
    },

    #[error("feature map {index}: batch size {got} does not match {expected}")]
    BatchMismatch {
        index: usize,
        expected: usize,
        got: usize,
    },

    #[error("feature map {index}: spatial size {got:?} does not match reference {expected:?}")]
    SpatialMismatch {
        index: usize,
        expected: (usize, usize),
        got: (usize, usize),
    },

    /// Training-mode batch norm needs at least two values per channel.
    #[error("{layer}: expected more than 1 value per channel in training mode, got shape {shape:?}")]
    DegenerateBatch {
        layer: &'static str,
        shape: Vec<usize>,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no fuser registered under type `{0}`")]
    UnknownFuser(String),

    #[error("a fuser is already registered under type `{0}`")]
    DuplicateFuser(String),

    #[error("state dict is missing `{0}`")]
    MissingState(String),

    #[error("state `{name}`: expected shape {expected:?}, got {got:?}")]
    StateShape {
        name: String,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("GPU backend: {0}")]
    Gpu(String),

    #[error("failed to parse TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to parse JSON config: {0}")]
    Json(#[from] serde_json::Error),
}
