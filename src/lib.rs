pub mod error;
pub mod fusers;
pub mod gpu;
pub mod nn;
pub mod optimizer;
pub mod registry;
pub mod tensor;

pub use error::{Error, Result};
pub use fusers::{ConvFuser, Fuser, FuserConfig};
pub use registry::FuserRegistry;
pub use tensor::Tensor;
