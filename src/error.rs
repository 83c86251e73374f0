use thiserror::Error;

use crate::math::tensor::Shape;

/// Every failure the style-transfer pipeline can report.
///
/// All of them are terminal: nothing in the crate retries.
#[derive(Debug, Error)]
pub enum StyleError {
    #[error("invalid image shape {height}x{width}: both dimensions must be positive")]
    InvalidShape { height: u32, width: u32 },
    #[error("expected a 3-channel image, got {0} channels")]
    ChannelCount(u8),
    #[error("{operation}: shape mismatch, expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        operation: &'static str,
        expected: Shape,
        got: Shape,
    },
    #[error("layer index {index} is out of range for a network of depth {depth}")]
    LayerOutOfRange { index: usize, depth: usize },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("weights error: {0}")]
    Weights(String),
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<safetensors::SafeTensorError> for StyleError {
    fn from(err: safetensors::SafeTensorError) -> Self {
        StyleError::Weights(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StyleError>;
