use thiserror::Error;

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("Image data is empty")]
    Empty,

    #[error("Image data is too large: {size} bytes (max: {max} bytes)")]
    TooLarge { size: usize, max: usize },

    #[error("Unsupported image format")]
    UnsupportedFormat,

    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Failed to resize image: {0}")]
    Resize(String),

    #[error("Tensor shape mismatch: expected {expected:?}, got {actual:?}")]
    Shape {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Tensor value {0} is outside [0, 1]")]
    OutOfRange(f32),
}

impl PreprocessError {
    /// True when the caller sent bytes that are not a usable image, as opposed
    /// to a contract violation inside the preprocessor itself.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            PreprocessError::Empty
                | PreprocessError::TooLarge { .. }
                | PreprocessError::UnsupportedFormat
                | PreprocessError::Decode(_)
        )
    }
}
