pub mod config;
pub mod cpu;
pub mod error;
pub mod tensor;

pub use config::{CHANNELS, DEFAULT_INPUT_SIZE, DEFAULT_MAX_INPUT_BYTES};
pub use cpu::CpuPreProcessor;
pub use error::PreprocessError;
pub use tensor::ImageTensor;

/// Trait for image preprocessing implementations
pub trait Preprocess {
    /// Turn encoded image bytes into a model-ready tensor
    ///
    /// # Arguments
    /// * `bytes` - Encoded image (PNG, JPEG, WebP, GIF, BMP, ...)
    ///
    /// # Returns
    /// NHWC tensor of shape `[1, height, width, 3]` with values in `[0, 1]`
    fn preprocess(&self, bytes: &[u8]) -> Result<ImageTensor, PreprocessError>;

    /// Get the input size this preprocessor targets, as `(width, height)`
    fn input_size(&self) -> (u32, u32);
}
