use crate::config::{DEFAULT_INPUT_SIZE, DEFAULT_MAX_INPUT_BYTES};
use crate::{ImageTensor, Preprocess, PreprocessError};
use common::{span, span_debug};
use fast_image_resize::{
    FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer,
    images::{Image, ImageRef},
};
use image::RgbImage;
use ndarray::{Array, IxDyn};
use std::default::Default;

#[derive(Debug, Clone)]
pub struct CpuPreProcessor {
    pub input_size: (u32, u32),
    max_input_bytes: usize,
}

impl CpuPreProcessor {
    pub fn new(input_size: (u32, u32)) -> Self {
        Self {
            input_size,
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
        }
    }

    pub fn with_max_input_bytes(mut self, max_input_bytes: usize) -> Self {
        self.max_input_bytes = max_input_bytes;
        self
    }

    /// Decode encoded bytes into an 8-bit RGB raster.
    ///
    /// Alpha is dropped and grayscale is expanded to three channels.
    pub fn decode(&self, bytes: &[u8]) -> Result<RgbImage, PreprocessError> {
        let _s = span!("decode_image");

        if bytes.is_empty() {
            return Err(PreprocessError::Empty);
        }
        if bytes.len() > self.max_input_bytes {
            return Err(PreprocessError::TooLarge {
                size: bytes.len(),
                max: self.max_input_bytes,
            });
        }

        let format = image::guess_format(bytes).map_err(|_| PreprocessError::UnsupportedFormat)?;
        let decoded = image::load_from_memory_with_format(bytes, format)?;

        tracing::trace!(
            format = ?format,
            width = decoded.width(),
            height = decoded.height(),
            encoded_bytes = bytes.len(),
            "Decoded image"
        );

        let rgb = decoded.to_rgb8();
        if rgb.width() == 0 || rgb.height() == 0 {
            return Err(PreprocessError::Resize(format!(
                "image has no pixels ({}x{})",
                rgb.width(),
                rgb.height()
            )));
        }

        Ok(rgb)
    }

    /// Stretch to the model input size; aspect ratio is not preserved.
    fn resize(&self, rgb: &RgbImage) -> Result<Image<'static>, PreprocessError> {
        let _s = span!("resize");

        let (width, height) = rgb.dimensions();
        let src = ImageRef::new(width, height, rgb.as_raw(), PixelType::U8x3)
            .map_err(|e| PreprocessError::Resize(e.to_string()))?;

        let mut resized = Image::new(self.input_size.0, self.input_size.1, PixelType::U8x3);

        Resizer::new()
            .resize(
                &src,
                &mut resized,
                &ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::CatmullRom)),
            )
            .map_err(|e| PreprocessError::Resize(e.to_string()))?;

        Ok(resized)
    }

    fn normalize(&self, image: &Image) -> Result<ImageTensor, PreprocessError> {
        let _s = span_debug!("normalize");

        let width = image.width() as usize;
        let height = image.height() as usize;

        // RGB8 rows are already HWC, so scaling in place yields NHWC.
        let output: Vec<f32> = image.buffer().iter().map(|&v| v as f32 / 255.0).collect();
        let len = output.len();

        let array = Array::from_shape_vec(IxDyn(&[1, height, width, 3]), output).map_err(|_| {
            PreprocessError::Shape {
                expected: ImageTensor::shape_for(self.input_size).to_vec(),
                actual: vec![len],
            }
        })?;

        ImageTensor::new(array, self.input_size)
    }
}

impl Default for CpuPreProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_SIZE)
    }
}

impl Preprocess for CpuPreProcessor {
    fn preprocess(&self, bytes: &[u8]) -> Result<ImageTensor, PreprocessError> {
        let _s = span!("preprocess_image");

        let rgb = self.decode(bytes)?;
        let resized = self.resize(&rgb)?;
        self.normalize(&resized)
    }

    fn input_size(&self) -> (u32, u32) {
        self.input_size
    }
}
