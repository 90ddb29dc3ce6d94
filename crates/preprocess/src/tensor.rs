use crate::config::CHANNELS;
use crate::error::PreprocessError;
use ndarray::{Array, ArrayViewD, IxDyn};

/// Model input in NHWC layout: `[1, height, width, 3]`, values in `[0, 1]`.
///
/// Only constructible through [`ImageTensor::new`] or [`ImageTensor::zeros`],
/// so every instance satisfies the shape and range invariant.
#[derive(Debug, Clone)]
pub struct ImageTensor {
    array: Array<f32, IxDyn>,
}

impl ImageTensor {
    pub fn new(array: Array<f32, IxDyn>, input_size: (u32, u32)) -> Result<Self, PreprocessError> {
        let expected = Self::shape_for(input_size);
        if array.shape() != expected {
            return Err(PreprocessError::Shape {
                expected: expected.to_vec(),
                actual: array.shape().to_vec(),
            });
        }

        if let Some(&value) = array.iter().find(|v| !(0.0..=1.0).contains(*v)) {
            return Err(PreprocessError::OutOfRange(value));
        }

        Ok(Self { array })
    }

    /// All-black tensor, used to warm the model up at startup.
    pub fn zeros(input_size: (u32, u32)) -> Self {
        Self {
            array: Array::zeros(IxDyn(&Self::shape_for(input_size))),
        }
    }

    /// Expected NHWC shape for an `(width, height)` input size.
    pub fn shape_for(input_size: (u32, u32)) -> [usize; 4] {
        [1, input_size.1 as usize, input_size.0 as usize, CHANNELS]
    }

    pub fn shape(&self) -> &[usize] {
        self.array.shape()
    }

    pub fn view(&self) -> ArrayViewD<'_, f32> {
        self.array.view()
    }
}
