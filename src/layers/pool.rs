use rayon::prelude::*;
use serde::{Serialize, Deserialize};

use crate::error::{Result, StyleError};
use crate::math::tensor::Tensor;

/// Max pooling without padding; trailing rows/columns that do not fill a
/// window are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaxPool2d {
    pub kernel: usize,
    pub stride: usize,
}

impl MaxPool2d {
    pub fn new(kernel: usize, stride: usize) -> MaxPool2d {
        MaxPool2d { kernel, stride }
    }

    fn output_dims(&self, input: &Tensor) -> Result<(usize, usize)> {
        if input.height() < self.kernel || input.width() < self.kernel || self.stride == 0 {
            return Err(StyleError::ShapeMismatch {
                operation: "MaxPool2d::forward",
                expected: [input.batch(), input.channels(), self.kernel, self.kernel],
                got: input.shape,
            });
        }
        Ok((
            (input.height() - self.kernel) / self.stride + 1,
            (input.width() - self.kernel) / self.stride + 1,
        ))
    }

    /// Position (within the plane) of the first maximum in the window whose
    /// top-left output coordinate is `(oy, ox)`.
    fn argmax(&self, plane: &[f32], width: usize, oy: usize, ox: usize) -> usize {
        let mut best = oy * self.stride * width + ox * self.stride;
        for ky in 0..self.kernel {
            for kx in 0..self.kernel {
                let pos = (oy * self.stride + ky) * width + ox * self.stride + kx;
                if plane[pos] > plane[best] {
                    best = pos;
                }
            }
        }
        best
    }

    pub fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let (h_out, w_out) = self.output_dims(input)?;
        let (c, w) = (input.channels(), input.width());
        let mut output = Tensor::zeros([input.batch(), c, h_out, w_out]);

        output.data
            .par_chunks_mut(h_out * w_out)
            .enumerate()
            .for_each(|(idx, out_plane)| {
                let plane = input.plane(idx / c, idx % c);
                for oy in 0..h_out {
                    for ox in 0..w_out {
                        out_plane[oy * w_out + ox] = plane[self.argmax(plane, w, oy, ox)];
                    }
                }
            });

        Ok(output)
    }

    /// Routes each output gradient back to the input position that won the max.
    pub fn backward(&self, input: &Tensor, grad_output: &Tensor) -> Result<Tensor> {
        let (h_out, w_out) = self.output_dims(input)?;
        let expected = [input.batch(), input.channels(), h_out, w_out];
        if grad_output.shape != expected {
            return Err(StyleError::ShapeMismatch {
                operation: "MaxPool2d::backward",
                expected,
                got: grad_output.shape,
            });
        }
        let (c, h, w) = (input.channels(), input.height(), input.width());
        let mut grad_input = Tensor::zeros(input.shape);

        grad_input.data
            .par_chunks_mut(h * w)
            .enumerate()
            .for_each(|(idx, g_plane)| {
                let (n, ch) = (idx / c, idx % c);
                let plane = input.plane(n, ch);
                let upstream = grad_output.plane(n, ch);
                for oy in 0..h_out {
                    for ox in 0..w_out {
                        g_plane[self.argmax(plane, w, oy, ox)] += upstream[oy * w_out + ox];
                    }
                }
            });

        Ok(grad_input)
    }
}
