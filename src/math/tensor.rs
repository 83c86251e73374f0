use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use std::ops::Mul;

use crate::error::{Result, StyleError};

/// `[batch, channels, height, width]`.
pub type Shape = [usize; 4];

/// Dense, row-major NCHW tensor of `f32`.
///
/// Images and feature activations share this layout; images always carry a
/// leading batch dimension of 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub shape: Shape,
    pub data: Vec<f32>,
}

impl Tensor {
    pub fn zeros(shape: Shape) -> Tensor {
        Tensor::filled(shape, 0.0)
    }

    pub fn filled(shape: Shape, value: f32) -> Tensor {
        Tensor {
            shape,
            data: vec![value; shape.iter().product()],
        }
    }

    pub fn from_data(shape: Shape, data: Vec<f32>) -> Result<Tensor> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(StyleError::ShapeMismatch {
                operation: "Tensor::from_data",
                expected: shape,
                got: [1, 1, 1, data.len()],
            });
        }
        Ok(Tensor { shape, data })
    }

    /// Uniform samples in `[low, high)`.
    pub fn uniform<R: Rng>(shape: Shape, low: f32, high: f32, rng: &mut R) -> Tensor {
        let n = shape.iter().product();
        let data = (0..n).map(|_| low + rng.gen::<f32>() * (high - low)).collect();
        Tensor { shape, data }
    }

    /// He initialization: samples from N(0, sqrt(2 / fan_in)).
    ///
    /// Used for convolution kernels that feed a ReLU.
    pub fn he<R: Rng>(shape: Shape, fan_in: usize, rng: &mut R) -> Tensor {
        let std_dev = (2.0 / fan_in as f32).sqrt();
        let n = shape.iter().product();
        let data = (0..n)
            .map(|_| sample_standard_normal(rng) * std_dev)
            .collect();
        Tensor { shape, data }
    }

    #[inline]
    pub fn batch(&self) -> usize {
        self.shape[0]
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.shape[1]
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.shape[2]
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.shape[3]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn offset(&self, n: usize, c: usize, y: usize, x: usize) -> usize {
        ((n * self.shape[1] + c) * self.shape[2] + y) * self.shape[3] + x
    }

    #[inline]
    pub fn get(&self, n: usize, c: usize, y: usize, x: usize) -> f32 {
        self.data[self.offset(n, c, y, x)]
    }

    /// The `height × width` plane of channel `c` in batch item `n`.
    pub fn plane(&self, n: usize, c: usize) -> &[f32] {
        let size = self.shape[2] * self.shape[3];
        let start = (n * self.shape[1] + c) * size;
        &self.data[start..start + size]
    }

    pub fn map<F>(&self, functor: F) -> Tensor
    where
        F: Fn(f32) -> f32,
    {
        Tensor {
            shape: self.shape,
            data: self.data.iter().map(|&x| functor(x)).collect(),
        }
    }

    pub fn sum(&self) -> f32 {
        self.data.iter().sum()
    }

    pub fn mean(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.sum() / self.data.len() as f32
    }

    /// `self += other`, element-wise.
    pub fn accumulate(&mut self, other: &Tensor) -> Result<()> {
        self.ensure_same_shape("Tensor::accumulate", other)?;
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a += b;
        }
        Ok(())
    }

    pub fn ensure_same_shape(&self, operation: &'static str, other: &Tensor) -> Result<()> {
        if self.shape != other.shape {
            return Err(StyleError::ShapeMismatch {
                operation,
                expected: self.shape,
                got: other.shape,
            });
        }
        Ok(())
    }
}

/// Samples a single value from N(0, 1) using the Box-Muller transform.
fn sample_standard_normal<R: Rng>(rng: &mut R) -> f32 {
    // (0, 1] keeps ln() finite.
    let u1: f32 = 1.0 - rng.gen::<f32>();
    let u2: f32 = 1.0 - rng.gen::<f32>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

impl Mul<f32> for &Tensor {
    type Output = Tensor;

    fn mul(self, rhs: f32) -> Self::Output {
        self.map(|x| x * rhs)
    }
}
