use crate::error::{Result, StyleError};
use crate::math::matrix::Matrix;
use crate::math::tensor::Tensor;

/// Gram-matrix distance between the texture statistics of two activations.
pub struct StyleLoss;

impl StyleLoss {
    /// Channel-correlation matrix of a `[1, c, h, w]` activation:
    ///   G = F·Fᵀ / (c·h·w),  F = activation reshaped to `c × (h·w)`.
    ///
    /// The normalization keeps the magnitude independent of spatial size.
    pub fn gram(x: &Tensor) -> Matrix {
        let features = Matrix::from_activation(x);
        let n = (x.channels() * x.height() * x.width()).max(1) as f32;
        features.outer_self().map(|v| v / n)
    }

    /// Scalar style loss: mean((gram(y_hat) - gram_y)²). `gram_y` is a constant target.
    pub fn loss(y_hat: &Tensor, gram_y: &Matrix) -> Result<f32> {
        let gram = StyleLoss::gram(y_hat);
        check_gram(&gram, gram_y)?;
        if gram.data.is_empty() {
            return Ok(0.0);
        }
        let sum: f64 = gram.data.iter().zip(gram_y.data.iter())
            .map(|(a, b)| ((a - b) as f64).powi(2))
            .sum();
        Ok((sum / gram.data.len() as f64) as f32)
    }

    /// ∂loss/∂y_hat.
    ///
    /// With D = G − A (symmetric), ∂L/∂G = 2D/c² and
    /// ∂L/∂F = (∂L/∂G + ∂L/∂Gᵀ)·F / (c·h·w) = 4·D·F / (c²·c·h·w).
    pub fn derivative(y_hat: &Tensor, gram_y: &Matrix) -> Result<Tensor> {
        let features = Matrix::from_activation(y_hat);
        let c = y_hat.channels() as f32;
        let n = (y_hat.channels() * y_hat.height() * y_hat.width()).max(1) as f32;
        let gram = features.outer_self().map(|v| v / n);
        check_gram(&gram, gram_y)?;

        let scale = 4.0 / (c * c * n);
        let diff = (&gram - gram_y).map(|v| v * scale);
        let grad = &diff * &features;
        Tensor::from_data(y_hat.shape, grad.data)
    }
}

fn check_gram(gram: &Matrix, target: &Matrix) -> Result<()> {
    if gram.rows != target.rows || gram.cols != target.cols {
        return Err(StyleError::ShapeMismatch {
            operation: "StyleLoss",
            expected: [1, 1, target.rows, target.cols],
            got: [1, 1, gram.rows, gram.cols],
        });
    }
    Ok(())
}
