use crate::error::Result;
use crate::math::tensor::Tensor;

/// Squared-error distance between two activations of the same layer.
pub struct ContentLoss;

impl ContentLoss {
    /// Scalar content loss: mean((y_hat - y)²). `y` is a constant target.
    pub fn loss(y_hat: &Tensor, y: &Tensor) -> Result<f32> {
        y_hat.ensure_same_shape("ContentLoss::loss", y)?;
        if y_hat.is_empty() {
            return Ok(0.0);
        }
        let sum: f64 = y_hat.data.iter().zip(y.data.iter())
            .map(|(a, b)| ((a - b) as f64).powi(2))
            .sum();
        Ok((sum / y_hat.len() as f64) as f32)
    }

    /// ∂loss/∂y_hat = 2 (y_hat - y) / N
    pub fn derivative(y_hat: &Tensor, y: &Tensor) -> Result<Tensor> {
        y_hat.ensure_same_shape("ContentLoss::derivative", y)?;
        let scale = 2.0 / y_hat.len().max(1) as f32;
        let data = y_hat.data.iter().zip(y.data.iter())
            .map(|(a, b)| (a - b) * scale)
            .collect();
        Ok(Tensor { shape: y_hat.shape, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_activations_have_zero_loss() {
        let y = Tensor::from_data([1, 2, 2, 2], (0..8).map(|x| x as f32).collect()).unwrap();
        assert_eq!(ContentLoss::loss(&y, &y).unwrap(), 0.0);
        assert!(ContentLoss::derivative(&y, &y).unwrap().data.iter().all(|&g| g == 0.0));
    }

    #[test]
    fn loss_is_mean_squared_difference() {
        let a = Tensor::from_data([1, 1, 1, 2], vec![1.0, 3.0]).unwrap();
        let b = Tensor::from_data([1, 1, 1, 2], vec![0.0, 0.0]).unwrap();
        assert!((ContentLoss::loss(&a, &b).unwrap() - 5.0).abs() < 1e-6);
        assert_eq!(ContentLoss::derivative(&a, &b).unwrap().data, vec![1.0, 3.0]);
    }

    #[test]
    fn mismatched_shapes_are_an_error() {
        assert!(ContentLoss::loss(&Tensor::zeros([1, 1, 2, 2]), &Tensor::zeros([1, 1, 4, 1])).is_err());
    }
}
