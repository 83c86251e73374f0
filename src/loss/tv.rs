use crate::math::tensor::Tensor;

/// Total-variation smoothness penalty on the composite image.
pub struct TvLoss;

impl TvLoss {
    /// 0.5 · (mean|x[.., y+1, x] − x[.., y, x]| + mean|x[.., y, x+1] − x[.., y, x]|)
    ///
    /// Each direction is averaged over its own element count. A direction with
    /// no adjacent pairs (height or width 1) contributes 0.
    pub fn loss(x: &Tensor) -> f32 {
        let (vertical, v_count) = sum_abs_diffs(x, 1, 0);
        let (horizontal, h_count) = sum_abs_diffs(x, 0, 1);
        (0.5 * (mean(vertical, v_count) + mean(horizontal, h_count))) as f32
    }

    /// Subgradient of `loss`, taking sign(0) = 0.
    pub fn derivative(x: &Tensor) -> Tensor {
        let (h, w) = (x.height(), x.width());
        let planes = x.batch() * x.channels();
        let v_count = planes * h.saturating_sub(1) * w;
        let h_count = planes * h * w.saturating_sub(1);
        let v_scale = if v_count > 0 { 0.5 / v_count as f32 } else { 0.0 };
        let h_scale = if h_count > 0 { 0.5 / h_count as f32 } else { 0.0 };

        let mut grad = Tensor::zeros(x.shape);
        for p in 0..planes {
            let base = p * h * w;
            let src = &x.data[base..base + h * w];
            let dst = &mut grad.data[base..base + h * w];
            for row in 0..h {
                for col in 0..w {
                    let here = row * w + col;
                    if row + 1 < h {
                        let below = here + w;
                        let s = sign(src[below] - src[here]) * v_scale;
                        dst[below] += s;
                        dst[here] -= s;
                    }
                    if col + 1 < w {
                        let right = here + 1;
                        let s = sign(src[right] - src[here]) * h_scale;
                        dst[right] += s;
                        dst[here] -= s;
                    }
                }
            }
        }
        grad
    }
}

fn sum_abs_diffs(x: &Tensor, dy: usize, dx: usize) -> (f64, usize) {
    let (h, w) = (x.height(), x.width());
    let planes = x.batch() * x.channels();
    let mut sum = 0.0f64;
    let mut count = 0usize;
    for p in 0..planes {
        let plane = &x.data[p * h * w..(p + 1) * h * w];
        for row in 0..h.saturating_sub(dy) {
            for col in 0..w.saturating_sub(dx) {
                let a = plane[row * w + col];
                let b = plane[(row + dy) * w + col + dx];
                sum += (b - a).abs() as f64;
                count += 1;
            }
        }
    }
    (sum, count)
}

fn mean(sum: f64, count: usize) -> f64 {
    if count == 0 { 0.0 } else { sum / count as f64 }
}

fn sign(v: f32) -> f32 {
    if v > 0.0 { 1.0 } else if v < 0.0 { -1.0 } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_image_has_zero_tv() {
        let x = Tensor::filled([1, 3, 6, 5], 0.7);
        assert_eq!(TvLoss::loss(&x), 0.0);
        assert!(TvLoss::derivative(&x).data.iter().all(|&g| g == 0.0));
    }

    #[test]
    fn single_step_is_positive() {
        let mut x = Tensor::zeros([1, 1, 3, 3]);
        x.data[4] = 1.0;
        assert!(TvLoss::loss(&x) > 0.0);
    }

    #[test]
    fn directions_are_normalized_separately() {
        // 2 rows, 3 cols: vertical pairs = 3, horizontal pairs = 4.
        let x = Tensor::from_data([1, 1, 2, 3], vec![0.0, 1.0, 0.0, 0.0, 1.0, 0.0]).unwrap();
        // vertical diffs all 0, horizontal |diffs| = 1,1,1,1 → mean 1.
        assert!((TvLoss::loss(&x) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn one_pixel_wide_image_is_handled() {
        let x = Tensor::from_data([1, 1, 3, 1], vec![0.0, 1.0, 3.0]).unwrap();
        // vertical mean = (1 + 2) / 2, no horizontal pairs.
        assert!((TvLoss::loss(&x) - 0.75).abs() < 1e-6);
        assert_eq!(TvLoss::derivative(&x).data, vec![-0.25, 0.0, 0.25]);
    }

    #[test]
    fn derivative_matches_finite_differences() {
        let n = 2 * 4 * 4;
        let x = Tensor::from_data([1, 2, 4, 4], (0..n).map(|i| ((i * 7 % 13) as f32) * 0.37).collect()).unwrap();
        let grad = TvLoss::derivative(&x);
        let eps = 1e-3;
        for i in [0, 5, 10, 17, 31] {
            let mut plus = x.clone();
            plus.data[i] += eps;
            let mut minus = x.clone();
            minus.data[i] -= eps;
            let numeric = (TvLoss::loss(&plus) - TvLoss::loss(&minus)) / (2.0 * eps);
            assert!((numeric - grad.data[i]).abs() < 1e-3, "index {i}: {numeric} vs {}", grad.data[i]);
        }
    }
}
