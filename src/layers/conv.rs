use rand::Rng;
use rayon::prelude::*;
use serde::{Serialize, Deserialize};

use crate::error::{Result, StyleError};
use crate::math::tensor::Tensor;

/// Frozen 2-D convolution with square kernels.
///
/// - `weight`: `[out_channels, in_channels, kernel, kernel]`
/// - `bias`:   one value per output channel
///
/// Only the gradient with respect to the input is ever needed: the weights
/// belong to a pretrained network and are never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conv2d {
    pub weight: Tensor,
    pub bias: Vec<f32>,
    pub stride: usize,
    pub padding: usize,
}

impl Conv2d {
    /// He-initialized kernel and zero bias.
    pub fn new<R: Rng>(
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        padding: usize,
        rng: &mut R,
    ) -> Conv2d {
        let fan_in = in_channels * kernel * kernel;
        Conv2d {
            weight: Tensor::he([out_channels, in_channels, kernel, kernel], fan_in, rng),
            bias: vec![0.0; out_channels],
            stride: 1,
            padding,
        }
    }

    pub fn from_parts(weight: Tensor, bias: Vec<f32>, padding: usize) -> Result<Conv2d> {
        if weight.shape[2] != weight.shape[3] {
            return Err(StyleError::Weights(format!(
                "non-square kernel {:?}", weight.shape
            )));
        }
        if bias.len() != weight.shape[0] {
            return Err(StyleError::Weights(format!(
                "bias has {} entries for {} output channels", bias.len(), weight.shape[0]
            )));
        }
        Ok(Conv2d { weight, bias, stride: 1, padding })
    }

    #[inline]
    pub fn in_channels(&self) -> usize {
        self.weight.shape[1]
    }

    #[inline]
    pub fn out_channels(&self) -> usize {
        self.weight.shape[0]
    }

    #[inline]
    pub fn kernel(&self) -> usize {
        self.weight.shape[2]
    }

    fn output_dims(&self, input: &Tensor) -> Result<(usize, usize)> {
        let k = self.kernel();
        let (h, w) = (input.height() + 2 * self.padding, input.width() + 2 * self.padding);
        if input.channels() != self.in_channels() || h < k || w < k {
            return Err(StyleError::ShapeMismatch {
                operation: "Conv2d::forward",
                expected: [input.batch(), self.in_channels(), k, k],
                got: input.shape,
            });
        }
        Ok(((h - k) / self.stride + 1, (w - k) / self.stride + 1))
    }

    pub fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let (h_out, w_out) = self.output_dims(input)?;
        let (in_ch, out_ch, k) = (self.in_channels(), self.out_channels(), self.kernel());
        let (h, w) = (input.height(), input.width());
        let (s, p) = (self.stride, self.padding);
        let mut output = Tensor::zeros([input.batch(), out_ch, h_out, w_out]);

        output.data
            .par_chunks_mut(h_out * w_out)
            .enumerate()
            .for_each(|(idx, out_plane)| {
                let (n, o) = (idx / out_ch, idx % out_ch);
                out_plane.fill(self.bias[o]);
                for c in 0..in_ch {
                    let in_plane = input.plane(n, c);
                    for ky in 0..k {
                        for kx in 0..k {
                            let wv = self.weight.get(o, c, ky, kx);
                            for oy in 0..h_out {
                                let iy = (oy * s + ky) as isize - p as isize;
                                if iy < 0 || iy >= h as isize {
                                    continue;
                                }
                                let in_row = &in_plane[iy as usize * w..(iy as usize + 1) * w];
                                let out_row = &mut out_plane[oy * w_out..(oy + 1) * w_out];
                                for (ox, out) in out_row.iter_mut().enumerate() {
                                    let ix = (ox * s + kx) as isize - p as isize;
                                    if ix >= 0 && ix < w as isize {
                                        *out += wv * in_row[ix as usize];
                                    }
                                }
                            }
                        }
                    }
                }
            });

        Ok(output)
    }

    /// ∂L/∂input given ∂L/∂output. Each input plane is summed by a single
    /// worker in a fixed order, so the result does not depend on scheduling.
    pub fn backward(&self, input: &Tensor, grad_output: &Tensor) -> Result<Tensor> {
        let (h_out, w_out) = self.output_dims(input)?;
        let expected = [input.batch(), self.out_channels(), h_out, w_out];
        if grad_output.shape != expected {
            return Err(StyleError::ShapeMismatch {
                operation: "Conv2d::backward",
                expected,
                got: grad_output.shape,
            });
        }
        let (in_ch, out_ch, k) = (self.in_channels(), self.out_channels(), self.kernel());
        let (h, w) = (input.height(), input.width());
        let (s, p) = (self.stride, self.padding);
        let mut grad_input = Tensor::zeros(input.shape);

        grad_input.data
            .par_chunks_mut(h * w)
            .enumerate()
            .for_each(|(idx, in_plane)| {
                let (n, c) = (idx / in_ch, idx % in_ch);
                for o in 0..out_ch {
                    let g_plane = grad_output.plane(n, o);
                    for ky in 0..k {
                        for kx in 0..k {
                            let wv = self.weight.get(o, c, ky, kx);
                            for oy in 0..h_out {
                                let iy = (oy * s + ky) as isize - p as isize;
                                if iy < 0 || iy >= h as isize {
                                    continue;
                                }
                                let g_row = &g_plane[oy * w_out..(oy + 1) * w_out];
                                let in_row = &mut in_plane[iy as usize * w..(iy as usize + 1) * w];
                                for (ox, &g) in g_row.iter().enumerate() {
                                    let ix = (ox * s + kx) as isize - p as isize;
                                    if ix >= 0 && ix < w as isize {
                                        in_row[ix as usize] += wv * g;
                                    }
                                }
                            }
                        }
                    }
                }
            });

        Ok(grad_input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn ramp(shape: [usize; 4]) -> Tensor {
        let n: usize = shape.iter().product();
        Tensor::from_data(shape, (0..n).map(|i| ((i * 7 % 11) as f32 - 5.0) * 0.1).collect()).unwrap()
    }

    #[test]
    fn same_padding_keeps_spatial_size() {
        let conv = Conv2d::new(3, 4, 3, 1, &mut StdRng::seed_from_u64(1));
        let out = conv.forward(&ramp([1, 3, 5, 6])).unwrap();
        assert_eq!(out.shape, [1, 4, 5, 6]);
    }

    #[test]
    fn single_tap_kernel_is_scaled_copy_plus_bias() {
        let weight = Tensor::from_data([1, 1, 1, 1], vec![2.0]).unwrap();
        let conv = Conv2d::from_parts(weight, vec![0.5], 0).unwrap();
        let input = ramp([1, 1, 2, 2]);
        let out = conv.forward(&input).unwrap();
        for (o, i) in out.data.iter().zip(input.data.iter()) {
            assert!((o - (2.0 * i + 0.5)).abs() < 1e-6);
        }
    }

    #[test]
    fn rejects_wrong_channel_count() {
        let conv = Conv2d::new(3, 4, 3, 1, &mut StdRng::seed_from_u64(1));
        assert!(conv.forward(&ramp([1, 2, 5, 5])).is_err());
    }

    #[test]
    fn backward_matches_finite_differences() {
        let conv = Conv2d::new(2, 3, 3, 1, &mut StdRng::seed_from_u64(3));
        let input = ramp([1, 2, 4, 5]);
        let upstream = ramp([1, 3, 4, 5]);
        // L = <upstream, conv(x)>, so ∂L/∂x = backward(upstream).
        let objective = |x: &Tensor| -> f32 {
            let y = conv.forward(x).unwrap();
            y.data.iter().zip(upstream.data.iter()).map(|(a, b)| a * b).sum()
        };
        let grad = conv.backward(&input, &upstream).unwrap();
        let eps = 1e-2;
        for i in [0, 7, 13, 21, 39] {
            let mut plus = input.clone();
            plus.data[i] += eps;
            let mut minus = input.clone();
            minus.data[i] -= eps;
            let numeric = (objective(&plus) - objective(&minus)) / (2.0 * eps);
            assert!(
                (numeric - grad.data[i]).abs() < 1e-2 * (1.0 + numeric.abs()),
                "index {i}: numeric {numeric} vs analytic {}", grad.data[i]
            );
        }
    }
}
