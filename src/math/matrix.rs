use serde::{Serialize, Deserialize};
use std::ops::{Sub, Mul};

use crate::math::tensor::Tensor;

/// Flat row-major `f32` matrix. Used for Gram matrices and for the
/// `channels × (height·width)` view of a single activation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix{
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f32>
}

impl Matrix{
    pub fn zeros(rows: usize, cols: usize) -> Matrix {
        Matrix{
            rows,
            cols,
            data: vec![0.0; rows * cols]
        }
    }

    /// Flattens the spatial dimensions of batch item 0 into a
    /// `channels × (height·width)` matrix.
    pub fn from_activation(activation: &Tensor) -> Matrix {
        let rows = activation.channels();
        let cols = activation.height() * activation.width();
        Matrix {
            rows,
            cols,
            data: activation.data[..rows * cols].to_vec(),
        }
    }

    #[inline]
    pub fn at(&self, i: usize, j: usize) -> f32 {
        self.data[i * self.cols + j]
    }

    /// `self · selfᵀ`, filling only the upper triangle and mirroring it so the
    /// result is exactly symmetric.
    pub fn outer_self(&self) -> Matrix {
        let mut res = Matrix::zeros(self.rows, self.rows);

        for i in 0..self.rows {
            let row_i = &self.data[i * self.cols..(i + 1) * self.cols];
            for j in i..self.rows {
                let row_j = &self.data[j * self.cols..(j + 1) * self.cols];
                let sum: f32 = row_i.iter().zip(row_j.iter()).map(|(a, b)| a * b).sum();
                res.data[i * self.rows + j] = sum;
                res.data[j * self.rows + i] = sum;
            }
        }

        res
    }

    pub fn map<F>(&self, functor: F) -> Matrix
    where
        F: Fn(f32) -> f32,
    {
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|&x| functor(x)).collect(),
        }
    }

    pub fn is_symmetric(&self, tolerance: f32) -> bool {
        if self.rows != self.cols {
            return false;
        }
        (0..self.rows).all(|i| {
            (0..i).all(|j| (self.at(i, j) - self.at(j, i)).abs() <= tolerance)
        })
    }
}

impl Sub for &Matrix {
    type Output = Matrix;

    fn sub(self, rhs: Self) -> Self::Output {
        if self.rows != rhs.rows || self.cols != rhs.cols {
            panic!("Matrices are of incorrect sizes")
        }

        Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().zip(rhs.data.iter()).map(|(a, b)| a - b).collect(),
        }
    }
}

impl Mul for &Matrix {
    type Output = Matrix;

    fn mul(self, rhs: Self) -> Self::Output {
        if self.cols != rhs.rows {
            panic!("Matrices are of incorrect sizes")
        }

        let mut res = Matrix::zeros(self.rows, rhs.cols);

        // i-k-j order keeps the inner loop on contiguous rows of `rhs`.
        for i in 0..self.rows {
            let out_row = &mut res.data[i * rhs.cols..(i + 1) * rhs.cols];
            for k in 0..self.cols {
                let a = self.data[i * self.cols + k];
                if a == 0.0 {
                    continue;
                }
                let rhs_row = &rhs.data[k * rhs.cols..(k + 1) * rhs.cols];
                for (o, &b) in out_row.iter_mut().zip(rhs_row.iter()) {
                    *o += a * b;
                }
            }
        }

        res
    }
}
