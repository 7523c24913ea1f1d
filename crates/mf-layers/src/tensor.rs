#![allow(clippy::needless_range_loop)]
//! Tensor type for embedding computations.
//!
//! A small dense, row-major `f32` tensor. Batches of embeddings are 2D
//! (`[rows, dim]`); score vectors are 1D; negative-item embeddings may
//! arrive as 3D (`[batch, neg_multiple, dim]`) and are reshaped before use.

use serde::{Deserialize, Serialize};

use crate::error::{LayerError, LayerResult};

/// A multi-dimensional array for embedding computations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    /// The shape of the tensor (dimensions)
    shape: Vec<usize>,
    /// The underlying data in row-major order
    data: Vec<f32>,
}

impl Tensor {
    /// Creates a new tensor with the given shape, filled with zeros.
    ///
    /// # Example
    ///
    /// ```
    /// use mf_layers::tensor::Tensor;
    ///
    /// let t = Tensor::zeros(&[2, 3]);
    /// assert_eq!(t.shape(), &[2, 3]);
    /// assert_eq!(t.numel(), 6);
    /// ```
    pub fn zeros(shape: &[usize]) -> Self {
        let numel: usize = shape.iter().product();
        Self {
            shape: shape.to_vec(),
            data: vec![0.0; numel],
        }
    }

    /// Creates a new tensor with the given shape, filled with ones.
    pub fn ones(shape: &[usize]) -> Self {
        let numel: usize = shape.iter().product();
        Self {
            shape: shape.to_vec(),
            data: vec![1.0; numel],
        }
    }

    /// Creates a new tensor with the given shape and data.
    ///
    /// # Panics
    ///
    /// Panics if the data length doesn't match the shape
    pub fn from_data(shape: &[usize], data: Vec<f32>) -> Self {
        let numel: usize = shape.iter().product();
        assert_eq!(
            data.len(),
            numel,
            "Data length {} doesn't match shape {:?} (expected {})",
            data.len(),
            shape,
            numel
        );
        Self {
            shape: shape.to_vec(),
            data,
        }
    }

    /// Builds a 2D tensor from equally sized rows.
    ///
    /// An empty slice yields a `[0, 0]` tensor.
    pub fn from_rows(rows: &[Vec<f32>]) -> LayerResult<Self> {
        let cols = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            if row.len() != cols {
                return Err(LayerError::ShapeMismatch {
                    expected: vec![cols],
                    actual: vec![row.len()],
                });
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            shape: vec![rows.len(), cols],
            data,
        })
    }

    /// Returns the shape of the tensor.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Returns the number of dimensions.
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Returns the total number of elements.
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Returns a reference to the underlying data.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Returns a mutable reference to the underlying data.
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Consumes the tensor and returns its data.
    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    /// Number of rows (leading dimension); 0 for a scalar.
    pub fn rows(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    /// Size of the trailing dimension; 1 for 1D tensors.
    pub fn cols(&self) -> usize {
        if self.shape.len() >= 2 {
            self.shape[self.shape.len() - 1]
        } else {
            1
        }
    }

    /// Returns row `i` of a 2D tensor.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of bounds.
    pub fn row(&self, i: usize) -> &[f32] {
        let cols = self.cols();
        &self.data[i * cols..(i + 1) * cols]
    }

    /// Returns row `i` of a 2D tensor mutably.
    pub fn row_mut(&mut self, i: usize) -> &mut [f32] {
        let cols = self.cols();
        &mut self.data[i * cols..(i + 1) * cols]
    }

    /// Iterates over the rows of a 2D tensor.
    pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> {
        // chunks() rejects a zero size
        self.data.chunks(self.cols().max(1))
    }

    /// Matrix multiplication between two 2D tensors.
    ///
    /// # Panics
    ///
    /// Panics if the inner dimensions don't match
    pub fn matmul(&self, other: &Tensor) -> Tensor {
        assert_eq!(self.ndim(), 2, "matmul requires 2D tensors");
        assert_eq!(other.ndim(), 2, "matmul requires 2D tensors");
        assert_eq!(
            self.shape[1], other.shape[0],
            "Inner dimensions must match for matmul"
        );

        let m = self.shape[0];
        let k = self.shape[1];
        let n = other.shape[1];

        let mut result = vec![0.0; m * n];
        for i in 0..m {
            for l in 0..k {
                let a = self.data[i * k + l];
                if a == 0.0 {
                    continue;
                }
                for j in 0..n {
                    result[i * n + j] += a * other.data[l * n + j];
                }
            }
        }

        Tensor::from_data(&[m, n], result)
    }

    /// Transposes a 2D tensor.
    pub fn transpose(&self) -> Tensor {
        assert_eq!(self.ndim(), 2, "transpose requires 2D tensor");
        let m = self.shape[0];
        let n = self.shape[1];

        let mut result = vec![0.0; m * n];
        for i in 0..m {
            for j in 0..n {
                result[j * m + i] = self.data[i * n + j];
            }
        }

        Tensor::from_data(&[n, m], result)
    }

    /// Adds `other * alpha` into `self` in place.
    pub fn add_scaled_(&mut self, other: &Tensor, alpha: f32) -> LayerResult<()> {
        if self.shape != other.shape {
            return Err(LayerError::ShapeMismatch {
                expected: self.shape.clone(),
                actual: other.shape.clone(),
            });
        }
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a += alpha * b;
        }
        Ok(())
    }

    /// Scalar multiplication.
    pub fn scale(&self, scalar: f32) -> Tensor {
        let data: Vec<f32> = self.data.iter().map(|a| a * scalar).collect();
        Tensor::from_data(&self.shape, data)
    }

    /// Sum all elements in the tensor.
    pub fn sum(&self) -> f32 {
        self.data.iter().sum()
    }

    /// Apply a function element-wise.
    pub fn map<F>(&self, f: F) -> Tensor
    where
        F: Fn(f32) -> f32,
    {
        let data: Vec<f32> = self.data.iter().map(|&x| f(x)).collect();
        Tensor::from_data(&self.shape, data)
    }

    /// Reshape the tensor to a new shape.
    pub fn reshape(&self, new_shape: &[usize]) -> LayerResult<Tensor> {
        let new_numel: usize = new_shape.iter().product();
        if self.numel() != new_numel {
            return Err(LayerError::ShapeMismatch {
                expected: new_shape.to_vec(),
                actual: self.shape.clone(),
            });
        }
        Ok(Tensor::from_data(new_shape, self.data.clone()))
    }

    /// Stacks 2D tensors with the same trailing dimension along the rows.
    pub fn concat_rows(parts: &[&Tensor]) -> LayerResult<Tensor> {
        let cols = parts.first().map(|t| t.cols()).unwrap_or(0);
        let mut rows = 0;
        let mut data = Vec::with_capacity(parts.iter().map(|t| t.numel()).sum());
        for part in parts {
            if part.ndim() != 2 || part.cols() != cols {
                return Err(LayerError::ShapeMismatch {
                    expected: vec![part.rows(), cols],
                    actual: part.shape.clone(),
                });
            }
            rows += part.rows();
            data.extend_from_slice(&part.data);
        }
        Ok(Tensor::from_data(&[rows, cols], data))
    }

    /// Copies rows `[start, end)` of a 2D tensor.
    pub fn slice_rows(&self, start: usize, end: usize) -> LayerResult<Tensor> {
        if start > end || end > self.rows() {
            return Err(LayerError::ShapeMismatch {
                expected: vec![end, self.cols()],
                actual: self.shape.clone(),
            });
        }
        let cols = self.cols();
        Ok(Tensor::from_data(
            &[end - start, cols],
            self.data[start * cols..end * cols].to_vec(),
        ))
    }

    /// Returns true if every element is finite.
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|x| x.is_finite())
    }
}

/// Dot product of two equally sized slices.
#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Squared euclidean distance between two equally sized slices.
#[inline]
pub fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// L2 norm of a slice.
#[inline]
pub fn l2_norm(a: &[f32]) -> f32 {
    dot(a, a).sqrt()
}
