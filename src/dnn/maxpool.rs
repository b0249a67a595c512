use crate::dnn::layer::Layer;
use crate::error::AdversarialError;
use crate::tensorshape::TensorShape;
use crate::FgsmFloat;
use itertools::Itertools;
use ndarray::{Array4, ArrayD, ArrayView3, ArrayViewD, Ix4};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Two-dimensional max pooling over channels-last images, without padding.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct MaxPool {
    pool_size: (usize, usize),
    strides: (usize, usize),
}

impl MaxPool {
    /// # Panics
    /// If the pool size or strides are zero
    pub fn new(pool_size: (usize, usize), strides: (usize, usize)) -> Self {
        assert!(pool_size.0 > 0 && pool_size.1 > 0);
        assert!(strides.0 > 0 && strides.1 > 0);
        Self { pool_size, strides }
    }

    /// Square pool with stride equal to its size.
    pub fn square(size: usize) -> Self {
        Self::new((size, size), (size, size))
    }

    fn output_hw(&self, h_in: usize, w_in: usize) -> Option<(usize, usize)> {
        if h_in < self.pool_size.0 || w_in < self.pool_size.1 {
            return None;
        }
        Some((
            (h_in - self.pool_size.0) / self.strides.0 + 1,
            (w_in - self.pool_size.1) / self.strides.1 + 1,
        ))
    }

    /// Position of the first maximum of the window feeding output pixel
    /// `(y_out, x_out)` in channel `c`.
    fn argmax(&self, data: &ArrayView3<FgsmFloat>, y_out: usize, x_out: usize, c: usize) -> (usize, usize) {
        let y_0 = y_out * self.strides.0;
        let x_0 = x_out * self.strides.1;
        (y_0..y_0 + self.pool_size.0)
            .cartesian_product(x_0..x_0 + self.pool_size.1)
            .fold((y_0, x_0), |best, (y, x)| {
                if data[[y, x, c]] > data[[best.0, best.1, c]] {
                    (y, x)
                } else {
                    best
                }
            })
    }

    fn mismatch(&self, input_shape: TensorShape) -> AdversarialError {
        AdversarialError::input_mismatch(
            TensorShape::new(vec![Some(self.pool_size.0), Some(self.pool_size.1), None]),
            input_shape,
        )
    }
}

#[typetag::serde]
impl Layer for MaxPool {
    fn output_shape(&self, input_shape: &TensorShape) -> Result<TensorShape, AdversarialError> {
        if input_shape.rank() != 3 {
            return Err(self.mismatch(input_shape.clone()));
        }
        match (input_shape[0], input_shape[1]) {
            (Some(h_in), Some(w_in)) => {
                let (h_out, w_out) = self
                    .output_hw(h_in, w_in)
                    .ok_or_else(|| self.mismatch(input_shape.clone()))?;
                Ok(TensorShape::new(vec![Some(h_out), Some(w_out), input_shape[2]]))
            }
            _ => Ok(TensorShape::new(vec![None, None, input_shape[2]])),
        }
    }

    fn forward(&self, input: ArrayViewD<FgsmFloat>) -> Result<ArrayD<FgsmFloat>, AdversarialError> {
        let input = input.into_dimensionality::<Ix4>()?;
        let (batch, h_in, w_in, channels) = input.dim();
        let (h_out, w_out) = self
            .output_hw(h_in, w_in)
            .ok_or_else(|| self.mismatch(TensorShape::from_batch_shape(input.shape())))?;
        let mut output = Array4::zeros((batch, h_out, w_out, channels));
        for (sample, mut out) in input.outer_iter().zip(output.outer_iter_mut()) {
            for ((y_out, x_out), c) in (0..h_out).cartesian_product(0..w_out).cartesian_product(0..channels) {
                let (y, x) = self.argmax(&sample, y_out, x_out, c);
                out[[y_out, x_out, c]] = sample[[y, x, c]];
            }
        }
        Ok(output.into_dyn())
    }

    /// Routes each output gradient to the first maximal element of its window.
    fn backward(
        &self,
        input: ArrayViewD<FgsmFloat>,
        output_grad: ArrayViewD<FgsmFloat>,
    ) -> Result<ArrayD<FgsmFloat>, AdversarialError> {
        let input = input.into_dimensionality::<Ix4>()?;
        let output_grad = output_grad.into_dimensionality::<Ix4>()?;
        let (_, h_out, w_out, channels) = output_grad.dim();
        let mut grad = Array4::zeros(input.raw_dim());
        for ((sample, out_grad), mut g) in input
            .outer_iter()
            .zip(output_grad.outer_iter())
            .zip(grad.outer_iter_mut())
        {
            for ((y_out, x_out), c) in (0..h_out).cartesian_product(0..w_out).cartesian_product(0..channels) {
                let (y, x) = self.argmax(&sample, y_out, x_out, c);
                g[[y, x, c]] += out_grad[[y_out, x_out, c]];
            }
        }
        Ok(grad.into_dyn())
    }
}

impl fmt::Display for MaxPool {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "MaxPool {}x{}", self.pool_size.0, self.pool_size.1)
    }
}
