#![allow(clippy::similar_names)]
//! Two-dimensional convolution over channels-last images
use crate::dnn::layer::Layer;
use crate::error::AdversarialError;
use crate::tensorshape::TensorShape;
use crate::FgsmFloat;
use itertools::Itertools;
use ndarray::{Array1, Array3, Array4, ArrayD, ArrayView3, ArrayViewD, Ix4};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Weights are of the shape: (`kernel_h`, `kernel_w`, `channels_in`, `channels_out`)
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Conv {
    kernel: Array4<FgsmFloat>, // (K_h, K_w, C_in, C_out) following tf convention
    bias: Array1<FgsmFloat>,   // (C_out)
    strides: (usize, usize),
    padding: ((usize, usize), (usize, usize)), // ((top, bottom), (left, right))
}

impl Conv {
    /// # Panics
    /// If improper shapes are passed in
    pub fn new(
        kernel: Array4<FgsmFloat>,
        bias: Array1<FgsmFloat>,
        strides: (usize, usize),
        padding: ((usize, usize), (usize, usize)),
    ) -> Self {
        assert_eq!(kernel.shape()[3], bias.len());
        assert!(strides.0 > 0 && strides.1 > 0);
        Self {
            kernel,
            bias,
            strides,
            padding,
        }
    }

    /// Stride one with zero padding that preserves the spatial size.
    pub fn same(kernel: Array4<FgsmFloat>, bias: Array1<FgsmFloat>) -> Self {
        let padding = (
            Self::same_padding(kernel.shape()[0]),
            Self::same_padding(kernel.shape()[1]),
        );
        Self::new(kernel, bias, (1, 1), padding)
    }

    fn same_padding(kernel_size: usize) -> (usize, usize) {
        let total = kernel_size.saturating_sub(1);
        (total / 2, total - total / 2)
    }

    pub fn input_channels(&self) -> usize {
        self.kernel.shape()[2]
    }

    pub fn output_channels(&self) -> usize {
        self.kernel.shape()[3]
    }

    fn output_hw(&self, h_in: usize, w_in: usize) -> Option<(usize, usize)> {
        let k_h = self.kernel.shape()[0];
        let k_w = self.kernel.shape()[1];
        let padded_h = h_in + self.padding.0 .0 + self.padding.0 .1;
        let padded_w = w_in + self.padding.1 .0 + self.padding.1 .1;
        if padded_h < k_h || padded_w < k_w {
            return None;
        }
        Some((
            (padded_h - k_h) / self.strides.0 + 1,
            (padded_w - k_w) / self.strides.1 + 1,
        ))
    }

    /// Visits every (output, input, kernel) index triple that contributes to
    /// the convolution. Padding is zero, so out-of-bounds taps are skipped.
    fn for_each_tap<F>(&self, h_in: usize, w_in: usize, h_out: usize, w_out: usize, mut f: F)
    where
        F: FnMut((usize, usize), (usize, usize), (usize, usize)),
    {
        let k_h = self.kernel.shape()[0];
        let k_w = self.kernel.shape()[1];
        for (y_out, x_out) in (0..h_out).cartesian_product(0..w_out) {
            let y_0 = y_out * self.strides.0;
            let x_0 = x_out * self.strides.1;

            for k_y in 0..k_h {
                if y_0 + k_y < self.padding.0 .0 || y_0 + k_y >= h_in + self.padding.0 .0 {
                    continue;
                }
                let y_in = y_0 + k_y - self.padding.0 .0;
                for k_x in 0..k_w {
                    if x_0 + k_x < self.padding.1 .0 || x_0 + k_x >= w_in + self.padding.1 .0 {
                        continue;
                    }
                    let x_in = x_0 + k_x - self.padding.1 .0;
                    f((y_out, x_out), (y_in, x_in), (k_y, k_x));
                }
            }
        }
    }

    /// # Panics
    /// If `data` does not have `input_channels` channels or is smaller than the kernel
    pub fn convolve(&self, data: ArrayView3<FgsmFloat>) -> Array3<FgsmFloat> {
        let (h_in, w_in, c_in) = data.dim();
        assert_eq!(c_in, self.input_channels());
        let (h_out, w_out) = self.output_hw(h_in, w_in).unwrap();
        let c_out = self.output_channels();

        let mut output = Array3::<FgsmFloat>::zeros((h_out, w_out, c_out));
        for mut pixel in output.lanes_mut(ndarray::Axis(2)) {
            pixel.assign(&self.bias);
        }
        self.for_each_tap(h_in, w_in, h_out, w_out, |(y_out, x_out), (y_in, x_in), (k_y, k_x)| {
            for f_in in 0..c_in {
                for f_out in 0..c_out {
                    output[[y_out, x_out, f_out]] +=
                        data[[y_in, x_in, f_in]] * self.kernel[[k_y, k_x, f_in, f_out]];
                }
            }
        });
        output
    }

    /// Gradient with respect to one input image, given the gradient with
    /// respect to the corresponding output.
    pub fn convolve_backward(
        &self,
        input_dim: (usize, usize, usize),
        output_grad: ArrayView3<FgsmFloat>,
    ) -> Array3<FgsmFloat> {
        let (h_in, w_in, c_in) = input_dim;
        let (h_out, w_out, c_out) = output_grad.dim();
        let mut grad = Array3::<FgsmFloat>::zeros(input_dim);
        self.for_each_tap(h_in, w_in, h_out, w_out, |(y_out, x_out), (y_in, x_in), (k_y, k_x)| {
            for f_in in 0..c_in {
                for f_out in 0..c_out {
                    grad[[y_in, x_in, f_in]] +=
                        output_grad[[y_out, x_out, f_out]] * self.kernel[[k_y, k_x, f_in, f_out]];
                }
            }
        });
        grad
    }
}

#[typetag::serde]
impl Layer for Conv {
    fn input_shape(&self) -> TensorShape {
        TensorShape::new(vec![None, None, Some(self.input_channels())])
    }

    fn output_shape(&self, input_shape: &TensorShape) -> Result<TensorShape, AdversarialError> {
        let mismatch = || AdversarialError::input_mismatch(self.input_shape(), input_shape.clone());
        if input_shape.rank() != 3 || !self.input_shape().is_compatible_with(input_shape) {
            return Err(mismatch());
        }
        match (input_shape[0], input_shape[1]) {
            (Some(h_in), Some(w_in)) => {
                let (h_out, w_out) = self.output_hw(h_in, w_in).ok_or_else(mismatch)?;
                Ok(TensorShape::from(vec![h_out, w_out, self.output_channels()]))
            }
            _ => Ok(TensorShape::new(vec![None, None, Some(self.output_channels())])),
        }
    }

    fn forward(&self, input: ArrayViewD<FgsmFloat>) -> Result<ArrayD<FgsmFloat>, AdversarialError> {
        let input = input.into_dimensionality::<Ix4>()?;
        let (batch, h_in, w_in, c_in) = input.dim();
        let hw_out = self
            .output_hw(h_in, w_in)
            .filter(|_| c_in == self.input_channels());
        let (h_out, w_out) = hw_out.ok_or_else(|| {
            AdversarialError::input_mismatch(
                self.input_shape(),
                TensorShape::from_batch_shape(input.shape()),
            )
        })?;
        let mut output = Array4::zeros((batch, h_out, w_out, self.output_channels()));
        for (sample, mut out) in input.outer_iter().zip(output.outer_iter_mut()) {
            out.assign(&self.convolve(sample));
        }
        Ok(output.into_dyn())
    }

    fn backward(
        &self,
        input: ArrayViewD<FgsmFloat>,
        output_grad: ArrayViewD<FgsmFloat>,
    ) -> Result<ArrayD<FgsmFloat>, AdversarialError> {
        let input = input.into_dimensionality::<Ix4>()?;
        let output_grad = output_grad.into_dimensionality::<Ix4>()?;
        let (_, h_in, w_in, c_in) = input.dim();
        let mut grad = Array4::zeros(input.raw_dim());
        for (out_grad, mut g) in output_grad.outer_iter().zip(grad.outer_iter_mut()) {
            g.assign(&self.convolve_backward((h_in, w_in, c_in), out_grad));
        }
        Ok(grad.into_dyn())
    }
}

impl fmt::Display for Conv {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Conv {}x{}, {}",
            self.kernel.shape()[0],
            self.kernel.shape()[1],
            self.output_channels()
        )
    }
}
