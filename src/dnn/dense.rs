use crate::affine::Affine2;
use crate::dnn::layer::Layer;
use crate::error::AdversarialError;
use crate::tensorshape::TensorShape;
use crate::FgsmFloat;
use ndarray::{Array1, Array2, ArrayD, ArrayViewD, Ix2};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Dense {
    aff: Affine2,
}

impl Dense {
    pub const fn new(aff: Affine2) -> Self {
        Self { aff }
    }

    pub fn from_parts(mul: Array2<FgsmFloat>, add: Array1<FgsmFloat>) -> Self {
        Self {
            aff: Affine2::new(mul, add),
        }
    }

    pub const fn affine(&self) -> &Affine2 {
        &self.aff
    }

    fn width_mismatch(expected: usize, found: usize) -> AdversarialError {
        AdversarialError::input_mismatch(TensorShape::from(vec![expected]), TensorShape::from(vec![found]))
    }
}

#[typetag::serde]
impl Layer for Dense {
    fn input_shape(&self) -> TensorShape {
        TensorShape::new(vec![Some(self.aff.input_dim())])
    }

    fn output_shape(&self, input_shape: &TensorShape) -> Result<TensorShape, AdversarialError> {
        let expected = self.input_shape();
        if input_shape.rank() != 1 || !expected.is_compatible_with(input_shape) {
            return Err(AdversarialError::input_mismatch(
                expected,
                input_shape.clone(),
            ));
        }
        Ok(TensorShape::new(vec![Some(self.aff.output_dim())]))
    }

    fn forward(&self, input: ArrayViewD<FgsmFloat>) -> Result<ArrayD<FgsmFloat>, AdversarialError> {
        let input = input.into_dimensionality::<Ix2>()?;
        if input.ncols() != self.aff.input_dim() {
            return Err(Self::width_mismatch(self.aff.input_dim(), input.ncols()));
        }
        Ok(self.aff.apply_batch(&input).into_dyn())
    }

    fn backward(
        &self,
        _input: ArrayViewD<FgsmFloat>,
        output_grad: ArrayViewD<FgsmFloat>,
    ) -> Result<ArrayD<FgsmFloat>, AdversarialError> {
        let output_grad = output_grad.into_dimensionality::<Ix2>()?;
        if output_grad.ncols() != self.aff.output_dim() {
            return Err(Self::width_mismatch(self.aff.output_dim(), output_grad.ncols()));
        }
        Ok(self.aff.backprop_batch(&output_grad).into_dyn())
    }
}

impl fmt::Display for Dense {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Dense {}", self.aff.output_dim())
    }
}
