use crate::dnn::layer::Layer;
use crate::error::AdversarialError;
use crate::tensorshape::TensorShape;
use crate::FgsmFloat;
use ndarray::{ArrayD, ArrayViewD};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Dropout is the identity outside of training.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Dropout {
    prob: FgsmFloat,
}

impl Dropout {
    pub const fn new(prob: FgsmFloat) -> Self {
        Self { prob }
    }

    pub const fn prob(&self) -> FgsmFloat {
        self.prob
    }
}

#[typetag::serde]
impl Layer for Dropout {
    fn output_shape(&self, input_shape: &TensorShape) -> Result<TensorShape, AdversarialError> {
        Ok(input_shape.clone())
    }

    fn forward(&self, input: ArrayViewD<FgsmFloat>) -> Result<ArrayD<FgsmFloat>, AdversarialError> {
        Ok(input.to_owned())
    }

    fn backward(
        &self,
        _input: ArrayViewD<FgsmFloat>,
        output_grad: ArrayViewD<FgsmFloat>,
    ) -> Result<ArrayD<FgsmFloat>, AdversarialError> {
        Ok(output_grad.to_owned())
    }
}

impl fmt::Display for Dropout {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Dropout {}", self.prob)
    }
}
