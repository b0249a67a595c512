use crate::dnn::layer::Layer;
use crate::error::AdversarialError;
use crate::tensorshape::TensorShape;
use crate::FgsmFloat;
use ndarray::{ArrayD, ArrayViewD, IxDyn};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Collapses every non-batch axis into one, in row-major order.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Flatten {}

impl Flatten {
    pub const fn new() -> Self {
        Self {}
    }
}

#[typetag::serde]
impl Layer for Flatten {
    fn output_shape(&self, input_shape: &TensorShape) -> Result<TensorShape, AdversarialError> {
        if !input_shape.is_fully_defined() {
            return Err(AdversarialError::input_mismatch(
                TensorShape::unknown(),
                input_shape.clone(),
            ));
        }
        Ok(TensorShape::from(vec![input_shape.dims()]))
    }

    fn forward(&self, input: ArrayViewD<FgsmFloat>) -> Result<ArrayD<FgsmFloat>, AdversarialError> {
        let batch = input.shape()[0];
        let per_example = input.shape()[1..].iter().product::<usize>();
        Ok(input
            .as_standard_layout()
            .into_owned()
            .into_shape(IxDyn(&[batch, per_example]))?)
    }

    fn backward(
        &self,
        input: ArrayViewD<FgsmFloat>,
        output_grad: ArrayViewD<FgsmFloat>,
    ) -> Result<ArrayD<FgsmFloat>, AdversarialError> {
        Ok(output_grad
            .as_standard_layout()
            .into_owned()
            .into_shape(input.raw_dim())?)
    }
}

impl fmt::Display for Flatten {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Flatten")
    }
}
