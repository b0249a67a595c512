use crate::dnn::layer::Layer;
use crate::error::AdversarialError;
use crate::tensorshape::TensorShape;
use crate::FgsmFloat;
use ndarray::{ArrayD, ArrayViewD, Zip};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result};

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct ReLU {}

impl ReLU {
    pub const fn new() -> Self {
        Self {}
    }
}

impl Display for ReLU {
    fn fmt(&self, f: &mut Formatter) -> Result {
        write!(f, "ReLU")
    }
}

#[typetag::serde]
impl Layer for ReLU {
    fn output_shape(
        &self,
        input_shape: &TensorShape,
    ) -> std::result::Result<TensorShape, AdversarialError> {
        Ok(input_shape.clone())
    }

    fn forward(
        &self,
        input: ArrayViewD<FgsmFloat>,
    ) -> std::result::Result<ArrayD<FgsmFloat>, AdversarialError> {
        Ok(input.mapv(|x| if x.lt(&0.) { 0. } else { x }))
    }

    /// The subgradient at zero is taken to be zero.
    fn backward(
        &self,
        input: ArrayViewD<FgsmFloat>,
        output_grad: ArrayViewD<FgsmFloat>,
    ) -> std::result::Result<ArrayD<FgsmFloat>, AdversarialError> {
        let mut grad = output_grad.to_owned();
        Zip::from(&mut grad)
            .and(&input)
            .for_each(|g, &x| if x <= 0. { *g = 0. });
        Ok(grad)
    }

    fn is_activation(&self) -> bool {
        true
    }
}
