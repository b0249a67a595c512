use crate::error::AdversarialError;
use crate::tensorshape::TensorShape;
use crate::FgsmFloat;
use dyn_clone::DynClone;
use ndarray::{ArrayD, ArrayViewD};
use std::fmt::{Debug, Display};

/// A layer of a sequential network, evaluated in inference mode.
///
/// Every array passed to or returned from a layer carries a leading batch
/// axis. Shapes reported by [`Layer::input_shape`] and [`Layer::output_shape`]
/// describe a single example.
#[typetag::serde(tag = "type")]
pub trait Layer: DynClone + Display + Debug + Send + Sync {
    /// Shape of the examples the layer accepts.
    fn input_shape(&self) -> TensorShape {
        TensorShape::unknown()
    }

    /// Shape of the examples the layer produces from examples of `input_shape`.
    ///
    /// # Errors
    /// `ShapeMismatch` if the layer cannot consume `input_shape`
    fn output_shape(&self, input_shape: &TensorShape) -> Result<TensorShape, AdversarialError>;

    /// # Errors
    fn forward(&self, input: ArrayViewD<FgsmFloat>) -> Result<ArrayD<FgsmFloat>, AdversarialError>;

    /// Vector-Jacobian product with respect to the layer's input.
    ///
    /// `input` is the batch the forward pass consumed and `output_grad` the
    /// gradient of a scalar with respect to the forward pass's output.
    ///
    /// # Errors
    fn backward(
        &self,
        input: ArrayViewD<FgsmFloat>,
        output_grad: ArrayViewD<FgsmFloat>,
    ) -> Result<ArrayD<FgsmFloat>, AdversarialError>;

    fn is_activation(&self) -> bool {
        // This should be implemented in activation layers to return true
        false
    }
}

dyn_clone::clone_trait_object!(Layer);

/// Checks that `input_shape` matches `expected` and passes it through.
pub(crate) fn same_shape(
    expected: &TensorShape,
    input_shape: &TensorShape,
) -> Result<TensorShape, AdversarialError> {
    if expected.is_compatible_with(input_shape) {
        Ok(input_shape.clone())
    } else {
        Err(AdversarialError::input_mismatch(
            expected.clone(),
            input_shape.clone(),
        ))
    }
}
