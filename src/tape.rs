//! Scoped recording of a forward pass for input gradients.
//!
//! ## Tape lifecycle
//! 1. [`GradientTape::watch`] begins tracking an input batch and runs the
//!    network over it, keeping every intermediate activation.
//! 2. [`GradientTape::output`] exposes the recorded prediction so a loss and
//!    its gradient can be computed.
//! 3. [`GradientTape::gradient`] consumes the tape, pulls the loss gradient
//!    back to the watched input, and releases the recorded activations.
//!
//! A tape yields exactly one gradient; recording again requires a new tape.
use crate::dnn::DNN;
use crate::error::AdversarialError;
use crate::tensorshape::TensorShape;
use crate::FgsmFloat;
use log::trace;
use ndarray::{ArrayD, ArrayViewD};

pub struct GradientTape<'a> {
    dnn: &'a DNN,
    /// Input of each layer, in order; the last entry is the network output.
    activations: Vec<ArrayD<FgsmFloat>>,
}

impl<'a> GradientTape<'a> {
    /// Starts tracking `input` and records a forward pass of `dnn` over it.
    ///
    /// # Errors
    /// `ShapeMismatch` if `input` does not fit the network
    pub fn watch(dnn: &'a DNN, input: ArrayViewD<FgsmFloat>) -> Result<Self, AdversarialError> {
        dnn.check_input(&input)?;
        let mut activations = Vec::with_capacity(dnn.layers().len() + 1);
        let mut current = input.to_owned();
        for layer in dnn.layers() {
            let next = layer.forward(current.view())?;
            activations.push(current);
            current = next;
        }
        activations.push(current);
        trace!("tape recorded {} activations", activations.len());
        Ok(Self { dnn, activations })
    }

    pub fn watched(&self) -> ArrayViewD<FgsmFloat> {
        self.activations[0].view()
    }

    pub fn output(&self) -> ArrayViewD<FgsmFloat> {
        self.activations[self.activations.len() - 1].view()
    }

    /// Gradient of a scalar with respect to the watched input, given the
    /// gradient of that scalar with respect to [`GradientTape::output`].
    ///
    /// # Errors
    /// `ShapeMismatch` if `output_grad` is not shaped like the output
    pub fn gradient(
        self,
        output_grad: ArrayViewD<FgsmFloat>,
    ) -> Result<ArrayD<FgsmFloat>, AdversarialError> {
        if output_grad.shape() != self.output().shape() {
            return Err(AdversarialError::input_mismatch(
                TensorShape::from(self.output().shape().to_vec()),
                TensorShape::from(output_grad.shape().to_vec()),
            ));
        }
        self.dnn
            .layers()
            .iter()
            .zip(self.activations.iter())
            .rev()
            .try_fold(output_grad.to_owned(), |grad, (layer, input)| {
                trace!("backward {} on {:?}", layer, input.shape());
                layer.backward(input.view(), grad.view())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dnn::{Dense, ReLU, Softmax};
    use ndarray::{array, Array1};

    #[test]
    fn test_linear_gradient_is_basis_sum() {
        let dnn = DNN::new(vec![Box::new(Dense::from_parts(
            array![[1., 2.], [-3., 4.]],
            Array1::zeros(2),
        ))]);
        let input = array![[0.5, 0.5]].into_dyn();
        let tape = GradientTape::watch(&dnn, input.view()).unwrap();
        assert_eq!(tape.output(), array![[1.5, 0.5]].into_dyn());
        let grad = tape.gradient(array![[1., 1.]].into_dyn().view()).unwrap();
        assert_eq!(grad, array![[-2., 6.]].into_dyn());
    }

    #[test]
    fn test_watched_input_is_untouched() {
        let dnn = DNN::new(vec![
            Box::new(ReLU::new()),
            Box::new(Softmax::new()),
        ]);
        let input = array![[-1., 2., 0.25]].into_dyn();
        let tape = GradientTape::watch(&dnn, input.view()).unwrap();
        assert_eq!(tape.watched(), input.view());
        let _grad = tape.gradient(array![[1., 0., 0.]].into_dyn().view()).unwrap();
        assert_eq!(input, array![[-1., 2., 0.25]].into_dyn());
    }

    #[test]
    fn test_gradient_rejects_misshaped_seed() {
        let dnn = DNN::new(vec![Box::new(Softmax::new())]);
        let tape = GradientTape::watch(&dnn, array![[0., 1.]].into_dyn().view()).unwrap();
        let err = tape.gradient(array![[1., 0., 0.]].into_dyn().view()).unwrap_err();
        assert!(err.is_shape_mismatch());
    }
}
