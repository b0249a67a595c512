//! The classifier capability consumed by the adversarial generators
use crate::dnn::DNN;
use crate::error::AdversarialError;
use crate::loss::CategoricalCrossentropy;
use crate::tape::GradientTape;
use crate::tensorshape::TensorShape;
use crate::FgsmFloat;
use ndarray::{Array2, ArrayD, ArrayView2, ArrayViewD, Ix2};
use std::fmt;

/// Maps a batch of images to per-class probabilities.
///
/// Implementations must not change observable state while predicting or
/// differentiating; both operations take `&self`.
pub trait Classifier {
    fn name(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }

    /// Shape of a single example the classifier accepts.
    fn input_shape(&self) -> TensorShape {
        TensorShape::unknown()
    }

    fn num_classes(&self) -> Option<usize> {
        None
    }

    /// # Errors
    /// `ShapeMismatch` if the classifier cannot consume `images`
    fn predict(&self, images: ArrayViewD<FgsmFloat>) -> Result<Array2<FgsmFloat>, AdversarialError>;

    /// Gradient of `loss(labels, predict(images))` with respect to `images`.
    ///
    /// # Errors
    /// `NonDifferentiableModel` unless the classifier overrides this method,
    /// `ShapeMismatch` if `images` and `labels` do not fit the classifier
    fn gradient_of_loss_wrt_input(
        &self,
        _images: ArrayViewD<FgsmFloat>,
        _labels: ArrayView2<FgsmFloat>,
        _loss: &CategoricalCrossentropy,
    ) -> Result<ArrayD<FgsmFloat>, AdversarialError> {
        Err(AdversarialError::NonDifferentiableModel {
            classifier: self.name(),
        })
    }
}

impl Classifier for DNN {
    fn name(&self) -> String {
        format!("{}", self)
    }

    fn input_shape(&self) -> TensorShape {
        DNN::input_shape(self)
    }

    fn num_classes(&self) -> Option<usize> {
        let output = self.output_shape(&DNN::input_shape(self)).ok()?;
        if output.rank() == 1 {
            output[0]
        } else {
            None
        }
    }

    fn predict(&self, images: ArrayViewD<FgsmFloat>) -> Result<Array2<FgsmFloat>, AdversarialError> {
        let output = self.forward(images)?;
        check_probability_rank(&output.view())?;
        Ok(output.into_dimensionality::<Ix2>()?)
    }

    fn gradient_of_loss_wrt_input(
        &self,
        images: ArrayViewD<FgsmFloat>,
        labels: ArrayView2<FgsmFloat>,
        loss: &CategoricalCrossentropy,
    ) -> Result<ArrayD<FgsmFloat>, AdversarialError> {
        let tape = GradientTape::watch(self, images)?;
        let loss_grad = {
            check_probability_rank(&tape.output())?;
            let predictions = tape.output().into_dimensionality::<Ix2>()?;
            loss.gradient(labels, predictions)?
        };
        tape.gradient(loss_grad.into_dyn().view())
    }
}

/// A network used as a classifier must end in one probability vector per example.
fn check_probability_rank(output: &ArrayViewD<FgsmFloat>) -> Result<(), AdversarialError> {
    if output.ndim() == 2 {
        Ok(())
    } else {
        Err(AdversarialError::input_mismatch(
            TensorShape::new(vec![None]),
            TensorShape::from_batch_shape(output.shape()),
        ))
    }
}

/// A classifier known only through its predictions, e.g. a remote or
/// compiled model. It cannot be differentiated.
pub struct OpaqueClassifier<F> {
    name: String,
    input_shape: TensorShape,
    predict_fn: F,
}

impl<F> OpaqueClassifier<F>
where
    F: Fn(ArrayViewD<FgsmFloat>) -> Array2<FgsmFloat>,
{
    pub fn new(name: impl Into<String>, input_shape: TensorShape, predict_fn: F) -> Self {
        Self {
            name: name.into(),
            input_shape,
            predict_fn,
        }
    }
}

impl<F> Classifier for OpaqueClassifier<F>
where
    F: Fn(ArrayViewD<FgsmFloat>) -> Array2<FgsmFloat>,
{
    fn name(&self) -> String {
        self.name.clone()
    }

    fn input_shape(&self) -> TensorShape {
        self.input_shape.clone()
    }

    fn predict(&self, images: ArrayViewD<FgsmFloat>) -> Result<Array2<FgsmFloat>, AdversarialError> {
        let example_shape = TensorShape::from_batch_shape(images.shape());
        if !self.input_shape.is_compatible_with(&example_shape) {
            return Err(AdversarialError::input_mismatch(
                self.input_shape.clone(),
                example_shape,
            ));
        }
        Ok((self.predict_fn)(images))
    }
}

impl<F> fmt::Debug for OpaqueClassifier<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("OpaqueClassifier")
            .field("name", &self.name)
            .field("input_shape", &self.input_shape)
            .finish()
    }
}
