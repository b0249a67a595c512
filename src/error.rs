use crate::tensorshape::TensorShape;
use ndarray::ShapeError;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ShapeMismatch {
    #[error("{images} images but {labels} labels")]
    BatchSize { images: usize, labels: usize },
    #[error("labels have {found} classes, classifier produces {expected}")]
    Labels { expected: usize, found: usize },
    #[error("input shape {found} is incompatible with expected {expected}")]
    Input {
        expected: TensorShape,
        found: TensorShape,
    },
}

#[derive(Debug, Error)]
pub enum AdversarialError {
    #[error("shape mismatch: {0}")]
    ShapeMismatch(#[from] ShapeMismatch),
    #[error("classifier `{classifier}` cannot differentiate its loss with respect to its input")]
    NonDifferentiableModel { classifier: String },
    #[error("reshape failed: {0}")]
    Reshape(#[from] ShapeError),
    #[error("invalid attack configuration: {0}")]
    InvalidConfig(String),
}

impl AdversarialError {
    pub const fn is_shape_mismatch(&self) -> bool {
        matches!(self, Self::ShapeMismatch(_))
    }

    pub(crate) fn input_mismatch(expected: TensorShape, found: TensorShape) -> Self {
        Self::ShapeMismatch(ShapeMismatch::Input { expected, found })
    }
}
