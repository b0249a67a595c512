use crate::dnn::layer::{same_shape, Layer};
use crate::error::AdversarialError;
use crate::tensorshape::TensorShape;
use crate::FgsmFloat;
use ndarray::{Array1, ArrayD, ArrayViewD, Axis, Zip};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Batch normalization over the last (channel) axis using stored moving
/// statistics. Batch statistics are never computed or updated.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct BatchNorm {
    gamma: Array1<FgsmFloat>,
    beta: Array1<FgsmFloat>,
    moving_mean: Array1<FgsmFloat>,
    moving_variance: Array1<FgsmFloat>,
    epsilon: FgsmFloat,
}

impl BatchNorm {
    pub const DEFAULT_EPSILON: FgsmFloat = 1e-3;

    /// # Panics
    /// If the parameter vectors differ in length
    pub fn new(
        gamma: Array1<FgsmFloat>,
        beta: Array1<FgsmFloat>,
        moving_mean: Array1<FgsmFloat>,
        moving_variance: Array1<FgsmFloat>,
        epsilon: FgsmFloat,
    ) -> Self {
        let channels = gamma.len();
        assert_eq!(beta.len(), channels);
        assert_eq!(moving_mean.len(), channels);
        assert_eq!(moving_variance.len(), channels);
        Self {
            gamma,
            beta,
            moving_mean,
            moving_variance,
            epsilon,
        }
    }

    /// Freshly initialised statistics: the layer is the identity up to epsilon.
    pub fn identity(channels: usize) -> Self {
        Self::new(
            Array1::ones(channels),
            Array1::zeros(channels),
            Array1::zeros(channels),
            Array1::ones(channels),
            Self::DEFAULT_EPSILON,
        )
    }

    pub fn channels(&self) -> usize {
        self.gamma.len()
    }

    fn scale(&self) -> Array1<FgsmFloat> {
        Zip::from(&self.gamma)
            .and(&self.moving_variance)
            .map_collect(|&g, &v| g / (v + self.epsilon).sqrt())
    }
}

#[typetag::serde]
impl Layer for BatchNorm {
    fn output_shape(&self, input_shape: &TensorShape) -> Result<TensorShape, AdversarialError> {
        let rank = input_shape.rank().max(1);
        let mut expected = vec![None; rank - 1];
        expected.push(Some(self.channels()));
        same_shape(&TensorShape::new(expected), input_shape)
    }

    fn forward(&self, input: ArrayViewD<FgsmFloat>) -> Result<ArrayD<FgsmFloat>, AdversarialError> {
        self.output_shape(&TensorShape::from_batch_shape(input.shape()))?;
        let scale = self.scale();
        let mut output = input.to_owned();
        let channel_axis = Axis(output.ndim() - 1);
        for mut lane in output.lanes_mut(channel_axis) {
            Zip::from(&mut lane)
                .and(&self.moving_mean)
                .and(&scale)
                .and(&self.beta)
                .for_each(|x, &m, &s, &b| *x = (*x - m) * s + b);
        }
        Ok(output)
    }

    fn backward(
        &self,
        _input: ArrayViewD<FgsmFloat>,
        output_grad: ArrayViewD<FgsmFloat>,
    ) -> Result<ArrayD<FgsmFloat>, AdversarialError> {
        let scale = self.scale();
        let mut grad = output_grad.to_owned();
        let channel_axis = Axis(grad.ndim() - 1);
        for mut lane in grad.lanes_mut(channel_axis) {
            lane *= &scale;
        }
        Ok(grad)
    }
}

impl fmt::Display for BatchNorm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "BatchNorm {}", self.channels())
    }
}
