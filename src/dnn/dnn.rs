use crate::dnn::Layer;
use crate::error::AdversarialError;
use crate::tensorshape::TensorShape;
use crate::FgsmFloat;
use log::trace;
use ndarray::{ArrayD, ArrayViewD};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sequential network evaluated in inference mode.
#[derive(Clone, Default, Debug, Serialize, Deserialize)]
pub struct DNN {
    layers: Vec<Box<dyn Layer>>,
}

impl DNN {
    pub fn new(layers: Vec<Box<dyn Layer>>) -> Self {
        Self { layers }
    }

    pub fn from_sequential(layers: &[Box<dyn Layer>]) -> Self {
        Self {
            layers: layers.to_vec(),
        }
    }

    pub fn add_layer(&mut self, layer: Box<dyn Layer>) {
        self.layers.push(layer);
    }

    pub fn get_layer(&self, idx: usize) -> Option<&dyn Layer> {
        self.layers.get(idx).map(Box::as_ref)
    }

    pub fn layers(&self) -> &[Box<dyn Layer>] {
        &self.layers
    }

    pub fn input_shape(&self) -> TensorShape {
        self.layers
            .first()
            .map_or_else(TensorShape::unknown, |layer| layer.input_shape())
    }

    /// Propagates an example shape through every layer.
    ///
    /// # Errors
    /// `ShapeMismatch` naming the first layer that rejects its input
    pub fn output_shape(&self, input_shape: &TensorShape) -> Result<TensorShape, AdversarialError> {
        self.layers
            .iter()
            .try_fold(input_shape.clone(), |shape, layer| {
                layer.output_shape(&shape)
            })
    }

    /// Checks a batched input against the network, returning the shape of
    /// each output example.
    ///
    /// # Errors
    pub fn check_input(&self, input: &ArrayViewD<FgsmFloat>) -> Result<TensorShape, AdversarialError> {
        if input.ndim() == 0 {
            return Err(AdversarialError::input_mismatch(
                self.input_shape(),
                TensorShape::new(vec![]),
            ));
        }
        let example_shape = TensorShape::from_batch_shape(input.shape());
        if !self.input_shape().is_compatible_with(&example_shape) {
            return Err(AdversarialError::input_mismatch(
                self.input_shape(),
                example_shape,
            ));
        }
        self.output_shape(&example_shape)
    }

    /// # Errors
    /// `ShapeMismatch` if the batch does not fit the network
    pub fn forward(&self, input: ArrayViewD<FgsmFloat>) -> Result<ArrayD<FgsmFloat>, AdversarialError> {
        self.check_input(&input)?;
        self.layers
            .iter()
            .try_fold(input.to_owned(), |x, layer| {
                trace!("forward {} on {:?}", layer, x.shape());
                layer.forward(x.view())
            })
    }
}

impl fmt::Display for DNN {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let layers: Vec<String> = self.layers.iter().map(|x| format!("{}", x)).collect();
        write!(f, "Input {} => {}", self.input_shape(), layers.join(" => "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dnn::{BatchNorm, Conv, Dense, Flatten, MaxPool, ReLU, Softmax};
    use ndarray::{Array, Array1, Array2, Array4, IxDyn};

    fn small_cnn() -> DNN {
        DNN::new(vec![
            Box::new(Conv::same(Array4::ones((3, 3, 1, 2)), Array1::zeros(2))),
            Box::new(BatchNorm::identity(2)),
            Box::new(ReLU::new()),
            Box::new(MaxPool::square(2)),
            Box::new(Flatten::new()),
            Box::new(Dense::from_parts(Array2::ones((3, 8)), Array1::zeros(3))),
            Box::new(Softmax::new()),
        ])
    }

    #[test]
    fn test_shape_propagation() {
        let dnn = small_cnn();
        let out = dnn
            .output_shape(&TensorShape::from(vec![4, 4, 1]))
            .unwrap();
        assert_eq!(out, TensorShape::from(vec![3]));
        assert_eq!(dnn.input_shape(), TensorShape::new(vec![None, None, Some(1)]));
    }

    #[test]
    fn test_forward_produces_distributions() {
        let dnn = small_cnn();
        let input = Array::from_shape_fn(IxDyn(&[2, 4, 4, 1]), |idx| (idx[1] + idx[2]) as f64 / 8.);
        let out = dnn.forward(input.view()).unwrap();
        assert_eq!(out.shape(), &[2, 3]);
        for row in out.rows() {
            assert!((row.sum() - 1.).abs() < 1e-12);
        }
    }

    #[test]
    fn test_rejects_wrong_channels() {
        let dnn = small_cnn();
        let input = Array::zeros(IxDyn(&[1, 4, 4, 3]));
        let err = dnn.forward(input.view()).unwrap_err();
        assert!(err.is_shape_mismatch());
    }

    #[test]
    fn test_dense_rejects_wrong_width() {
        let dense = Dense::from_parts(Array2::zeros((2, 4)), Array1::zeros(2));
        let err = dense.forward(Array::zeros(IxDyn(&[1, 3])).view()).unwrap_err();
        assert!(err.is_shape_mismatch());
        let err = dense
            .backward(Array::zeros(IxDyn(&[1, 4])).view(), Array::zeros(IxDyn(&[1, 3])).view())
            .unwrap_err();
        assert!(err.is_shape_mismatch());
    }

    #[test]
    fn test_rejects_wrong_flattened_width() {
        let dnn = small_cnn();
        // 6x6 pools to 3x3x2 = 18 features, but the dense layer expects 8
        let input = Array::zeros(IxDyn(&[1, 6, 6, 1]));
        assert!(dnn.forward(input.view()).unwrap_err().is_shape_mismatch());
    }

    #[test]
    fn test_serde_roundtrip_keeps_layers() {
        let dnn = small_cnn();
        let json = serde_json::to_string(&dnn).unwrap();
        let restored: DNN = serde_json::from_str(&json).unwrap();
        assert_eq!(format!("{}", restored), format!("{}", dnn));
        assert_eq!(restored.layers().len(), 7);
    }
}
