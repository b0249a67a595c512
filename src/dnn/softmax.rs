use crate::dnn::layer::Layer;
use crate::error::AdversarialError;
use crate::tensorshape::TensorShape;
use crate::FgsmFloat;
use ndarray::{Array2, ArrayD, ArrayView2, ArrayViewD, Axis, Ix2, Zip};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Row-wise softmax over a batch of logit vectors.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Softmax {}

impl Softmax {
    pub const fn new() -> Self {
        Self {}
    }

    pub fn probabilities(logits: &ArrayView2<FgsmFloat>) -> Array2<FgsmFloat> {
        let mut probs = logits.to_owned();
        for mut row in probs.rows_mut() {
            let max = row.fold(FgsmFloat::NEG_INFINITY, |m, &x| m.max(x));
            row.mapv_inplace(|x| (x - max).exp());
            let total = row.sum();
            row /= total;
        }
        probs
    }
}

#[typetag::serde]
impl Layer for Softmax {
    fn output_shape(&self, input_shape: &TensorShape) -> Result<TensorShape, AdversarialError> {
        if input_shape.rank() != 1 {
            return Err(AdversarialError::input_mismatch(
                TensorShape::new(vec![None]),
                input_shape.clone(),
            ));
        }
        Ok(input_shape.clone())
    }

    fn forward(&self, input: ArrayViewD<FgsmFloat>) -> Result<ArrayD<FgsmFloat>, AdversarialError> {
        let logits = input.into_dimensionality::<Ix2>()?;
        Ok(Self::probabilities(&logits).into_dyn())
    }

    fn backward(
        &self,
        input: ArrayViewD<FgsmFloat>,
        output_grad: ArrayViewD<FgsmFloat>,
    ) -> Result<ArrayD<FgsmFloat>, AdversarialError> {
        let probs = Self::probabilities(&input.into_dimensionality::<Ix2>()?);
        let output_grad = output_grad.into_dimensionality::<Ix2>()?;
        // dz = p * (g - <p, g>)
        let inner = (&probs * &output_grad).sum_axis(Axis(1));
        let mut grad = Array2::zeros(probs.raw_dim());
        Zip::from(grad.rows_mut())
            .and(probs.rows())
            .and(output_grad.rows())
            .and(&inner)
            .for_each(|mut g, p, og, &dot| {
                Zip::from(&mut g)
                    .and(&p)
                    .and(&og)
                    .for_each(|g, &p, &og| *g = p * (og - dot));
            });
        Ok(grad.into_dyn())
    }

    fn is_activation(&self) -> bool {
        true
    }
}

impl fmt::Display for Softmax {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Softmax")
    }
}
