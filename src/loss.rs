//! Categorical cross-entropy over probability outputs
use crate::error::{AdversarialError, ShapeMismatch};
use crate::FgsmFloat;
use ndarray::{Array2, ArrayView2, Axis, Zip};
use serde::{Deserialize, Serialize};

/// Cross-entropy between label distributions and predicted probabilities,
/// averaged over the batch.
///
/// Each prediction row is rescaled to sum to one and clipped into
/// `[epsilon, 1 - epsilon]` before taking the logarithm, so `epsilon` must
/// lie in `(0, 0.5)`.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
#[serde(try_from = "CrossentropyParams")]
pub struct CategoricalCrossentropy {
    epsilon: FgsmFloat,
}

#[derive(Deserialize)]
struct CrossentropyParams {
    epsilon: FgsmFloat,
}

impl TryFrom<CrossentropyParams> for CategoricalCrossentropy {
    type Error = AdversarialError;

    fn try_from(params: CrossentropyParams) -> Result<Self, Self::Error> {
        Self::new(params.epsilon)
    }
}

impl Default for CategoricalCrossentropy {
    fn default() -> Self {
        Self { epsilon: 1e-7 }
    }
}

impl CategoricalCrossentropy {
    /// # Errors
    /// `InvalidConfig` unless `0 < epsilon < 0.5`
    pub fn new(epsilon: FgsmFloat) -> Result<Self, AdversarialError> {
        if epsilon > 0. && epsilon < 0.5 {
            Ok(Self { epsilon })
        } else {
            Err(AdversarialError::InvalidConfig(format!(
                "cross-entropy clip epsilon must lie in (0, 0.5), got {}",
                epsilon
            )))
        }
    }

    pub const fn epsilon(&self) -> FgsmFloat {
        self.epsilon
    }

    fn check_shapes(
        labels: &ArrayView2<FgsmFloat>,
        predictions: &ArrayView2<FgsmFloat>,
    ) -> Result<(), AdversarialError> {
        if labels.nrows() != predictions.nrows() {
            return Err(ShapeMismatch::BatchSize {
                images: predictions.nrows(),
                labels: labels.nrows(),
            }
            .into());
        }
        if labels.ncols() != predictions.ncols() {
            return Err(ShapeMismatch::Labels {
                expected: predictions.ncols(),
                found: labels.ncols(),
            }
            .into());
        }
        Ok(())
    }

    /// # Errors
    /// `ShapeMismatch` if `labels` and `predictions` differ in shape
    pub fn loss(
        &self,
        labels: ArrayView2<FgsmFloat>,
        predictions: ArrayView2<FgsmFloat>,
    ) -> Result<FgsmFloat, AdversarialError> {
        Self::check_shapes(&labels, &predictions)?;
        if predictions.nrows() == 0 {
            return Ok(0.);
        }
        let totals = predictions.sum_axis(Axis(1));
        let mut per_example = Zip::from(labels.rows())
            .and(predictions.rows())
            .and(&totals)
            .map_collect(|y, p, &total| {
                Zip::from(&y).and(&p).fold(0., |acc, &y, &p| {
                    let q = (p / total).clamp(self.epsilon, 1. - self.epsilon);
                    acc - y * q.ln()
                })
            });
        per_example /= predictions.nrows() as FgsmFloat;
        Ok(per_example.sum())
    }

    /// Gradient of [`CategoricalCrossentropy::loss`] with respect to `predictions`.
    ///
    /// # Errors
    /// `ShapeMismatch` if `labels` and `predictions` differ in shape
    pub fn gradient(
        &self,
        labels: ArrayView2<FgsmFloat>,
        predictions: ArrayView2<FgsmFloat>,
    ) -> Result<Array2<FgsmFloat>, AdversarialError> {
        Self::check_shapes(&labels, &predictions)?;
        let batch = predictions.nrows() as FgsmFloat;
        let mut grad = Array2::zeros(predictions.raw_dim());
        Zip::from(grad.rows_mut())
            .and(labels.rows())
            .and(predictions.rows())
            .for_each(|mut g, y, p| {
                let total = p.sum();
                // dL/dq, zero where the clip is active
                let dq = Zip::from(&y).and(&p).map_collect(|&y, &p| {
                    let q = p / total;
                    if q < self.epsilon || q > 1. - self.epsilon {
                        0.
                    } else {
                        -y / (q * batch)
                    }
                });
                // q = p / total, so dq_j/dp_k = (delta_jk - q_j) / total
                let weighted = Zip::from(&dq).and(&p).fold(0., |acc, &d, &p| acc + d * p / total);
                Zip::from(&mut g)
                    .and(&dq)
                    .for_each(|g, &d| *g = (d - weighted) / total);
            });
        Ok(grad)
    }
}
