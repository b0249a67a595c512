//! Fast Gradient Sign Method.
//!
//! Given a differentiable [`Classifier`], a labeled image batch and a step
//! size epsilon, FGSM moves every pixel by `epsilon` in the direction that
//! increases the classifier's cross-entropy loss, then clips the result back
//! into the valid pixel range:
//!
//! `x_adv = clip(x + epsilon * sign(grad_x loss(y, f(x))), 0, 1)`
//!
//! Inputs are never modified; every call returns a freshly allocated batch.
use crate::classifier::Classifier;
use crate::config::AttackConfig;
use crate::error::{AdversarialError, ShapeMismatch};
use crate::loss::CategoricalCrossentropy;
use crate::tensorshape::TensorShape;
use crate::FgsmFloat;
use log::{debug, warn};
use ndarray::{Array, ArrayView, ArrayView2, Dimension, Zip};

/// Sign of a gradient element: exactly -1, 0 or +1. NaN maps to 0.
fn sign(x: FgsmFloat) -> FgsmFloat {
    if x > 0. {
        1.
    } else if x < 0. {
        -1.
    } else {
        0.
    }
}

fn check_batch<D: Dimension>(
    images: &ArrayView<FgsmFloat, D>,
    labels: &ArrayView2<FgsmFloat>,
) -> Result<(), AdversarialError> {
    if images.ndim() == 0 {
        return Err(AdversarialError::input_mismatch(
            TensorShape::unknown(),
            TensorShape::new(vec![]),
        ));
    }
    let batch = images.shape()[0];
    if batch != labels.nrows() {
        return Err(ShapeMismatch::BatchSize {
            images: batch,
            labels: labels.nrows(),
        }
        .into());
    }
    Ok(())
}

/// Checks the batch against the shapes the classifier declares up front.
fn check_classifier<D, C>(
    images: &ArrayView<FgsmFloat, D>,
    labels: &ArrayView2<FgsmFloat>,
    classifier: &C,
) -> Result<(), AdversarialError>
where
    D: Dimension,
    C: Classifier + ?Sized,
{
    let example_shape = TensorShape::from_batch_shape(images.shape());
    let expected = classifier.input_shape();
    if !expected.is_compatible_with(&example_shape) {
        return Err(AdversarialError::input_mismatch(expected, example_shape));
    }
    match classifier.num_classes() {
        Some(classes) if classes != labels.ncols() => Err(ShapeMismatch::Labels {
            expected: classes,
            found: labels.ncols(),
        }
        .into()),
        _ => Ok(()),
    }
}

fn warn_if_out_of_range<D: Dimension>(images: &ArrayView<FgsmFloat, D>, min: FgsmFloat, max: FgsmFloat) {
    let outside = images.iter().filter(|&&x| !(min..=max).contains(&x)).count();
    if outside > 0 {
        warn!(
            "{} of {} input values lie outside [{}, {}] and will be masked by clipping",
            outside,
            images.len(),
            min,
            max
        );
    }
}

fn pattern_with_loss<D, C>(
    images: &ArrayView<FgsmFloat, D>,
    labels: ArrayView2<FgsmFloat>,
    classifier: &C,
    loss: &CategoricalCrossentropy,
) -> Result<Array<FgsmFloat, D>, AdversarialError>
where
    D: Dimension,
    C: Classifier + ?Sized,
{
    check_batch(images, &labels)?;
    check_classifier(images, &labels, classifier)?;
    if images.shape()[0] == 0 {
        // nothing to differentiate, but the classifier still vets the shapes
        let predictions = classifier.predict(images.view().into_dyn())?;
        if predictions.ncols() != labels.ncols() {
            return Err(ShapeMismatch::Labels {
                expected: predictions.ncols(),
                found: labels.ncols(),
            }
            .into());
        }
        return Ok(Array::zeros(images.raw_dim()));
    }
    let gradient =
        classifier.gradient_of_loss_wrt_input(images.view().into_dyn(), labels, loss)?;
    if gradient.shape() != images.shape() {
        return Err(AdversarialError::input_mismatch(
            TensorShape::from(images.shape().to_vec()),
            TensorShape::from(gradient.shape().to_vec()),
        ));
    }
    Ok(gradient.mapv(sign).into_dimensionality::<D>()?)
}

/// `clip(x + epsilon * sign, min, max)` element-wise. Zero signs leave the
/// pixel unmoved even for an infinite epsilon.
fn apply_perturbation<D: Dimension>(
    images: &ArrayView<FgsmFloat, D>,
    perturbation: &Array<FgsmFloat, D>,
    epsilon: FgsmFloat,
    min: FgsmFloat,
    max: FgsmFloat,
) -> Array<FgsmFloat, D> {
    Zip::from(images).and(perturbation).map_collect(|&x, &s| {
        let step = if s == 0. { 0. } else { epsilon * s };
        (x + step).clamp(min, max)
    })
}

/// Sign of the gradient of the categorical cross-entropy between `labels`
/// and the classifier's prediction, with respect to `images`.
///
/// The returned array has the shape of `images` and contains only -1, 0
/// and +1. An empty batch yields an empty pattern; the classifier only
/// predicts on it to validate the image and label shapes.
///
/// # Errors
/// `ShapeMismatch` if the batch sizes differ or the classifier rejects the
/// images, `NonDifferentiableModel` if the classifier has no gradient
pub fn create_adversarial_pattern<D, C>(
    images: ArrayView<FgsmFloat, D>,
    labels: ArrayView2<FgsmFloat>,
    classifier: &C,
) -> Result<Array<FgsmFloat, D>, AdversarialError>
where
    D: Dimension,
    C: Classifier + ?Sized,
{
    pattern_with_loss(&images, labels, classifier, &CategoricalCrossentropy::default())
}

/// FGSM adversarial batch, clipped into `[0, 1]`.
///
/// `epsilon` is not constrained in sign or magnitude. Applying the function
/// to its own output generally perturbs further, since the gradient is
/// recomputed at the new point.
///
/// # Errors
/// As [`create_adversarial_pattern`]; additionally `InvalidConfig` for a NaN
/// epsilon
pub fn generate_adversarial_images<D, C>(
    images: ArrayView<FgsmFloat, D>,
    labels: ArrayView2<FgsmFloat>,
    epsilon: FgsmFloat,
    classifier: &C,
) -> Result<Array<FgsmFloat, D>, AdversarialError>
where
    D: Dimension,
    C: Classifier + ?Sized,
{
    if epsilon.is_nan() {
        return Err(AdversarialError::InvalidConfig("epsilon is NaN".to_string()));
    }
    warn_if_out_of_range(&images, 0., 1.);
    let perturbation = create_adversarial_pattern(images.view(), labels, classifier)?;
    Ok(apply_perturbation(&images, &perturbation, epsilon, 0., 1.))
}

/// A configured FGSM attack.
#[derive(Clone, Debug, PartialEq)]
pub struct FgsmAttack {
    config: AttackConfig,
    loss: CategoricalCrossentropy,
}

impl FgsmAttack {
    /// # Errors
    /// `InvalidConfig` if the configuration does not validate
    pub fn new(config: AttackConfig) -> Result<Self, AdversarialError> {
        config.validate()?;
        Ok(Self {
            config,
            loss: CategoricalCrossentropy::default(),
        })
    }

    #[must_use]
    pub fn with_loss(mut self, loss: CategoricalCrossentropy) -> Self {
        self.loss = loss;
        self
    }

    pub const fn config(&self) -> &AttackConfig {
        &self.config
    }

    /// # Errors
    /// See [`generate_adversarial_images`]
    pub fn pattern<D, C>(
        &self,
        images: ArrayView<FgsmFloat, D>,
        labels: ArrayView2<FgsmFloat>,
        classifier: &C,
    ) -> Result<Array<FgsmFloat, D>, AdversarialError>
    where
        D: Dimension,
        C: Classifier + ?Sized,
    {
        pattern_with_loss(&images, labels, classifier, &self.loss)
    }

    /// One FGSM step with the configured epsilon and clip range.
    ///
    /// # Errors
    /// See [`generate_adversarial_images`]
    pub fn perturb<D, C>(
        &self,
        images: ArrayView<FgsmFloat, D>,
        labels: ArrayView2<FgsmFloat>,
        classifier: &C,
    ) -> Result<Array<FgsmFloat, D>, AdversarialError>
    where
        D: Dimension,
        C: Classifier + ?Sized,
    {
        let AttackConfig {
            epsilon,
            clip_min,
            clip_max,
            warn_out_of_range,
        } = self.config;
        if warn_out_of_range {
            warn_if_out_of_range(&images, clip_min, clip_max);
        }
        debug!(
            "fgsm step on {:?} with epsilon {} against {}",
            images.shape(),
            epsilon,
            classifier.name()
        );
        let perturbation = self.pattern(images.view(), labels, classifier)?;
        Ok(apply_perturbation(&images, &perturbation, epsilon, clip_min, clip_max))
    }

    /// Applies [`FgsmAttack::perturb`] `iterations` times, recomputing the
    /// gradient at each intermediate batch. Zero iterations return a copy of
    /// the input.
    ///
    /// # Errors
    /// See [`generate_adversarial_images`]
    pub fn perturb_iterations<D, C>(
        &self,
        images: ArrayView<FgsmFloat, D>,
        labels: ArrayView2<FgsmFloat>,
        classifier: &C,
        iterations: usize,
    ) -> Result<Array<FgsmFloat, D>, AdversarialError>
    where
        D: Dimension,
        C: Classifier + ?Sized,
    {
        (0..iterations).try_fold(images.to_owned(), |current, step| {
            debug!("fgsm iteration {}/{}", step + 1, iterations);
            self.perturb(current.view(), labels, classifier)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::OpaqueClassifier;
    use crate::dnn::{Dense, Flatten, Softmax, DNN};
    use crate::test_util::*;
    use ndarray::{array, Array1, Array2, Array4, ArrayViewD, Ix4};
    use proptest::prelude::*;

    /// Flatten -> Dense(4 -> 2) -> Softmax whose input gradient for label
    /// `[1, 0]` has sign `[[1, -1], [1, -1]]` on a 2x2x1 image.
    fn checkerboard_classifier() -> DNN {
        DNN::new(vec![
            Box::new(Flatten::new()),
            Box::new(Dense::from_parts(
                array![[-1., 1., -1., 1.], [1., -1., 1., -1.]],
                Array1::zeros(2),
            )),
            Box::new(Softmax::new()),
        ])
    }

    fn constant_classifier() -> DNN {
        DNN::new(vec![
            Box::new(Flatten::new()),
            Box::new(Dense::from_parts(Array2::zeros((2, 4)), array![0.3, -0.3])),
            Box::new(Softmax::new()),
        ])
    }

    fn half_grey(batch: usize) -> Array4<FgsmFloat> {
        Array4::from_elem((batch, 2, 2, 1), 0.5)
    }

    #[test]
    fn test_sign_values() {
        assert_eq!(sign(3.2), 1.);
        assert_eq!(sign(-1e-300), -1.);
        assert_eq!(sign(0.), 0.);
        assert_eq!(sign(-0.), 0.);
        assert_eq!(sign(FgsmFloat::NAN), 0.);
    }

    #[test]
    fn test_checkerboard_pattern() {
        let pattern = create_adversarial_pattern(
            half_grey(1).view(),
            array![[1., 0.]].view(),
            &checkerboard_classifier(),
        )
        .unwrap();
        let expected = array![[1., -1.], [1., -1.]];
        assert_eq!(pattern.index_axis(ndarray::Axis(3), 0).index_axis(ndarray::Axis(0), 0), expected);
    }

    #[test]
    fn test_constant_classifier_has_zero_pattern() {
        let images = half_grey(2);
        let labels = array![[1., 0.], [0., 1.]];
        let pattern = create_adversarial_pattern(images.view(), labels.view(), &constant_classifier()).unwrap();
        assert!(pattern.iter().all(|&s| s == 0.));
        let adversarial =
            generate_adversarial_images(images.view(), labels.view(), 100., &constant_classifier()).unwrap();
        assert_eq!(adversarial, images);
    }

    #[test]
    fn test_infinite_epsilon_saturates_without_nan() {
        let adversarial = generate_adversarial_images(
            half_grey(1).view(),
            array![[1., 0.]].view(),
            FgsmFloat::INFINITY,
            &checkerboard_classifier(),
        )
        .unwrap();
        assert_eq!(
            adversarial.iter().copied().collect::<Vec<_>>(),
            vec![1., 0., 1., 0.]
        );
        assert!(generate_adversarial_images(
            half_grey(1).view(),
            array![[1., 0.]].view(),
            FgsmFloat::NAN,
            &checkerboard_classifier(),
        )
        .is_err());
    }

    #[test]
    fn test_empty_batch() {
        let images = Array4::<FgsmFloat>::zeros((0, 2, 2, 1));
        let labels = Array2::<FgsmFloat>::zeros((0, 2));
        let out = generate_adversarial_images(images.view(), labels.view(), 0.1, &checkerboard_classifier())
            .unwrap();
        assert_eq!(out.shape(), &[0, 2, 2, 1]);
    }

    #[test]
    fn test_empty_batch_still_checks_shapes() {
        let images = Array4::<FgsmFloat>::zeros((0, 3, 3, 1));
        let labels = Array2::<FgsmFloat>::zeros((0, 2));
        let err = create_adversarial_pattern(images.view(), labels.view(), &checkerboard_classifier())
            .unwrap_err();
        assert!(err.is_shape_mismatch());

        let images = Array4::<FgsmFloat>::zeros((0, 2, 2, 1));
        let labels = Array2::<FgsmFloat>::zeros((0, 3));
        let err = create_adversarial_pattern(images.view(), labels.view(), &checkerboard_classifier())
            .unwrap_err();
        assert!(matches!(
            err,
            AdversarialError::ShapeMismatch(ShapeMismatch::Labels { expected: 2, found: 3 })
        ));
    }

    #[test]
    fn test_declared_shapes_are_checked_first() {
        let dense = DNN::new(vec![
            Box::new(Dense::from_parts(Array2::zeros((2, 4)), Array1::zeros(2))),
            Box::new(Softmax::new()),
        ]);
        let images = Array2::<FgsmFloat>::zeros((1, 4));
        let err = create_adversarial_pattern(images.view(), array![[1., 0., 0.]].view(), &dense).unwrap_err();
        assert!(matches!(
            err,
            AdversarialError::ShapeMismatch(ShapeMismatch::Labels { expected: 2, found: 3 })
        ));
        let images = Array2::<FgsmFloat>::zeros((0, 5));
        let err = create_adversarial_pattern(images.view(), Array2::zeros((0, 2)).view(), &dense).unwrap_err();
        assert!(matches!(
            err,
            AdversarialError::ShapeMismatch(ShapeMismatch::Input { .. })
        ));
    }

    #[test]
    fn test_opaque_classifier_is_rejected() {
        let opaque = OpaqueClassifier::new("opaque", TensorShape::unknown(), |images: ArrayViewD<FgsmFloat>| {
            Array2::from_elem((images.shape()[0], 2), 0.5)
        });
        let err = generate_adversarial_images(half_grey(1).view(), array![[1., 0.]].view(), 0.1, &opaque)
            .unwrap_err();
        assert!(matches!(err, AdversarialError::NonDifferentiableModel { .. }));
    }

    #[test]
    fn test_attack_respects_clip_range() {
        let attack = FgsmAttack::new(AttackConfig::new(0.3).with_clip_range(0.25, 0.75).unwrap()).unwrap();
        let out = attack
            .perturb(half_grey(1).view(), array![[1., 0.]].view(), &checkerboard_classifier())
            .unwrap();
        assert_eq!(out.iter().copied().collect::<Vec<_>>(), vec![0.75, 0.25, 0.75, 0.25]);
    }

    #[test]
    fn test_iterations_keep_perturbing() {
        let attack = FgsmAttack::new(AttackConfig::new(0.1)).unwrap();
        let classifier = checkerboard_classifier();
        let labels = array![[1., 0.]];
        let once = attack.perturb(half_grey(1).view(), labels.view(), &classifier).unwrap();
        let twice = attack
            .perturb_iterations(half_grey(1).view(), labels.view(), &classifier, 2)
            .unwrap();
        assert_ne!(once, twice);
        let expected = [0.7, 0.3, 0.7, 0.3];
        for (a, b) in twice.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
        assert_eq!(
            attack.perturb_iterations(half_grey(1).view(), labels.view(), &classifier, 0).unwrap(),
            half_grey(1)
        );
    }

    proptest! {
        #[test]
        fn test_output_in_unit_range(
            images in image_batch(3, 2, 2, 1),
            labels in one_hot(3, 3),
            dnn in fc_classifier(4, 3, 2, 5),
            epsilon in -2. .. 2.,
        ) {
            let mut layers = vec![Box::new(Flatten::new()) as Box<dyn crate::dnn::Layer>];
            layers.extend(dnn.layers().iter().cloned());
            let classifier = DNN::new(layers);
            let images = images.into_dimensionality::<Ix4>().unwrap();

            let pattern = create_adversarial_pattern(images.view(), labels.view(), &classifier).unwrap();
            prop_assert!(pattern.iter().all(|&s| s == -1. || s == 0. || s == 1.));

            let adversarial = generate_adversarial_images(images.view(), labels.view(), epsilon, &classifier).unwrap();
            prop_assert_eq!(adversarial.shape(), images.shape());
            prop_assert!(adversarial.iter().all(|&x| (0. ..=1.).contains(&x)));

            let unchanged = generate_adversarial_images(images.view(), labels.view(), 0., &classifier).unwrap();
            prop_assert_eq!(unchanged, images);
        }

        #[test]
        fn test_batch_mismatch_is_rejected(images in image_batch(3, 2, 2, 1), labels in one_hot(2, 3), dnn in fc_classifier(4, 3, 1, 4)) {
            let err = create_adversarial_pattern(images.view(), labels.view(), &dnn).unwrap_err();
            let is_batch_mismatch = matches!(
                err,
                AdversarialError::ShapeMismatch(ShapeMismatch::BatchSize { images: 3, labels: 2 })
            );
            prop_assert!(is_batch_mismatch);
        }
    }
}
