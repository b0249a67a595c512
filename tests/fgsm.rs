use approx::assert_abs_diff_eq;
use fgsm_rs::{
    create_adversarial_pattern, generate_adversarial_images, AdversarialError, AttackConfig,
    CategoricalCrossentropy, Classifier, FgsmAttack, ShapeMismatch,
};
use ndarray::{array, Array, Array4, Axis, Ix4};
use rand::SeedableRng;
use rand_pcg::Pcg64;

mod common;

fn half_grey() -> Array4<f64> {
    Array4::from_elem((1, 2, 2, 1), 0.5)
}

fn first_image(batch: &Array4<f64>) -> ndarray::Array2<f64> {
    batch
        .index_axis(Axis(0), 0)
        .index_axis(Axis(2), 0)
        .to_owned()
}

#[test]
fn test_small_epsilon_scenario() {
    let adversarial = generate_adversarial_images(
        half_grey().view(),
        array![[1., 0.]].view(),
        0.1,
        &common::checkerboard_classifier(),
    )
    .unwrap();
    let expected = array![[0.6, 0.4], [0.6, 0.4]];
    for (a, b) in first_image(&adversarial).iter().zip(expected.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
    }
}

#[test]
fn test_large_epsilon_scenario_clips() {
    let adversarial = generate_adversarial_images(
        half_grey().view(),
        array![[1., 0.]].view(),
        10.,
        &common::checkerboard_classifier(),
    )
    .unwrap();
    assert_eq!(first_image(&adversarial), array![[1., 0.], [1., 0.]]);
}

#[test]
fn test_mismatched_batch_sizes() {
    let images = Array4::from_elem((3, 2, 2, 1), 0.5);
    let labels = array![[1., 0.], [0., 1.]];
    let result = generate_adversarial_images(
        images.view(),
        labels.view(),
        0.1,
        &common::checkerboard_classifier(),
    );
    match result {
        Err(AdversarialError::ShapeMismatch(ShapeMismatch::BatchSize { images, labels })) => {
            assert_eq!((images, labels), (3, 2));
        }
        other => panic!("expected a batch size mismatch, got {:?}", other),
    }
}

#[test]
fn test_incompatible_image_shape() {
    let images = Array4::from_elem((1, 3, 3, 1), 0.5);
    let err = create_adversarial_pattern(
        images.view(),
        array![[1., 0.]].view(),
        &common::checkerboard_classifier(),
    )
    .unwrap_err();
    assert!(err.is_shape_mismatch());
}

#[test]
fn test_wrong_number_of_classes() {
    let err = create_adversarial_pattern(
        half_grey().view(),
        array![[1., 0., 0.]].view(),
        &common::checkerboard_classifier(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        AdversarialError::ShapeMismatch(ShapeMismatch::Labels { expected: 2, found: 3 })
    ));
}

#[test]
fn test_input_is_not_mutated() {
    let images = half_grey();
    let _ = generate_adversarial_images(
        images.view(),
        array![[1., 0.]].view(),
        0.2,
        &common::checkerboard_classifier(),
    )
    .unwrap();
    assert_eq!(images, half_grey());
}

#[test]
fn test_cnn_blocks_normalize_after_activation() {
    let mut rng = Pcg64::seed_from_u64(3);
    let dnn = common::make_cnn(&mut rng, 4, 1, 2);
    let names: Vec<String> = dnn.layers().iter().take(6).map(|l| format!("{}", l)).collect();
    assert_eq!(
        names,
        vec!["Conv 3x3, 4", "ReLU", "BatchNorm 4", "Conv 3x3, 4", "ReLU", "BatchNorm 4"]
    );
}

#[test]
fn test_cnn_attack_increases_loss() {
    let mut rng = Pcg64::seed_from_u64(7);
    let dnn = common::make_cnn(&mut rng, 6, 3, 4);
    let images = Array::from_shape_fn((5, 6, 6, 3), |(b, y, x, c)| {
        ((b * 7 + y * 5 + x * 3 + c) % 11) as f64 / 10.
    });
    let predictions = dnn.predict(images.view().into_dyn()).unwrap();
    // attack the classifier's own predictions
    let classes: Vec<usize> = predictions
        .rows()
        .into_iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f64::NEG_INFINITY), |best, (i, &p)| if p > best.1 { (i, p) } else { best })
                .0
        })
        .collect();
    let labels = common::one_hot(&classes, 4);

    let loss = CategoricalCrossentropy::default();
    let before = loss.loss(labels.view(), predictions.view()).unwrap();

    let adversarial =
        generate_adversarial_images(images.view(), labels.view(), 1e-3, &dnn).unwrap();
    assert_eq!(adversarial.shape(), images.shape());
    assert!(adversarial.iter().all(|&x| (0. ..=1.).contains(&x)));

    let after_predictions = dnn.predict(adversarial.view().into_dyn()).unwrap();
    let after = loss.loss(labels.view(), after_predictions.view()).unwrap();
    assert!(after >= before, "loss went from {} to {}", before, after);
}

#[test]
fn test_dynamic_dimension_input() {
    let images = half_grey().into_dyn();
    let adversarial = generate_adversarial_images(
        images.view(),
        array![[1., 0.]].view(),
        0.1,
        &common::checkerboard_classifier(),
    )
    .unwrap();
    let adversarial = adversarial.into_dimensionality::<Ix4>().unwrap();
    assert_eq!(first_image(&adversarial).mapv(|x| (x * 10.).round()), array![[6., 4.], [6., 4.]]);
}

#[test]
fn test_attack_from_json_config() {
    let config = AttackConfig::from_json(r#"{"epsilon": 0.25, "warn_out_of_range": false}"#).unwrap();
    let attack = FgsmAttack::new(config).unwrap();
    let adversarial = attack
        .perturb(half_grey().view(), array![[0., 1.]].view(), &common::checkerboard_classifier())
        .unwrap();
    // the opposite label flips the gradient
    assert_eq!(first_image(&adversarial), array![[0.25, 0.75], [0.25, 0.75]]);
}
