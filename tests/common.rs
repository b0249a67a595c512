use fgsm_rs::dnn::{BatchNorm, Conv, Dense, Dropout, Flatten, MaxPool, ReLU, Softmax};
use fgsm_rs::{FgsmFloat, DNN};
use ndarray::{array, Array, Array1, Array2};
use ndarray_rand::rand_distr::Normal;
use ndarray_rand::RandomExt;
use rand::Rng;

/// Flatten -> Dense(4 -> 2) -> Softmax. For a uniform 2x2x1 image labelled
/// `[1, 0]` the sign of the input gradient is `[[1, -1], [1, -1]]`.
pub fn checkerboard_classifier() -> DNN {
    DNN::new(vec![
        Box::new(Flatten::new()),
        Box::new(Dense::from_parts(
            array![[-1., 1., -1., 1.], [1., -1., 1., -1.]],
            Array1::zeros(2),
        )),
        Box::new(Softmax::new()),
    ])
}

/// A miniature VGG-style block stack: two same-padded ReLU convolutions, each
/// followed by batch normalization, a max pool, then a dense head.
pub fn make_cnn<R: Rng>(rng: &mut R, size: usize, channels: usize, num_classes: usize) -> DNN {
    let dist = Normal::new(0., 0.5).unwrap();
    let mut dnn = DNN::default();
    let mut c_in = channels;
    for c_out in [4, 4] {
        dnn.add_layer(Box::new(Conv::same(
            Array::random_using((3, 3, c_in, c_out), dist, rng),
            Array::random_using(c_out, dist, rng),
        )));
        dnn.add_layer(Box::new(ReLU::new()));
        dnn.add_layer(Box::new(BatchNorm::identity(c_out)));
        c_in = c_out;
    }
    dnn.add_layer(Box::new(MaxPool::square(2)));
    dnn.add_layer(Box::new(Flatten::new()));
    let features = (size / 2) * (size / 2) * c_in;
    dnn.add_layer(Box::new(Dense::from_parts(
        Array::random_using((16, features), dist, rng),
        Array::random_using(16, dist, rng),
    )));
    dnn.add_layer(Box::new(ReLU::new()));
    dnn.add_layer(Box::new(Dropout::new(0.5)));
    dnn.add_layer(Box::new(Dense::from_parts(
        Array::random_using((num_classes, 16), dist, rng),
        Array::random_using(num_classes, dist, rng),
    )));
    dnn.add_layer(Box::new(Softmax::new()));
    dnn
}

pub fn one_hot(classes: &[usize], num_classes: usize) -> Array2<FgsmFloat> {
    let mut labels = Array2::zeros((classes.len(), num_classes));
    for (row, &class) in classes.iter().enumerate() {
        labels[[row, class]] = 1.;
    }
    labels
}
