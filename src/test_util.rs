#![cfg(test)]
use crate::affine::Affine2;
use crate::dnn::{Dense, ReLU, Softmax};
use crate::{FgsmFloat, DNN};
use ndarray::{Array, Array1, Array2, ArrayD, ArrayView1, Axis, IxDyn};
use proptest::arbitrary::functor::ArbitraryF1;
use proptest::prelude::*;
use proptest::sample::SizeRange;

prop_compose! {
    pub fn array1(len: usize)(v in Vec::lift1_with(-10. .. 10., SizeRange::new(len..=len))) -> Array1<FgsmFloat> {
        Array1::from_vec(v)
    }
}

prop_compose! {
    pub fn array2(rows: usize, cols: usize)(v in Vec::lift1_with(array1(cols), SizeRange::new(rows..=rows))) -> Array2<FgsmFloat> {
        assert!(rows > 0);
        ndarray::stack(Axis(0), &v.iter().map(|x| x.view()).collect::<Vec<ArrayView1<FgsmFloat>>>()).unwrap()
    }
}

prop_compose! {
    pub fn affine2(in_dim: usize, out_dim: usize)(basis in array2(out_dim, in_dim), shift in array1(out_dim)) -> Affine2 {
        Affine2::new(basis, shift)
    }
}

prop_compose! {
    /// Batch of `height x width x channels` images with values in [0, 1].
    pub fn image_batch(batch: usize, height: usize, width: usize, channels: usize)(v in Vec::lift1_with(0. ..=1., SizeRange::new(batch * height * width * channels..=batch * height * width * channels))) -> ArrayD<FgsmFloat> {
        Array::from_shape_vec(IxDyn(&[batch, height, width, channels]), v).unwrap()
    }
}

prop_compose! {
    pub fn one_hot(batch: usize, classes: usize)(idx in Vec::lift1_with(0..classes, SizeRange::new(batch..=batch))) -> Array2<FgsmFloat> {
        let mut labels = Array2::zeros((batch, classes));
        for (row, &i) in idx.iter().enumerate() {
            labels[[row, i]] = 1.;
        }
        labels
    }
}

prop_compose! {
    /// Fully connected classifier ending in a softmax.
    pub fn fc_classifier(input_size: usize, num_classes: usize, nlayers: usize, max_layer_width: usize)(repr_sizes in Vec::lift1_with(1..max_layer_width, SizeRange::new(nlayers..=nlayers)).prop_map(move |mut x| {x.insert(0, input_size); x.push(num_classes); x}))(affines in {let pairs = repr_sizes.iter().zip(repr_sizes.iter().skip(1)); pairs.map(|(&x, &y)| affine2(x,y)).collect::<Vec<_>>()}) -> DNN {
        let mut dnn = DNN::default();
        let n = affines.len();
        for (i, aff) in affines.into_iter().enumerate() {
            dnn.add_layer(Box::new(Dense::new(aff)));
            if i + 1 < n {
                dnn.add_layer(Box::new(ReLU::new()));
            }
        }
        dnn.add_layer(Box::new(Softmax::new()));
        dnn
    }
}
