#![allow(non_snake_case)]
//! Representation of affine transformations
use crate::FgsmFloat;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Affine map f(x) = Ax + b
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Affine2 {
    basis: Array2<FgsmFloat>,
    shift: Array1<FgsmFloat>,
}

impl Display for Affine2 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::result::Result<(), std::fmt::Error> {
        write!(
            f,
            "Basis {:?} Shift {:?}",
            self.basis.shape(),
            self.shift.shape()
        )
    }
}

impl Affine2 {
    /// # Panics
    /// If improper shapes are passed in
    pub fn new(basis: Array2<FgsmFloat>, shift: Array1<FgsmFloat>) -> Self {
        assert_eq!(basis.shape()[0], shift.len());
        Self { basis, shift }
    }

    pub fn identity(ndim: usize) -> Self {
        Self {
            basis: Array2::eye(ndim),
            shift: Array1::zeros(ndim),
        }
    }

    pub fn basis(&self) -> ArrayView2<FgsmFloat> {
        self.basis.view()
    }

    pub fn shift(&self) -> ArrayView1<FgsmFloat> {
        self.shift.view()
    }

    pub fn input_dim(&self) -> usize {
        self.basis.shape()[1]
    }

    pub fn output_dim(&self) -> usize {
        self.shift.len()
    }

    pub fn apply(&self, x: &ArrayView1<FgsmFloat>) -> Array1<FgsmFloat> {
        self.basis.dot(x) + &self.shift
    }

    /// Applies the map to every row of `x` with shape `(batch, input_dim)`.
    pub fn apply_batch(&self, x: &ArrayView2<FgsmFloat>) -> Array2<FgsmFloat> {
        let mut out = x.dot(&self.basis.t());
        out += &self.shift.view().insert_axis(Axis(0));
        out
    }

    /// Pulls a batch of output gradients back through the map: `grad · A`.
    pub fn backprop_batch(&self, grad: &ArrayView2<FgsmFloat>) -> Array2<FgsmFloat> {
        grad.dot(&self.basis)
    }
}
