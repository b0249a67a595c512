#![allow(clippy::must_use_candidate, clippy::module_name_repetitions)]
//! Fast Gradient Sign Method (FGSM) adversarial examples for differentiable
//! image classifiers.
//!
//! The crate is organised around the [`Classifier`] capability: anything that
//! can predict class probabilities and, optionally, differentiate a loss with
//! respect to its input. [`adversarial`] builds perturbations on top of that
//! capability, and [`dnn`] provides a small inference-only sequential network
//! that implements it through an explicit [`GradientTape`].
extern crate ndarray;

pub mod adversarial;
pub mod affine;
pub mod classifier;
pub mod config;
pub mod dnn;
pub mod error;
pub mod logging;
pub mod loss;
pub mod tape;
pub mod tensorshape;
mod test_util;

pub use crate::adversarial::{create_adversarial_pattern, generate_adversarial_images, FgsmAttack};
pub use crate::classifier::{Classifier, OpaqueClassifier};
pub use crate::config::AttackConfig;
pub use crate::dnn::{Layer, DNN};
pub use crate::error::{AdversarialError, ShapeMismatch};
pub use crate::loss::CategoricalCrossentropy;
pub use crate::tape::GradientTape;
pub use crate::tensorshape::TensorShape;

pub type FgsmFloat = f64;
