pub mod batchnorm;
pub mod conv;
pub mod dense;
pub mod dnn;
pub mod dropout;
pub mod flatten;
pub mod layer;
pub mod maxpool;
pub mod relu;
pub mod softmax;

pub use batchnorm::BatchNorm;
pub use conv::Conv;
pub use dense::Dense;
pub use dnn::DNN;
pub use dropout::Dropout;
pub use flatten::Flatten;
pub use layer::Layer;
pub use maxpool::MaxPool;
pub use relu::ReLU;
pub use softmax::Softmax;
