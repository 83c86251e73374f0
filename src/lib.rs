pub mod math;
pub mod activation;
pub mod layers;
pub mod network;
pub mod imaging;
pub mod loss;
pub mod optim;
pub mod train;
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;

// Convenience re-exports
pub use math::tensor::Tensor;
pub use math::matrix::Matrix;
pub use activation::activation::ActivationFunction;
pub use network::network::FeatureExtractor;
pub use network::spec::{vgg19_features, LayerSpec};
pub use imaging::{postprocess, preprocess, ImageShape};
pub use loss::{ContentLoss, StyleLoss, TvLoss, LossWeights};
pub use optim::{Adam, Sgd, OptimizerKind};
pub use train::{train_loop, TrainConfig, Trainer};
pub use config::{CompositeInit, StyleConfig};
pub use error::{Result, StyleError};
pub use pipeline::StyleTransfer;
