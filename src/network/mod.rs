pub mod network;
pub mod spec;

pub use network::{FeatureExtractor, Features, Trace};
pub use spec::{vgg19_features, LayerSpec};
