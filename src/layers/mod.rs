pub mod conv;
pub mod layer;
pub mod pool;

pub use conv::Conv2d;
pub use layer::Layer;
pub use pool::MaxPool2d;
