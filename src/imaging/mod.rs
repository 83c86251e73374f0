pub mod convert;
pub mod io;

pub use convert::{denormalize, postprocess, preprocess, resample, ImageShape, RGB_MEAN, RGB_STD};
pub use io::{load_image, save_image};
