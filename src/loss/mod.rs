pub mod combined;
pub mod content;
pub mod style;
pub mod tv;

pub use combined::{compute_gradients, compute_loss, LossBreakdown, LossGradients, LossWeights, Targets};
pub use content::ContentLoss;
pub use style::StyleLoss;
pub use tv::TvLoss;
