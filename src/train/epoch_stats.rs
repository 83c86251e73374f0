use serde::{Serialize, Deserialize};

/// Per-epoch statistics emitted by the training loop.
///
/// When a `progress_tx` channel is configured in `TrainConfig`, one
/// `EpochStats` is sent at the end of every completed epoch. Loss values
/// are the weighted terms evaluated on the composite *before* that
/// epoch's update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    /// 1-based epoch number.
    pub epoch: usize,
    /// Total epochs requested for this run.
    pub total_epochs: usize,
    /// Sum of the weighted content losses over all content layers.
    pub content_loss: f32,
    /// Sum of the weighted style losses over all style layers.
    pub style_loss: f32,
    /// Weighted total-variation loss.
    pub tv_loss: f32,
    /// The minimized objective.
    pub total_loss: f32,
    /// Learning rate used for this epoch's update.
    pub learning_rate: f32,
    /// Wall-clock duration of this single epoch in milliseconds.
    pub elapsed_ms: u64,
}
