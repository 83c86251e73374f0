use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::{Arc, atomic::AtomicBool};

use crate::config::StyleConfig;
use crate::loss::LossWeights;
use crate::optim::OptimizerKind;
use crate::train::epoch_stats::EpochStats;

/// Configuration for one optimization run at a fixed resolution.
///
/// # Fields
/// - `epochs`:         number of optimizer updates applied to the composite
/// - `learning_rate`:  initial learning rate
/// - `lr_decay_epoch`: the rate is multiplied by `lr_decay_gamma` after every
///                      `lr_decay_epoch` completed epochs
/// - `report_every`:   loss components are logged (and a snapshot written when
///                      `snapshot_dir` is set) on every multiple of this epoch
/// - `progress_tx`:    optional channel sender; one `EpochStats` is sent per
///                      completed epoch.  If the receiver is dropped the loop
///                      terminates early.
/// - `stop_flag`:      optional atomic flag; when set to `true` from another
///                      thread the loop terminates after the current epoch.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub epochs: usize,
    pub learning_rate: f32,
    pub lr_decay_epoch: usize,
    pub lr_decay_gamma: f32,
    pub optimizer: OptimizerKind,
    pub weights: LossWeights,
    pub content_layers: Vec<usize>,
    pub style_layers: Vec<usize>,
    pub report_every: usize,
    pub snapshot_dir: Option<PathBuf>,
    pub progress_tx: Option<mpsc::Sender<EpochStats>>,
    pub stop_flag: Option<Arc<AtomicBool>>,
}

impl TrainConfig {
    /// Creates a `TrainConfig` from the run configuration, with no progress
    /// channel, stop flag or snapshot directory.
    pub fn from_style(config: &StyleConfig) -> Self {
        TrainConfig {
            epochs: config.num_epochs,
            learning_rate: config.learning_rate,
            lr_decay_epoch: config.lr_decay_epoch,
            lr_decay_gamma: config.lr_decay_gamma,
            optimizer: config.optimizer,
            weights: config.weights,
            content_layers: config.content_layers.clone(),
            style_layers: config.style_layers.clone(),
            report_every: config.report_every,
            snapshot_dir: None,
            progress_tx: None,
            stop_flag: None,
        }
    }
}
