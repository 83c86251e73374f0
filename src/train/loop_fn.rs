use std::sync::atomic::Ordering;

use tracing::warn;

use crate::error::Result;
use crate::loss::LossBreakdown;
use crate::math::tensor::Tensor;
use crate::network::FeatureExtractor;
use crate::train::epoch_stats::EpochStats;
use crate::train::train_config::TrainConfig;
use crate::train::trainer::Trainer;

/// Result of a `train_loop` run.
#[derive(Debug, Clone)]
pub struct TrainOutcome {
    /// Final composite, still normalized.
    pub image: Tensor,
    /// Statistics of the report epochs (every `report_every` epochs).
    pub history: Vec<EpochStats>,
    /// Loss breakdown of the last completed epoch.
    pub last_loss: Option<LossBreakdown>,
    /// Number of epochs actually applied.
    pub epochs_run: usize,
    /// True when the stop flag or a dropped progress receiver ended the run.
    pub stopped_early: bool,
}

// ---------------------------------------------------------------------------
// Public entry point
// ---------------------------------------------------------------------------

/// Optimizes a composite starting at `seed` for `config.epochs` epochs.
///
/// # Arguments
/// - `extractor`: frozen feature stack, read-only for the whole run
/// - `content`:   preprocessed content image `[1, 3, h, w]`
/// - `style`:     preprocessed style image `[1, 3, h', w']`
/// - `seed`:      starting composite; must have the content image's shape
/// - `config`:    hyperparameters, optional progress channel, optional stop flag
///
/// # Early termination
/// The loop breaks early if:
/// - the `progress_tx` receiver has been dropped, **or**
/// - `config.stop_flag` is set to `true`.
pub fn train_loop(
    extractor: &FeatureExtractor,
    content: Tensor,
    style: Tensor,
    seed: &Tensor,
    config: &TrainConfig,
) -> Result<TrainOutcome> {
    let mut trainer = Trainer::new(extractor, content, style, seed, config.clone())?;
    let mut history = Vec::new();
    let mut epochs_run = 0;
    let mut stopped_early = false;

    loop {
        // Check stop flag at the top of each epoch.
        if stop_requested(config) {
            stopped_early = true;
            break;
        }

        let Some(stats) = trainer.step()? else {
            break;
        };
        epochs_run = stats.epoch;

        if stats.epoch % config.report_every == 0 || stats.epoch == config.epochs {
            history.push(stats.clone());
        }

        if let Some(ref tx) = config.progress_tx {
            // If the receiver has been dropped, stop training.
            if tx.send(stats).is_err() {
                stopped_early = epochs_run < config.epochs;
                break;
            }
        }
    }

    if stopped_early {
        warn!(epochs_run, total_epochs = config.epochs, "training stopped early");
    }

    let last_loss = trainer.last_loss().cloned();
    Ok(TrainOutcome {
        image: trainer.into_output(),
        history,
        last_loss,
        epochs_run,
        stopped_early,
    })
}

fn stop_requested(config: &TrainConfig) -> bool {
    config.stop_flag.as_ref().is_some_and(|flag| flag.load(Ordering::Relaxed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{mpsc, Arc, atomic::AtomicBool};

    use crate::loss::LossWeights;
    use crate::network::LayerSpec;
    use crate::optim::OptimizerKind;

    fn net() -> FeatureExtractor {
        FeatureExtractor::random(&[
            LayerSpec::Conv { in_channels: 3, out_channels: 3, kernel: 3, padding: 1 },
            LayerSpec::Relu,
        ], 4).unwrap()
    }

    fn config(epochs: usize) -> TrainConfig {
        TrainConfig {
            epochs,
            learning_rate: 0.05,
            lr_decay_epoch: 100,
            lr_decay_gamma: 0.1,
            optimizer: OptimizerKind::Adam,
            weights: LossWeights::default(),
            content_layers: vec![1],
            style_layers: vec![0],
            report_every: 2,
            snapshot_dir: None,
            progress_tx: None,
            stop_flag: None,
        }
    }

    fn image(v: f32) -> Tensor {
        Tensor::filled([1, 3, 5, 5], v)
    }

    #[test]
    fn sends_one_stats_per_epoch() {
        let (tx, rx) = mpsc::channel();
        let mut cfg = config(5);
        cfg.progress_tx = Some(tx);
        let outcome = train_loop(&net(), image(0.1), image(-0.3), &image(0.5), &cfg).unwrap();
        drop(cfg);
        let epochs: Vec<usize> = rx.iter().map(|s| s.epoch).collect();
        assert_eq!(epochs, vec![1, 2, 3, 4, 5]);
        assert_eq!(outcome.epochs_run, 5);
        assert!(!outcome.stopped_early);
        // Report epochs plus the final one.
        let reported: Vec<usize> = outcome.history.iter().map(|s| s.epoch).collect();
        assert_eq!(reported, vec![2, 4, 5]);
    }

    #[test]
    fn stop_flag_halts_before_first_epoch() {
        let mut cfg = config(5);
        cfg.stop_flag = Some(Arc::new(AtomicBool::new(true)));
        let seed = image(0.5);
        let outcome = train_loop(&net(), image(0.1), image(-0.3), &seed, &cfg).unwrap();
        assert!(outcome.stopped_early);
        assert_eq!(outcome.epochs_run, 0);
        assert_eq!(outcome.image, seed);
    }

    #[test]
    fn dropped_receiver_ends_training() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        let mut cfg = config(5);
        cfg.progress_tx = Some(tx);
        let outcome = train_loop(&net(), image(0.1), image(-0.3), &image(0.5), &cfg).unwrap();
        assert_eq!(outcome.epochs_run, 1);
        assert!(outcome.stopped_early);
    }
}
