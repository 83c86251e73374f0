use std::collections::BTreeMap;
use std::time::Instant;

use tracing::{debug, info};

use crate::error::{Result, StyleError};
use crate::imaging::{postprocess, save_image};
use crate::loss::{compute_gradients, compute_loss, LossBreakdown, StyleLoss, Targets};
use crate::math::tensor::Tensor;
use crate::network::FeatureExtractor;
use crate::optim::{LrScheduler, StepDecay};
use crate::train::composite::Composite;
use crate::train::epoch_stats::EpochStats;
use crate::train::train_config::TrainConfig;

/// Where a `Trainer` is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainPhase {
    /// Targets are cached; no epoch has been applied yet.
    Initializing,
    /// `completed` epochs have been applied.
    Stepping { completed: usize },
    /// All requested epochs are done; the composite is final.
    Done,
}

/// Drives the optimization of one composite image against fixed content and
/// style targets.
///
/// The targets (content activations and style Gram matrices) are computed
/// once in `new`; every step reuses them.
pub struct Trainer<'a> {
    extractor: &'a FeatureExtractor,
    config: TrainConfig,
    composite: Composite,
    scheduler: StepDecay,
    deepest: usize,
    targets: Targets,
    phase: TrainPhase,
    last_loss: Option<LossBreakdown>,
}

impl<'a> Trainer<'a> {
    /// Validates the configuration, builds the composite from `seed` and
    /// caches the content and style targets. Fails without side effects when
    /// either reference image cannot be run through the extractor.
    pub fn new(
        extractor: &'a FeatureExtractor,
        content: Tensor,
        style: Tensor,
        seed: &Tensor,
        config: TrainConfig,
    ) -> Result<Trainer<'a>> {
        if config.report_every == 0 {
            return Err(StyleError::InvalidConfig("report_every must be at least 1".into()));
        }
        if config.lr_decay_epoch == 0 {
            return Err(StyleError::InvalidConfig("lr_decay_epoch must be at least 1".into()));
        }
        let deepest = extractor.deepest(&config.content_layers, &config.style_layers)?;
        content.ensure_same_shape("Trainer::new", seed)?;
        let targets = compute_targets(extractor, &content, &style, &config)?;
        let composite = Composite::new(seed, config.optimizer.build(config.learning_rate));
        let scheduler = StepDecay::new(config.learning_rate, config.lr_decay_epoch, config.lr_decay_gamma);
        let phase = if config.epochs == 0 { TrainPhase::Done } else { TrainPhase::Initializing };
        Ok(Trainer {
            extractor,
            config,
            composite,
            scheduler,
            deepest,
            targets,
            phase,
            last_loss: None,
        })
    }

    pub fn phase(&self) -> TrainPhase {
        self.phase
    }

    pub fn composite(&self) -> &Tensor {
        self.composite.image()
    }

    /// Learning rate the optimizer currently holds.
    pub fn learning_rate(&self) -> f32 {
        self.composite.learning_rate()
    }

    pub fn last_loss(&self) -> Option<&LossBreakdown> {
        self.last_loss.as_ref()
    }

    pub fn into_output(self) -> Tensor {
        self.composite.into_image()
    }

    /// Runs one epoch. Returns `None` once the trainer is `Done`.
    pub fn step(&mut self) -> Result<Option<EpochStats>> {
        let completed = match self.phase {
            TrainPhase::Done => return Ok(None),
            TrainPhase::Initializing => 0,
            TrainPhase::Stepping { completed } => completed,
        };
        let epoch = completed + 1;
        let t_start = Instant::now();

        let lr = self.scheduler.lr_at(epoch);
        self.composite.set_learning_rate(lr);

        let cfg = &self.config;
        let targets = &self.targets;

        // ── Forward ────────────────────────────────────────────────────────
        let trace = self.extractor.forward_traced(self.composite.image(), self.deepest)?;
        let content: Vec<Tensor> = cfg.content_layers.iter().map(|&i| trace.output(i).clone()).collect();
        let style: Vec<Tensor> = cfg.style_layers.iter().map(|&i| trace.output(i).clone()).collect();
        let image = self.composite.image();

        let loss = compute_loss(image, &content, &style, targets, &cfg.weights)?;
        let grads = compute_gradients(image, &content, &style, targets, &cfg.weights)?;

        // ── Backward ───────────────────────────────────────────────────────
        let mut output_grads: BTreeMap<usize, Tensor> = BTreeMap::new();
        let injected = cfg.content_layers.iter().zip(grads.content)
            .chain(cfg.style_layers.iter().zip(grads.style));
        for (&layer, grad) in injected {
            match output_grads.get_mut(&layer) {
                Some(acc) => acc.accumulate(&grad)?,
                None => {
                    output_grads.insert(layer, grad);
                }
            }
        }
        let mut pixel_grad = self.extractor.backward(&trace, &output_grads)?;
        pixel_grad.accumulate(&grads.pixels)?;
        drop(trace);

        // ── Update ─────────────────────────────────────────────────────────
        self.composite.step(&pixel_grad)?;

        let stats = EpochStats {
            epoch,
            total_epochs: self.config.epochs,
            content_loss: loss.content_sum(),
            style_loss: loss.style_sum(),
            tv_loss: loss.tv,
            total_loss: loss.total,
            learning_rate: lr,
            elapsed_ms: t_start.elapsed().as_millis() as u64,
        };
        debug!(epoch, total = loss.total, lr, "epoch finished");

        if epoch % self.config.report_every == 0 {
            self.report(&stats)?;
        }

        self.last_loss = Some(loss);
        self.phase = if epoch >= self.config.epochs {
            TrainPhase::Done
        } else {
            TrainPhase::Stepping { completed: epoch }
        };
        Ok(Some(stats))
    }

    /// Steps until `Done` and returns the final composite.
    pub fn run(mut self) -> Result<Tensor> {
        while self.step()?.is_some() {}
        Ok(self.into_output())
    }

    fn report(&self, stats: &EpochStats) -> Result<()> {
        info!(
            epoch = stats.epoch,
            total_epochs = stats.total_epochs,
            content = stats.content_loss,
            style = stats.style_loss,
            tv = stats.tv_loss,
            total = stats.total_loss,
            lr = stats.learning_rate,
            elapsed_ms = stats.elapsed_ms,
            "style transfer progress"
        );
        if let Some(dir) = &self.config.snapshot_dir {
            let path = dir.join(format!("epoch_{:04}.png", stats.epoch));
            save_image(&postprocess(self.composite.image())?, &path)?;
            debug!(path = %path.display(), "wrote snapshot");
        }
        Ok(())
    }
}

fn compute_targets(
    extractor: &FeatureExtractor,
    content: &Tensor,
    style: &Tensor,
    config: &TrainConfig,
) -> Result<Targets> {
    let content_features = extractor.extract(content, &config.content_layers, &[])?;
    let style_features = extractor.extract(style, &[], &config.style_layers)?;
    let style_grams = style_features.style.iter().map(StyleLoss::gram).collect();
    debug!(
        content_layers = ?config.content_layers,
        style_layers = ?config.style_layers,
        "cached content activations and style gram matrices"
    );
    Ok(Targets { content: content_features.content, style_grams })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::LayerSpec;
    use crate::optim::OptimizerKind;
    use crate::loss::LossWeights;

    fn tiny_net() -> FeatureExtractor {
        FeatureExtractor::random(&[
            LayerSpec::Conv { in_channels: 3, out_channels: 4, kernel: 3, padding: 1 },
            LayerSpec::Relu,
            LayerSpec::Conv { in_channels: 4, out_channels: 4, kernel: 3, padding: 1 },
        ], 11).unwrap()
    }

    fn config(epochs: usize) -> TrainConfig {
        TrainConfig {
            epochs,
            learning_rate: 0.1,
            lr_decay_epoch: 3,
            lr_decay_gamma: 0.1,
            optimizer: OptimizerKind::Adam,
            weights: LossWeights::default(),
            content_layers: vec![2],
            style_layers: vec![0, 2],
            report_every: 2,
            snapshot_dir: None,
            progress_tx: None,
            stop_flag: None,
        }
    }

    fn image(offset: f32) -> Tensor {
        let n = 3 * 6 * 6;
        Tensor::from_data([1, 3, 6, 6], (0..n).map(|i| ((i % 7) as f32 - 3.0) * 0.3 + offset).collect()).unwrap()
    }

    #[test]
    fn walks_through_phases() {
        let net = tiny_net();
        let mut trainer = Trainer::new(&net, image(0.0), image(0.5), &image(0.0), config(2)).unwrap();
        assert_eq!(trainer.phase(), TrainPhase::Initializing);
        trainer.step().unwrap().unwrap();
        assert_eq!(trainer.phase(), TrainPhase::Stepping { completed: 1 });
        let last = trainer.step().unwrap().unwrap();
        assert_eq!(last.epoch, 2);
        assert_eq!(trainer.phase(), TrainPhase::Done);
        assert!(trainer.step().unwrap().is_none());
    }

    #[test]
    fn zero_epochs_is_immediately_done() {
        let net = tiny_net();
        let seed = image(0.2);
        let mut trainer = Trainer::new(&net, image(0.0), image(0.5), &seed, config(0)).unwrap();
        assert_eq!(trainer.phase(), TrainPhase::Done);
        assert!(trainer.step().unwrap().is_none());
        assert_eq!(trainer.into_output(), seed);
    }

    #[test]
    fn learning_rate_decays_after_interval() {
        let net = tiny_net();
        let mut trainer = Trainer::new(&net, image(0.0), image(0.5), &image(0.1), config(4)).unwrap();
        let lrs: Vec<f32> = (0..4).map(|_| trainer.step().unwrap().unwrap().learning_rate).collect();
        assert_eq!(lrs[0], 0.1);
        assert_eq!(lrs[2], 0.1);
        assert!((lrs[3] - 0.1 * lrs[2]).abs() < 1e-9);
    }

    #[test]
    fn composite_equal_to_content_has_no_content_loss() {
        let net = tiny_net();
        let mut trainer = Trainer::new(&net, image(0.0), image(0.5), &image(0.0), config(1)).unwrap();
        let stats = trainer.step().unwrap().unwrap();
        assert_eq!(stats.content_loss, 0.0);
        assert!(stats.style_loss > 0.0);
    }

    #[test]
    fn run_matches_manual_stepping() {
        let net = tiny_net();
        let mut manual = Trainer::new(&net, image(0.0), image(0.5), &image(0.3), config(3)).unwrap();
        while manual.step().unwrap().is_some() {}
        let ran = Trainer::new(&net, image(0.0), image(0.5), &image(0.3), config(3)).unwrap().run().unwrap();
        assert_eq!(manual.into_output(), ran);
    }

    #[test]
    fn zero_intervals_are_rejected() {
        let net = tiny_net();
        let mut cfg = config(2);
        cfg.report_every = 0;
        let err = Trainer::new(&net, image(0.0), image(0.5), &image(0.0), cfg).err().unwrap();
        assert!(matches!(err, StyleError::InvalidConfig(_)));

        let mut cfg = config(2);
        cfg.lr_decay_epoch = 0;
        let err = Trainer::new(&net, image(0.0), image(0.5), &image(0.0), cfg).err().unwrap();
        assert!(matches!(err, StyleError::InvalidConfig(_)));
    }

    #[test]
    fn style_image_too_small_for_pooling_fails_at_construction() {
        let net = FeatureExtractor::random(&[
            LayerSpec::Conv { in_channels: 3, out_channels: 4, kernel: 3, padding: 1 },
            LayerSpec::Relu,
            LayerSpec::MaxPool { kernel: 2, stride: 2 },
            LayerSpec::Conv { in_channels: 4, out_channels: 4, kernel: 3, padding: 1 },
        ], 5).unwrap();
        let mut cfg = config(2);
        cfg.content_layers = vec![0];
        cfg.style_layers = vec![3];
        let content = Tensor::filled([1, 3, 4, 4], 0.2);
        let style = Tensor::filled([1, 3, 1, 1], 0.7);
        let err = Trainer::new(&net, content.clone(), style, &content, cfg).err().unwrap();
        assert!(matches!(err, StyleError::ShapeMismatch { operation: "MaxPool2d::forward", .. }));
    }

    #[test]
    fn bad_layer_index_fails_at_construction() {
        let net = tiny_net();
        let mut cfg = config(1);
        cfg.style_layers = vec![9];
        assert!(Trainer::new(&net, image(0.0), image(0.5), &image(0.0), cfg).is_err());
    }

    #[test]
    fn writes_snapshots_on_report_epochs() {
        let net = tiny_net();
        let dir = std::env::temp_dir().join(format!("ferrite_style_snapshots_{}", std::process::id()));
        let mut cfg = config(4);
        cfg.snapshot_dir = Some(dir.clone());
        let mut trainer = Trainer::new(&net, image(0.0), image(0.5), &image(0.0), cfg).unwrap();
        while trainer.step().unwrap().is_some() {}
        assert!(dir.join("epoch_0002.png").exists());
        assert!(dir.join("epoch_0004.png").exists());
        assert!(!dir.join("epoch_0001.png").exists());
        std::fs::remove_dir_all(&dir).ok();
    }
}
