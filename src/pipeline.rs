use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::{atomic::AtomicBool, Arc};

use image::{DynamicImage, RgbImage};
use tracing::info;

use crate::config::StyleConfig;
use crate::error::Result;
use crate::imaging::{postprocess, preprocess, resample, ImageShape};
use crate::math::tensor::Tensor;
use crate::network::FeatureExtractor;
use crate::train::{initial_image, train_loop, EpochStats, TrainConfig, TrainOutcome};

/// Output of a complete style-transfer run.
#[derive(Debug, Clone)]
pub struct StyleOutcome {
    /// Final image at `image_shape`, clamped to the display range.
    pub image: RgbImage,
    /// Normalized tensor behind `image`, always at `image_shape`. When the
    /// warmup stage stops early this is its upsampled result.
    pub composite: Tensor,
    /// One entry per resolution that was trained, smallest first.
    pub stages: Vec<TrainOutcome>,
}

impl StyleOutcome {
    pub fn tensor(&self) -> &Tensor {
        &self.composite
    }

    pub fn stopped_early(&self) -> bool {
        self.stages.iter().any(|stage| stage.stopped_early)
    }
}

/// Preprocess → train (optionally coarse-to-fine) → postprocess.
pub struct StyleTransfer {
    extractor: FeatureExtractor,
    config: StyleConfig,
    snapshot_dir: Option<PathBuf>,
    progress_tx: Option<mpsc::Sender<EpochStats>>,
    stop_flag: Option<Arc<AtomicBool>>,
}

impl StyleTransfer {
    /// Validates `config` and drops every layer past the deepest one it uses.
    pub fn new(mut extractor: FeatureExtractor, config: StyleConfig) -> Result<StyleTransfer> {
        config.validate()?;
        let deepest = extractor.deepest(&config.content_layers, &config.style_layers)?;
        extractor.truncate(deepest)?;
        Ok(StyleTransfer { extractor, config, snapshot_dir: None, progress_tx: None, stop_flag: None })
    }

    /// Writes `epoch_NNNN.png` snapshots on report epochs. A coarse stage
    /// writes into a `warmup/` subdirectory.
    pub fn with_snapshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.snapshot_dir = Some(dir.into());
        self
    }

    pub fn with_progress(mut self, tx: mpsc::Sender<EpochStats>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop_flag = Some(flag);
        self
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    pub fn config(&self) -> &StyleConfig {
        &self.config
    }

    fn train_config(&self, snapshot_dir: Option<PathBuf>) -> TrainConfig {
        let mut cfg = TrainConfig::from_style(&self.config);
        cfg.snapshot_dir = snapshot_dir;
        cfg.progress_tx = self.progress_tx.clone();
        cfg.stop_flag = self.stop_flag.clone();
        cfg
    }

    fn stage(
        &self,
        content: &DynamicImage,
        style: &DynamicImage,
        shape: ImageShape,
        seed: Option<Tensor>,
        snapshot_dir: Option<PathBuf>,
    ) -> Result<TrainOutcome> {
        let content = preprocess(content, shape)?;
        let style = preprocess(style, shape)?;
        let seed = match seed {
            Some(seed) => seed,
            None => initial_image(self.config.init, &content),
        };
        info!(shape = %shape, epochs = self.config.num_epochs, "training stage");
        train_loop(&self.extractor, content, style, &seed, &self.train_config(snapshot_dir))
    }

    /// Runs the whole pipeline on decoded RGB images.
    pub fn run(&self, content: &DynamicImage, style: &DynamicImage) -> Result<StyleOutcome> {
        let target = self.config.image_shape;
        let mut stages = Vec::new();
        let mut seed = None;

        if let Some(warmup) = self.config.warmup_shape {
            let dir = self.snapshot_dir.as_ref().map(|d| d.join("warmup"));
            let coarse = self.stage(content, style, warmup, None, dir)?;
            let upsampled = resample(&coarse.image, target)?;
            let stopped = coarse.stopped_early;
            stages.push(coarse);
            if stopped {
                let image = postprocess(&upsampled)?;
                return Ok(StyleOutcome { image, composite: upsampled, stages });
            }
            seed = Some(upsampled);
        }

        let full = self.stage(content, style, target, seed, self.snapshot_dir.clone())?;
        let image = postprocess(&full.image)?;
        let composite = full.image.clone();
        stages.push(full);
        Ok(StyleOutcome { image, composite, stages })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::LayerSpec;

    fn net() -> FeatureExtractor {
        FeatureExtractor::random(&[
            LayerSpec::Conv { in_channels: 3, out_channels: 4, kernel: 3, padding: 1 },
            LayerSpec::Relu,
            LayerSpec::MaxPool { kernel: 2, stride: 2 },
            LayerSpec::Conv { in_channels: 4, out_channels: 4, kernel: 3, padding: 1 },
            LayerSpec::Relu,
            LayerSpec::Conv { in_channels: 4, out_channels: 4, kernel: 3, padding: 1 },
        ], 21).unwrap()
    }

    fn picture(r: u8) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(20, 14, |x, y| image::Rgb([r, (x * 12) as u8, (y * 18) as u8])))
    }

    fn small_config() -> StyleConfig {
        StyleConfig {
            image_shape: ImageShape::new(12, 16),
            content_layers: vec![3],
            style_layers: vec![0, 3],
            num_epochs: 3,
            report_every: 1,
            ..Default::default()
        }
    }

    #[test]
    fn truncates_to_deepest_requested_layer() {
        let st = StyleTransfer::new(net(), small_config()).unwrap();
        assert_eq!(st.extractor().depth(), 4);
    }

    #[test]
    fn output_has_target_shape() {
        let st = StyleTransfer::new(net(), small_config()).unwrap();
        let out = st.run(&picture(200), &picture(10)).unwrap();
        assert_eq!((out.image.height(), out.image.width()), (12, 16));
        assert_eq!(out.stages.len(), 1);
        assert_eq!(out.tensor().shape, [1, 3, 12, 16]);
    }

    #[test]
    fn warmup_stage_seeds_full_run() {
        let config = StyleConfig { warmup_shape: Some(ImageShape::new(6, 8)), ..small_config() };
        let st = StyleTransfer::new(net(), config).unwrap();
        let out = st.run(&picture(200), &picture(10)).unwrap();
        assert_eq!(out.stages.len(), 2);
        assert_eq!(out.stages[0].image.shape, [1, 3, 6, 8]);
        assert_eq!(out.stages[1].image.shape, [1, 3, 12, 16]);
        assert!(!out.stopped_early());
    }

    #[test]
    fn rejects_layers_beyond_network() {
        let config = StyleConfig { style_layers: vec![0, 40], ..small_config() };
        assert!(StyleTransfer::new(net(), config).is_err());
    }
}
