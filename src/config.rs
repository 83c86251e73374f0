use std::path::Path;

use serde::{Serialize, Deserialize};

use crate::error::{Result, StyleError};
use crate::imaging::ImageShape;
use crate::loss::LossWeights;
use crate::optim::OptimizerKind;

/// How the composite image starts out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CompositeInit {
    /// A copy of the preprocessed content image.
    #[default]
    Content,
    /// Uniform noise in normalized space, drawn from a seeded generator.
    Noise { seed: u64 },
}

/// Every knob of a style-transfer run.
///
/// Defaults reproduce the classic VGG-19 setup: content at layer 25, style at
/// the first convolution of each block, 500 Adam epochs at lr 0.3 decayed ×0.1
/// every 50 epochs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleConfig {
    /// Final output size.
    pub image_shape: ImageShape,
    /// Optional smaller size trained first; its result seeds the full-size run.
    pub warmup_shape: Option<ImageShape>,
    pub content_layers: Vec<usize>,
    pub style_layers: Vec<usize>,
    pub weights: LossWeights,
    pub learning_rate: f32,
    pub num_epochs: usize,
    pub lr_decay_epoch: usize,
    pub lr_decay_gamma: f32,
    pub optimizer: OptimizerKind,
    /// Loss components are logged (and snapshots written) every `report_every` epochs.
    pub report_every: usize,
    pub init: CompositeInit,
}

impl Default for StyleConfig {
    fn default() -> Self {
        StyleConfig {
            image_shape: ImageShape::new(300, 450),
            warmup_shape: None,
            content_layers: vec![25],
            style_layers: vec![0, 5, 10, 19, 28],
            weights: LossWeights::default(),
            learning_rate: 0.3,
            num_epochs: 500,
            lr_decay_epoch: 50,
            lr_decay_gamma: 0.1,
            optimizer: OptimizerKind::Adam,
            report_every: 10,
            init: CompositeInit::Content,
        }
    }
}

impl StyleConfig {
    pub fn validate(&self) -> Result<()> {
        self.image_shape.validate()?;
        if let Some(shape) = self.warmup_shape {
            shape.validate()?;
        }
        if self.content_layers.is_empty() && self.style_layers.is_empty() {
            return invalid("at least one content or style layer is required");
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return invalid(format!("learning_rate must be positive, got {}", self.learning_rate));
        }
        if self.lr_decay_epoch == 0 {
            return invalid("lr_decay_epoch must be at least 1");
        }
        if !(self.lr_decay_gamma > 0.0 && self.lr_decay_gamma.is_finite()) {
            return invalid(format!("lr_decay_gamma must be positive, got {}", self.lr_decay_gamma));
        }
        if self.report_every == 0 {
            return invalid("report_every must be at least 1");
        }
        let w = &self.weights;
        if [w.content, w.style, w.tv].iter().any(|v| !(*v >= 0.0 && v.is_finite())) {
            return invalid(format!("loss weights must be non-negative, got {w:?}"));
        }
        Ok(())
    }

    /// Serializes the configuration to a pretty-printed JSON file.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Reads a configuration from JSON; missing fields take their defaults.
    pub fn load_json(path: impl AsRef<Path>) -> Result<StyleConfig> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let config: StyleConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }
}

fn invalid<T>(message: impl Into<String>) -> Result<T> {
    Err(StyleError::InvalidConfig(message.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = StyleConfig::default();
        config.validate().unwrap();
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: StyleConfig = serde_json::from_str(
            r#"{ "num_epochs": 5, "image_shape": { "height": 32, "width": 32 }, "init": { "type": "noise", "seed": 3 } }"#,
        ).unwrap();
        assert_eq!(config.num_epochs, 5);
        assert_eq!(config.image_shape, ImageShape::new(32, 32));
        assert_eq!(config.init, CompositeInit::Noise { seed: 3 });
        assert_eq!(config.style_layers, vec![0, 5, 10, 19, 28]);
    }

    #[test]
    fn rejects_bad_values() {
        let bad = [
            StyleConfig { learning_rate: 0.0, ..Default::default() },
            StyleConfig { lr_decay_epoch: 0, ..Default::default() },
            StyleConfig { report_every: 0, ..Default::default() },
            StyleConfig { content_layers: vec![], style_layers: vec![], ..Default::default() },
            StyleConfig { image_shape: ImageShape::new(0, 10), ..Default::default() },
            StyleConfig { weights: LossWeights { content: -1.0, style: 1.0, tv: 1.0 }, ..Default::default() },
        ];
        for config in bad {
            assert!(config.validate().is_err(), "{config:?} should be invalid");
        }
    }

    #[test]
    fn json_file_round_trip() {
        let path = std::env::temp_dir().join(format!("ferrite_style_config_{}.json", std::process::id()));
        let config = StyleConfig { num_epochs: 7, warmup_shape: Some(ImageShape::new(16, 24)), ..Default::default() };
        config.save_json(&path).unwrap();
        let loaded = StyleConfig::load_json(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, config);
    }
}
