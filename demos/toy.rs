use image::{DynamicImage, Rgb, RgbImage};

use ferrite_style::{
    preprocess, FeatureExtractor, ImageShape, LayerSpec, StyleConfig, TrainConfig, Trainer,
};

fn main() {
    let specs = vec![
        LayerSpec::Conv { in_channels: 3, out_channels: 8, kernel: 3, padding: 1 },
        LayerSpec::Relu,
        LayerSpec::MaxPool { kernel: 2, stride: 2 },
        LayerSpec::Conv { in_channels: 8, out_channels: 16, kernel: 3, padding: 1 },
        LayerSpec::Relu,
    ];
    let extractor = FeatureExtractor::random(&specs, 17).unwrap();

    let shape = ImageShape::new(24, 24);
    let content = DynamicImage::ImageRgb8(RgbImage::from_fn(24, 24, |x, _| {
        if x < 12 { Rgb([220, 60, 40]) } else { Rgb([30, 40, 200]) }
    }));
    let style = DynamicImage::ImageRgb8(RgbImage::from_fn(24, 24, |x, y| {
        let v = ((x + y) % 6 * 40) as u8;
        Rgb([v, 200 - v / 2, 120])
    }));
    let content = preprocess(&content, shape).unwrap();
    let style = preprocess(&style, shape).unwrap();

    let config = StyleConfig {
        image_shape: shape,
        content_layers: vec![3],
        style_layers: vec![0, 3],
        learning_rate: 0.05,
        num_epochs: 60,
        lr_decay_epoch: 30,
        ..Default::default()
    };

    let seed = content.clone();
    let mut trainer = Trainer::new(&extractor, content, style, &seed, TrainConfig::from_style(&config)).unwrap();
    while let Some(stats) = trainer.step().unwrap() {
        if stats.epoch % 10 == 0 {
            println!(
                "Epoch {}: total = {:.4}  content = {:.4}  style = {:.4}  tv = {:.4}  lr = {}",
                stats.epoch, stats.total_loss, stats.content_loss, stats.style_loss, stats.tv_loss, stats.learning_rate,
            );
        }
    }
}
