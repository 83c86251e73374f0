use serde::{Serialize, Deserialize};

/// Describes one entry of a sequential feature stack.
///
/// Variants:
/// - `Conv`:    square-kernel convolution, stride 1, zero padding `padding`
/// - `Relu`:    element-wise rectifier
/// - `MaxPool`: max pooling with a `kernel × kernel` window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerSpec {
    Conv {
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        padding: usize,
    },
    Relu,
    MaxPool { kernel: usize, stride: usize },
}

/// Channel widths of the five VGG-19 blocks and how many convolutions each holds.
const VGG19_BLOCKS: [(usize, usize); 5] = [(64, 2), (128, 2), (256, 4), (512, 4), (512, 4)];

/// The 37-entry `features` stack of VGG-19, in the same order (and therefore
/// with the same indices) as the widely distributed pretrained checkpoints.
///
/// Index 0 is the first convolution, 36 the final pooling layer.
pub fn vgg19_features() -> Vec<LayerSpec> {
    let mut specs = Vec::with_capacity(37);
    let mut in_channels = 3;
    for (out_channels, convs) in VGG19_BLOCKS {
        for _ in 0..convs {
            specs.push(LayerSpec::Conv { in_channels, out_channels, kernel: 3, padding: 1 });
            specs.push(LayerSpec::Relu);
            in_channels = out_channels;
        }
        specs.push(LayerSpec::MaxPool { kernel: 2, stride: 2 });
    }
    specs
}
