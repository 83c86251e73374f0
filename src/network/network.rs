use std::collections::BTreeMap;
use std::path::Path;

use rand::{rngs::StdRng, Rng, SeedableRng};
use safetensors::{tensor::TensorView, Dtype, SafeTensors};
use serde::{Serialize, Deserialize};

use crate::activation::activation::ActivationFunction;
use crate::error::{Result, StyleError};
use crate::layers::{Conv2d, Layer, MaxPool2d};
use crate::math::tensor::Tensor;
use crate::network::spec::LayerSpec;

/// Activations collected by `FeatureExtractor::extract`.
#[derive(Debug, Clone)]
pub struct Features {
    /// One entry per requested content layer, in request order.
    pub content: Vec<Tensor>,
    /// One entry per requested style layer, in request order.
    pub style: Vec<Tensor>,
}

/// Every intermediate value of a traced forward pass.
///
/// `values[0]` is the network input and `values[i + 1]` the output of layer
/// `i`, so `values[i]` is exactly what layer `i` needs for its backward step.
#[derive(Debug, Clone)]
pub struct Trace {
    pub values: Vec<Tensor>,
}

impl Trace {
    /// Output of layer `index`.
    pub fn output(&self, index: usize) -> &Tensor {
        &self.values[index + 1]
    }
}

/// A frozen, sequential convolutional feature stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureExtractor {
    pub layers: Vec<Layer>,
}

impl FeatureExtractor {
    /// Builds a network from layer specs with He-initialized kernels drawn
    /// from `rng`. Fails if consecutive convolutions disagree on channel count.
    pub fn from_specs<R: Rng>(specs: &[LayerSpec], rng: &mut R) -> Result<FeatureExtractor> {
        check_channel_chain(specs)?;
        let layers = specs.iter()
            .map(|spec| match *spec {
                LayerSpec::Conv { in_channels, out_channels, kernel, padding } => {
                    Layer::Conv(Conv2d::new(in_channels, out_channels, kernel, padding, rng))
                }
                LayerSpec::Relu => Layer::Activation(ActivationFunction::ReLU),
                LayerSpec::MaxPool { kernel, stride } => Layer::MaxPool(MaxPool2d::new(kernel, stride)),
            })
            .collect();
        Ok(FeatureExtractor { layers })
    }

    /// Seeded random weights; useful for experiments without a checkpoint.
    pub fn random(specs: &[LayerSpec], seed: u64) -> Result<FeatureExtractor> {
        FeatureExtractor::from_specs(specs, &mut StdRng::seed_from_u64(seed))
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// Keeps layers `0..=max_index`; nothing past the deepest requested
    /// activation is ever evaluated.
    pub fn truncate(&mut self, max_index: usize) -> Result<()> {
        self.check_index(max_index)?;
        self.layers.truncate(max_index + 1);
        Ok(())
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.layers.len() {
            return Err(StyleError::LayerOutOfRange { index, depth: self.layers.len() });
        }
        Ok(())
    }

    /// Validates all indices and returns the deepest one.
    pub fn deepest(&self, content_layers: &[usize], style_layers: &[usize]) -> Result<usize> {
        let mut deepest = 0;
        for &index in content_layers.iter().chain(style_layers.iter()) {
            self.check_index(index)?;
            deepest = deepest.max(index);
        }
        Ok(deepest)
    }

    /// Runs the stack up to the deepest requested index and collects the
    /// outputs of the requested layers.
    pub fn extract(
        &self,
        input: &Tensor,
        content_layers: &[usize],
        style_layers: &[usize],
    ) -> Result<Features> {
        let deepest = self.deepest(content_layers, style_layers)?;
        let mut content = vec![None; content_layers.len()];
        let mut style = vec![None; style_layers.len()];

        let mut current = input.clone();
        for (i, layer) in self.layers.iter().enumerate().take(deepest + 1) {
            current = layer.forward(&current)?;
            for (slot, &l) in content.iter_mut().zip(content_layers) {
                if l == i {
                    *slot = Some(current.clone());
                }
            }
            for (slot, &l) in style.iter_mut().zip(style_layers) {
                if l == i {
                    *slot = Some(current.clone());
                }
            }
        }

        // Every slot was filled: all indices are <= deepest.
        Ok(Features {
            content: content.into_iter().flatten().collect(),
            style: style.into_iter().flatten().collect(),
        })
    }

    /// Forward pass through layers `0..=up_to`, keeping every intermediate
    /// value for `backward`.
    pub fn forward_traced(&self, input: &Tensor, up_to: usize) -> Result<Trace> {
        self.check_index(up_to)?;
        let mut values = Vec::with_capacity(up_to + 2);
        values.push(input.clone());
        for layer in &self.layers[..=up_to] {
            let next = layer.forward(&values[values.len() - 1])?;
            values.push(next);
        }
        Ok(Trace { values })
    }

    /// Back-propagates gradients injected at layer outputs down to the input.
    ///
    /// `output_grads` maps a layer index to ∂L/∂(output of that layer); several
    /// losses attached to the same layer must already be summed.
    pub fn backward(&self, trace: &Trace, output_grads: &BTreeMap<usize, Tensor>) -> Result<Tensor> {
        let Some(&deepest) = output_grads.keys().next_back() else {
            return Ok(Tensor::zeros(trace.values[0].shape));
        };
        if deepest + 1 >= trace.values.len() {
            return Err(StyleError::LayerOutOfRange { index: deepest, depth: trace.values.len() - 1 });
        }

        let mut grad = Tensor::zeros(trace.output(deepest).shape);
        for i in (0..=deepest).rev() {
            if let Some(injected) = output_grads.get(&i) {
                grad.accumulate(injected)?;
            }
            grad = self.layers[i].backward(&trace.values[i], &grad)?;
        }
        Ok(grad)
    }

    /// Loads convolution weights stored as `features.{i}.weight` /
    /// `features.{i}.bias` (f32) for a network laid out as `specs`.
    pub fn load_safetensors(path: impl AsRef<Path>, specs: &[LayerSpec]) -> Result<FeatureExtractor> {
        let bytes = std::fs::read(path)?;
        FeatureExtractor::from_safetensors_bytes(&bytes, specs)
    }

    pub fn from_safetensors_bytes(bytes: &[u8], specs: &[LayerSpec]) -> Result<FeatureExtractor> {
        check_channel_chain(specs)?;
        let tensors = SafeTensors::deserialize(bytes)?;
        let mut layers = Vec::with_capacity(specs.len());
        for (i, spec) in specs.iter().enumerate() {
            let layer = match *spec {
                LayerSpec::Conv { in_channels, out_channels, kernel, padding } => {
                    let weight = read_f32(&tensors, &format!("features.{i}.weight"))?;
                    let bias = read_f32(&tensors, &format!("features.{i}.bias"))?;
                    let shape = [out_channels, in_channels, kernel, kernel];
                    if weight.0 != shape {
                        return Err(StyleError::Weights(format!(
                            "features.{i}.weight has shape {:?}, expected {:?}", weight.0, shape
                        )));
                    }
                    let weight = Tensor::from_data(shape, weight.1)?;
                    Layer::Conv(Conv2d::from_parts(weight, bias.1, padding)?)
                }
                LayerSpec::Relu => Layer::Activation(ActivationFunction::ReLU),
                LayerSpec::MaxPool { kernel, stride } => Layer::MaxPool(MaxPool2d::new(kernel, stride)),
            };
            layers.push(layer);
        }
        Ok(FeatureExtractor { layers })
    }

    /// Writes the convolution weights using the same naming `load_safetensors` reads.
    pub fn save_safetensors(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut buffers: Vec<(String, Vec<usize>, Vec<u8>)> = Vec::new();
        for (i, layer) in self.layers.iter().enumerate() {
            if let Layer::Conv(conv) = layer {
                buffers.push((format!("features.{i}.weight"), conv.weight.shape.to_vec(), to_le_bytes(&conv.weight.data)));
                buffers.push((format!("features.{i}.bias"), vec![conv.bias.len()], to_le_bytes(&conv.bias)));
            }
        }
        let views = buffers.iter()
            .map(|(name, shape, data)| Ok((name.as_str(), TensorView::new(Dtype::F32, shape.clone(), data)?)))
            .collect::<Result<Vec<_>>>()?;
        let bytes = safetensors::tensor::serialize(views, &None)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Serializes the network to a pretty-printed JSON file.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Deserializes a network from a JSON file previously written by `save_json`.
    pub fn load_json(path: impl AsRef<Path>) -> Result<FeatureExtractor> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}

fn check_channel_chain(specs: &[LayerSpec]) -> Result<()> {
    let mut channels = 3;
    for (i, spec) in specs.iter().enumerate() {
        if let LayerSpec::Conv { in_channels, out_channels, .. } = *spec {
            if in_channels != channels {
                return Err(StyleError::Weights(format!(
                    "layer {i} expects {in_channels} input channels but receives {channels}"
                )));
            }
            channels = out_channels;
        }
    }
    Ok(())
}

fn read_f32(tensors: &SafeTensors<'_>, name: &str) -> Result<(Vec<usize>, Vec<f32>)> {
    let view = tensors.tensor(name)?;
    if view.dtype() != Dtype::F32 {
        return Err(StyleError::Weights(format!("{name} has dtype {:?}, expected F32", view.dtype())));
    }
    let data = view.data()
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    Ok((view.shape().to_vec(), data))
}

fn to_le_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}
