use serde::{Serialize, Deserialize};

use crate::activation::activation::ActivationFunction;
use crate::error::{Result, StyleError};
use crate::layers::conv::Conv2d;
use crate::layers::pool::MaxPool2d;
use crate::math::tensor::Tensor;

/// One entry of the sequential feature stack. Indices into a
/// `FeatureExtractor` count these entries, activations included, so layer
/// numbering matches the usual `features.{i}` naming of pretrained weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Layer {
    Conv(Conv2d),
    Activation(ActivationFunction),
    MaxPool(MaxPool2d),
}

impl Layer {
    pub fn forward(&self, input: &Tensor) -> Result<Tensor> {
        match self {
            Layer::Conv(conv) => conv.forward(input),
            Layer::Activation(act) => Ok(input.map(|x| act.function(x))),
            Layer::MaxPool(pool) => pool.forward(input),
        }
    }

    /// ∂L/∂input for this layer, given its forward `input` and ∂L/∂output.
    pub fn backward(&self, input: &Tensor, grad_output: &Tensor) -> Result<Tensor> {
        match self {
            Layer::Conv(conv) => conv.backward(input, grad_output),
            Layer::Activation(act) => {
                if input.shape != grad_output.shape {
                    return Err(StyleError::ShapeMismatch {
                        operation: "Activation::backward",
                        expected: input.shape,
                        got: grad_output.shape,
                    });
                }
                // δ = upstream ⊙ σ'(x)
                let data = input.data.iter().zip(grad_output.data.iter())
                    .map(|(&x, &g)| g * act.derivative(x))
                    .collect();
                Ok(Tensor { shape: input.shape, data })
            }
            Layer::MaxPool(pool) => pool.backward(input, grad_output),
        }
    }
}
