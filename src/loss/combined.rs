use serde::{Serialize, Deserialize};

use crate::error::{Result, StyleError};
use crate::loss::{content::ContentLoss, style::StyleLoss, tv::TvLoss};
use crate::math::matrix::Matrix;
use crate::math::tensor::Tensor;

/// Scalar weights of the three loss terms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LossWeights {
    pub content: f32,
    pub style: f32,
    pub tv: f32,
}

impl Default for LossWeights {
    fn default() -> Self {
        LossWeights { content: 1.0, style: 1000.0, tv: 10.0 }
    }
}

/// Weighted loss values of one evaluation.
///
/// - `content`: one weighted content loss per content layer
/// - `style`:   one weighted style loss per style layer
/// - `tv`:      weighted total-variation loss
/// - `total`:   sum of everything above; the value that is minimized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LossBreakdown {
    pub content: Vec<f32>,
    pub style: Vec<f32>,
    pub tv: f32,
    pub total: f32,
}

impl LossBreakdown {
    pub fn content_sum(&self) -> f32 {
        self.content.iter().sum()
    }

    pub fn style_sum(&self) -> f32 {
        self.style.iter().sum()
    }
}

/// Gradients of the weighted total loss.
///
/// `content[i]` / `style[i]` are with respect to the i-th requested
/// activation; `pixels` is the direct TV contribution on the composite.
#[derive(Debug, Clone)]
pub struct LossGradients {
    pub content: Vec<Tensor>,
    pub style: Vec<Tensor>,
    pub pixels: Tensor,
}

/// Fixed targets the composite is compared against.
#[derive(Debug, Clone)]
pub struct Targets {
    /// Content-image activations, one per content layer.
    pub content: Vec<Tensor>,
    /// Gram matrices of the style-image activations, one per style layer.
    pub style_grams: Vec<Matrix>,
}

fn check_counts(content: &[Tensor], style: &[Tensor], targets: &Targets) -> Result<()> {
    if content.len() != targets.content.len() || style.len() != targets.style_grams.len() {
        return Err(StyleError::InvalidConfig(format!(
            "got {} content / {} style activations for {} / {} targets",
            content.len(), style.len(), targets.content.len(), targets.style_grams.len()
        )));
    }
    Ok(())
}

/// Weighted content, style and TV losses of the composite.
pub fn compute_loss(
    composite: &Tensor,
    content: &[Tensor],
    style: &[Tensor],
    targets: &Targets,
    weights: &LossWeights,
) -> Result<LossBreakdown> {
    check_counts(content, style, targets)?;

    let content_l = content.iter().zip(targets.content.iter())
        .map(|(y_hat, y)| Ok(weights.content * ContentLoss::loss(y_hat, y)?))
        .collect::<Result<Vec<f32>>>()?;
    let style_l = style.iter().zip(targets.style_grams.iter())
        .map(|(y_hat, gram_y)| Ok(weights.style * StyleLoss::loss(y_hat, gram_y)?))
        .collect::<Result<Vec<f32>>>()?;
    let tv_l = weights.tv * TvLoss::loss(composite);

    let total = content_l.iter().sum::<f32>() + style_l.iter().sum::<f32>() + tv_l;
    Ok(LossBreakdown { content: content_l, style: style_l, tv: tv_l, total })
}

/// Gradients of `compute_loss(..).total`.
pub fn compute_gradients(
    composite: &Tensor,
    content: &[Tensor],
    style: &[Tensor],
    targets: &Targets,
    weights: &LossWeights,
) -> Result<LossGradients> {
    check_counts(content, style, targets)?;

    let content_g = content.iter().zip(targets.content.iter())
        .map(|(y_hat, y)| Ok(&ContentLoss::derivative(y_hat, y)? * weights.content))
        .collect::<Result<Vec<Tensor>>>()?;
    let style_g = style.iter().zip(targets.style_grams.iter())
        .map(|(y_hat, gram_y)| Ok(&StyleLoss::derivative(y_hat, gram_y)? * weights.style))
        .collect::<Result<Vec<Tensor>>>()?;
    let pixels = &TvLoss::derivative(composite) * weights.tv;

    Ok(LossGradients { content: content_g, style: style_g, pixels })
}
