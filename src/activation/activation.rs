use serde::{Serialize, Deserialize};

/// Element-wise activation applied by `Layer::Activation`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ActivationFunction {
    ReLU,
    Identity,
}

impl ActivationFunction {
    pub fn function(&self, x: f32) -> f32 {
        match self {
            ActivationFunction::ReLU => if x > 0.0 { x } else { 0.0 },
            ActivationFunction::Identity => x,
        }
    }

    /// Derivative with respect to the pre-activation input `x`.
    /// ReLU uses 0 at the kink, matching the usual subgradient convention.
    pub fn derivative(&self, x: f32) -> f32 {
        match self {
            ActivationFunction::ReLU => if x > 0.0 { 1.0 } else { 0.0 },
            ActivationFunction::Identity => 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relu_clips_negatives_and_gates_gradient() {
        let f = ActivationFunction::ReLU;
        assert_eq!(f.function(-2.0), 0.0);
        assert_eq!(f.function(3.0), 3.0);
        assert_eq!(f.derivative(-2.0), 0.0);
        assert_eq!(f.derivative(0.0), 0.0);
        assert_eq!(f.derivative(3.0), 1.0);
    }

    #[test]
    fn identity_passes_through() {
        let f = ActivationFunction::Identity;
        assert_eq!(f.function(-2.5), -2.5);
        assert_eq!(f.derivative(-2.5), 1.0);
    }
}
