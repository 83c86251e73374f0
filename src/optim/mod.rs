pub mod adam;
pub mod scheduler;
pub mod sgd;

use serde::{Serialize, Deserialize};

pub use adam::Adam;
pub use scheduler::{LrScheduler, StepDecay};
pub use sgd::Sgd;

/// Updates a flat parameter buffer from its gradient.
pub trait Optimizer {
    fn step(&mut self, params: &mut [f32], grads: &[f32]);

    fn learning_rate(&self) -> f32;

    fn set_learning_rate(&mut self, lr: f32);
}

/// Which optimizer drives the composite image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    #[default]
    Adam,
    Sgd,
}

impl OptimizerKind {
    pub fn build(self, learning_rate: f32) -> Box<dyn Optimizer + Send> {
        match self {
            OptimizerKind::Adam => Box::new(Adam::new(learning_rate)),
            OptimizerKind::Sgd => Box::new(Sgd::new(learning_rate)),
        }
    }
}
