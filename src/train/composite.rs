use rand::{rngs::StdRng, SeedableRng};

use crate::config::CompositeInit;
use crate::error::Result;
use crate::math::tensor::Tensor;
use crate::optim::Optimizer;

/// The image being optimized together with the optimizer state that owns
/// its updates. The optimizer step is the only writer.
pub struct Composite {
    image: Tensor,
    optimizer: Box<dyn Optimizer + Send>,
}

impl Composite {
    /// Starts from a copy of `seed`.
    pub fn new(seed: &Tensor, optimizer: Box<dyn Optimizer + Send>) -> Composite {
        Composite { image: seed.clone(), optimizer }
    }

    pub fn image(&self) -> &Tensor {
        &self.image
    }

    pub fn into_image(self) -> Tensor {
        self.image
    }

    pub fn learning_rate(&self) -> f32 {
        self.optimizer.learning_rate()
    }

    pub fn set_learning_rate(&mut self, lr: f32) {
        self.optimizer.set_learning_rate(lr);
    }

    /// Applies one optimizer update from ∂L/∂image.
    pub fn step(&mut self, grad: &Tensor) -> Result<()> {
        self.image.ensure_same_shape("Composite::step", grad)?;
        self.optimizer.step(&mut self.image.data, &grad.data);
        Ok(())
    }
}

/// Builds the starting tensor for `init`; `content` fixes the shape.
pub fn initial_image(init: CompositeInit, content: &Tensor) -> Tensor {
    match init {
        CompositeInit::Content => content.clone(),
        CompositeInit::Noise { seed } => {
            Tensor::uniform(content.shape, -1.0, 1.0, &mut StdRng::seed_from_u64(seed))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optim::Sgd;

    #[test]
    fn noise_init_is_seeded() {
        let content = Tensor::zeros([1, 3, 4, 4]);
        let a = initial_image(CompositeInit::Noise { seed: 5 }, &content);
        let b = initial_image(CompositeInit::Noise { seed: 5 }, &content);
        let c = initial_image(CompositeInit::Noise { seed: 6 }, &content);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.data.iter().all(|v| (-1.0..1.0).contains(v)));
    }

    #[test]
    fn content_init_copies() {
        let content = Tensor::filled([1, 3, 2, 2], 0.25);
        assert_eq!(initial_image(CompositeInit::Content, &content), content);
    }

    #[test]
    fn step_updates_in_place_and_checks_shape() {
        let mut composite = Composite::new(&Tensor::filled([1, 1, 1, 2], 1.0), Box::new(Sgd::new(0.5)));
        composite.step(&Tensor::filled([1, 1, 1, 2], 2.0)).unwrap();
        assert_eq!(composite.image().data, vec![0.0, 0.0]);
        assert!(composite.step(&Tensor::zeros([1, 1, 2, 1])).is_err());
    }
}
