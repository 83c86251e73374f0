/// Learning rate schedules, indexed by 1-based epoch.
pub trait LrScheduler {
    /// Learning rate used for the update of `epoch`.
    fn lr_at(&self, epoch: usize) -> f32;

    fn base_lr(&self) -> f32;
}

/// Multiplies the learning rate by `gamma` after every `step_size` completed epochs.
///
/// lr(epoch) = base_lr · gamma^⌊(epoch − 1) / step_size⌋
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepDecay {
    pub base_lr: f32,
    pub step_size: usize,
    pub gamma: f32,
}

impl StepDecay {
    pub fn new(base_lr: f32, step_size: usize, gamma: f32) -> Self {
        Self { base_lr, step_size: step_size.max(1), gamma }
    }
}

impl LrScheduler for StepDecay {
    fn lr_at(&self, epoch: usize) -> f32 {
        let decays = epoch.saturating_sub(1) / self.step_size;
        self.base_lr * self.gamma.powi(decays as i32)
    }

    fn base_lr(&self) -> f32 {
        self.base_lr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decays_once_per_interval() {
        let s = StepDecay::new(0.3, 50, 0.1);
        assert_eq!(s.lr_at(1), 0.3);
        assert_eq!(s.lr_at(50), 0.3);
        assert!((s.lr_at(51) - 0.03).abs() < 1e-7);
        assert!((s.lr_at(101) - 0.003).abs() < 1e-8);
    }

    #[test]
    fn zero_step_size_is_clamped() {
        let s = StepDecay::new(1.0, 0, 0.5);
        assert_eq!(s.lr_at(3), 0.25);
    }
}
