/// Fixed, non-adaptive learning-rate decay.
///
/// The rate is divided by `factor` at epoch `floor(total / 2)` and again at
/// epoch `floor(3 * total / 4)`, whatever the loss is doing. When both
/// indices coincide (very short runs) the rate is divided once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecaySchedule {
    decay_epochs: [usize; 2],
    factor: f64,
}

/// Divisor applied at each decay epoch.
pub const DECAY_FACTOR: f64 = 10.0;

impl DecaySchedule {
    pub fn for_epochs(total_epochs: usize) -> DecaySchedule {
        DecaySchedule {
            decay_epochs: [total_epochs / 2, total_epochs * 3 / 4],
            factor: DECAY_FACTOR,
        }
    }

    pub fn decay_epochs(&self) -> [usize; 2] {
        self.decay_epochs
    }

    pub fn decays_at(&self, epoch: usize) -> bool {
        self.decay_epochs.contains(&epoch)
    }

    /// Rate to use for `epoch`, given the rate in force before it.
    pub fn apply(&self, epoch: usize, learning_rate: f64) -> f64 {
        if self.decays_at(epoch) {
            learning_rate / self.factor
        } else {
            learning_rate
        }
    }
}
