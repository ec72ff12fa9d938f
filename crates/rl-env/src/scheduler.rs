//! Step-indexed hyperparameter schedules (exploration rate, learning rate).

/// A scalar hyperparameter as a function of the 0-based training step.
pub trait Schedule {
    fn value(&self, step: usize) -> f32;
}

/// The same value at every step.
#[derive(Clone, Copy, Debug)]
pub struct ConstantSchedule(pub f32);

impl Schedule for ConstantSchedule {
    fn value(&self, _step: usize) -> f32 {
        self.0
    }
}

/// Geometric decay with a floor: `max(floor, initial * decay^step)`.
#[derive(Clone, Copy, Debug)]
pub struct ExponentialSchedule {
    pub initial: f32,
    pub decay: f32,
    pub floor: f32,
}

impl Schedule for ExponentialSchedule {
    fn value(&self, step: usize) -> f32 {
        (self.initial * self.decay.powi(step as i32)).max(self.floor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_schedule() {
        let schedule = ConstantSchedule(0.2);
        assert_eq!(schedule.value(0), 0.2);
        assert_eq!(schedule.value(10_000), 0.2);
    }

    #[test]
    fn test_exponential_schedule_decays_to_floor() {
        let schedule = ExponentialSchedule {
            initial: 1.0,
            decay: 0.5,
            floor: 0.05,
        };
        assert_eq!(schedule.value(0), 1.0);
        assert_eq!(schedule.value(1), 0.5);
        assert_eq!(schedule.value(2), 0.25);
        // Monotone until the floor, then flat.
        assert!(schedule.value(3) > schedule.value(4));
        assert_eq!(schedule.value(100), 0.05);
    }
}
