//! Envelope follower for sidechain ducking
//!
//! Rectifying one-pole peak tracker with separate attack and release times.
//! Output is clamped to `[0, 1]`.

/// Minimum attack/release time in seconds
const MIN_TIME_SECS: f32 = 0.0001;

/// Calculate a one-pole coefficient for a time constant in seconds
#[inline]
fn time_to_coeff(seconds: f32, sample_rate: f32) -> f32 {
    (-1.0 / (seconds.max(MIN_TIME_SECS) * sample_rate)).exp()
}

/// Tracks the amplitude contour of a signal
#[derive(Debug, Clone)]
pub struct EnvelopeFollower {
    envelope: f32,
    attack_secs: f32,
    release_secs: f32,
    attack_coeff: f32,
    release_coeff: f32,
    sample_rate: f32,
}

impl EnvelopeFollower {
    pub fn new(attack_secs: f32, release_secs: f32, sample_rate: f32) -> Self {
        let mut follower = Self {
            envelope: 0.0,
            attack_secs,
            release_secs,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            sample_rate: sample_rate.max(1.0),
        };
        follower.recalculate();
        follower
    }

    pub fn set_attack(&mut self, seconds: f32) {
        self.attack_secs = seconds.max(MIN_TIME_SECS);
        self.recalculate();
    }

    pub fn set_release(&mut self, seconds: f32) {
        self.release_secs = seconds.max(MIN_TIME_SECS);
        self.recalculate();
    }

    pub fn attack(&self) -> f32 {
        self.attack_secs
    }

    pub fn release(&self) -> f32 {
        self.release_secs
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate.max(1.0);
        self.recalculate();
    }

    /// Feed one sample and return the current envelope level
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let level = if input.is_finite() { input.abs().min(1.0) } else { 0.0 };
        let coeff = if level > self.envelope {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.envelope = level + coeff * (self.envelope - level);
        self.envelope
    }

    pub fn envelope(&self) -> f32 {
        self.envelope
    }

    pub fn reset(&mut self) {
        self.envelope = 0.0;
    }

    fn recalculate(&mut self) {
        self.attack_coeff = time_to_coeff(self.attack_secs, self.sample_rate);
        self.release_coeff = time_to_coeff(self.release_secs, self.sample_rate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_envelope_rises_to_level() {
        let mut env = EnvelopeFollower::new(0.001, 0.1, 48000.0);
        for _ in 0..4800 {
            env.process(0.8);
        }
        assert_abs_diff_eq!(env.envelope(), 0.8, epsilon = 1e-3);
    }

    #[test]
    fn test_envelope_tracks_rectified_input() {
        let mut env = EnvelopeFollower::new(0.001, 0.1, 48000.0);
        for i in 0..4800 {
            env.process(if i % 2 == 0 { 0.5 } else { -0.5 });
        }
        assert_abs_diff_eq!(env.envelope(), 0.5, epsilon = 1e-3);
    }

    #[test]
    fn test_release_slower_than_attack() {
        let mut env = EnvelopeFollower::new(0.001, 0.5, 1000.0);
        for _ in 0..100 {
            env.process(1.0);
        }
        for _ in 0..10 {
            env.process(0.0);
        }
        assert!(env.envelope() > 0.9);
    }

    #[test]
    fn test_envelope_bounded() {
        let mut env = EnvelopeFollower::new(0.0001, 0.1, 48000.0);
        for _ in 0..100 {
            assert!(env.process(50.0) <= 1.0);
        }
        env.process(f32::NAN);
        assert!(env.envelope().is_finite());
    }
}
