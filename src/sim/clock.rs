//! clock.rs
//! Simulated time for a sped-up plant.
//!
//! Maps wall-clock instants onto a time line running `scale` times faster, starting at the
//! clock's creation. The controller must see the same time line as the plant, otherwise its
//! integral and derivative gains are off by the scale factor.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaledClock {
    origin: Instant,
    scale: f64,
}

impl ScaledClock {
    /// Negative or non-finite scales run at wall-clock speed.
    pub fn new(scale: f64) -> Self {
        Self::starting_at(Instant::now(), scale)
    }

    pub fn starting_at(origin: Instant, scale: f64) -> Self {
        let scale = if scale.is_finite() && scale >= 0.0 { scale } else { 1.0 };
        Self { origin, scale }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Simulated instant for a wall-clock instant.
    pub fn at(&self, wall: Instant) -> Instant {
        let elapsed = wall.saturating_duration_since(self.origin).as_secs_f64();
        self.origin + Duration::from_secs_f64(elapsed * self.scale)
    }

    pub fn now(&self) -> Instant {
        self.at(Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stretches_elapsed_time() {
        let t0 = Instant::now();
        let clock = ScaledClock::starting_at(t0, 200.0);
        let sim = clock.at(t0 + Duration::from_millis(10));
        assert!((sim.duration_since(t0).as_secs_f64() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn unit_scale_is_wall_time() {
        let t0 = Instant::now();
        let clock = ScaledClock::starting_at(t0, 1.0);
        let wall = t0 + Duration::from_millis(1_234);
        assert!((clock.at(wall).duration_since(t0).as_secs_f64() - 1.234).abs() < 1e-6);
    }

    #[test]
    fn bad_scale_falls_back_to_wall_time() {
        assert_eq!(ScaledClock::new(f64::NAN).scale(), 1.0);
        assert_eq!(ScaledClock::new(-3.0).scale(), 1.0);
    }
}
