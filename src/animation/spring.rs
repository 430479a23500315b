use std::time::Duration;

use serde::{Deserialize, Serialize};

const REST_THRESHOLD: f64 = 1e-5;
const CRITICAL_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpringConfig {
    pub mass: f64,
    pub damping: f64,
    pub stiffness: f64,
}

impl SpringConfig {
    pub fn critically_damped(mass: f64, stiffness: f64) -> Self {
        Self {
            mass,
            damping: 2.0 * (stiffness * mass).sqrt(),
            stiffness,
        }
    }

    /// 1.0 is critical damping; below oscillates, above creeps.
    pub fn damping_ratio(&self) -> f64 {
        self.damping / (2.0 * (self.stiffness * self.mass).sqrt())
    }
}

impl Default for SpringConfig {
    fn default() -> Self {
        Self::critically_damped(1.0, 50.0)
    }
}

/// Damped spring pulling `value` toward `target`.
///
/// Integration uses the closed-form solution of the damped oscillator, so a
/// step of any length lands exactly on the trajectory and a critically damped
/// spring released from rest never passes its target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spring {
    config: SpringConfig,
    value: f64,
    velocity: f64,
    target: f64,
}

impl Spring {
    pub fn new(config: SpringConfig, initial: f64) -> Self {
        Self {
            config,
            value: initial,
            velocity: 0.0,
            target: initial,
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Moves the target only; value and velocity carry over.
    pub fn set_target(&mut self, target: f64) {
        self.target = target;
    }

    /// Places the spring at rest on `value`.
    pub fn jump_to(&mut self, value: f64) {
        self.value = value;
        self.target = value;
        self.velocity = 0.0;
    }

    pub fn is_at_rest(&self) -> bool {
        self.value == self.target && self.velocity == 0.0
    }

    pub fn step(&mut self, dt: Duration) {
        let t = dt.as_secs_f64();
        if t <= 0.0 || self.is_at_rest() {
            return;
        }

        let SpringConfig {
            mass,
            damping: _,
            stiffness,
        } = self.config;
        let omega = (stiffness / mass).sqrt();
        let zeta = self.config.damping_ratio();
        let x0 = self.value - self.target;
        let v0 = self.velocity;

        let (x, v) = if (zeta - 1.0).abs() < CRITICAL_TOLERANCE {
            let b = v0 + omega * x0;
            let decay = (-omega * t).exp();
            (decay * (x0 + b * t), decay * (v0 - omega * b * t))
        } else if zeta < 1.0 {
            let omega_d = omega * (1.0 - zeta * zeta).sqrt();
            let b = (v0 + zeta * omega * x0) / omega_d;
            let decay = (-zeta * omega * t).exp();
            let (sin, cos) = (omega_d * t).sin_cos();
            (
                decay * (x0 * cos + b * sin),
                decay * (v0 * cos - (x0 * omega_d + zeta * omega * b) * sin),
            )
        } else {
            let root = omega * (zeta * zeta - 1.0).sqrt();
            let r1 = -zeta * omega + root;
            let r2 = -zeta * omega - root;
            let c2 = (v0 - r1 * x0) / (r2 - r1);
            let c1 = x0 - c2;
            let (e1, e2) = ((r1 * t).exp(), (r2 * t).exp());
            (c1 * e1 + c2 * e2, r1 * c1 * e1 + r2 * c2 * e2)
        };

        if x.abs() < REST_THRESHOLD && v.abs() < REST_THRESHOLD {
            self.value = self.target;
            self.velocity = 0.0;
        } else {
            self.value = self.target + x;
            self.velocity = v;
        }
    }
}
