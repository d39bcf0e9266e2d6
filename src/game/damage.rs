//! Damage computation shared by all weapons
//!
//! Final damage = base * weakening * splash (when applicable).
//! Distances passed in here are in meters.

use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DamageError {
    #[error("Damage range from {from} must not exceed to {to}")]
    InvalidRange { from: f64, to: f64 },
    #[error("Weakening inner radius {inner} must be below outer radius {outer}")]
    InvalidWeakeningRadii { inner: f64, outer: f64 },
    #[error("Weakening minimum {0} must be in [0, 1)")]
    InvalidWeakeningMinimum(f64),
    #[error("Splash minimum {minimum} must not exceed maximum {maximum}")]
    InvalidSplash { minimum: f64, maximum: f64 },
    #[error("Splash radius must be positive, got {0}")]
    InvalidSplashRadius(f64),
}

/// Kind of a damage notification sent to the shooter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageType {
    Normal,
    Critical,
    Fatal,
    Heal,
}

impl DamageType {
    pub fn key(self) -> &'static str {
        match self {
            DamageType::Normal => "NORMAL",
            DamageType::Critical => "CRITICAL",
            DamageType::Fatal => "FATAL",
            DamageType::Heal => "HEAL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DamageRange {
    pub from: f64,
    pub to: f64,
}

/// Base damage: a fixed value or a clipped Gaussian over a range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseDamage {
    Fixed(f64),
    Range(DamageRange),
}

/// Range falloff: 1.0 up to `inner`, `minimum` from `outer` on
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weakening {
    pub inner: f64,
    pub outer: f64,
    pub minimum: f64,
}

/// Area falloff: `maximum` at the impact center down to `minimum` at `radius`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Splash {
    pub minimum: f64,
    pub maximum: f64,
    pub radius: f64,
}

/// Damage block of a weapon's stats
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DamageConfig {
    pub base: BaseDamage,
    #[serde(default)]
    pub weakening: Option<Weakening>,
    #[serde(default)]
    pub splash: Option<Splash>,
}

impl DamageConfig {
    pub fn fixed(damage: f64) -> Self {
        Self {
            base: BaseDamage::Fixed(damage),
            weakening: None,
            splash: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DamageResult {
    pub damage: f64,
    pub weakening: f64,
    pub is_critical: bool,
}

/// Validated damage configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DamageCalculator {
    config: DamageConfig,
}

impl DamageCalculator {
    pub fn new(config: DamageConfig) -> Result<Self, DamageError> {
        if let BaseDamage::Range(range) = config.base {
            if range.from > range.to {
                return Err(DamageError::InvalidRange { from: range.from, to: range.to });
            }
        }
        if let Some(weakening) = config.weakening {
            if weakening.inner >= weakening.outer {
                return Err(DamageError::InvalidWeakeningRadii {
                    inner: weakening.inner,
                    outer: weakening.outer,
                });
            }
            if !(0.0..1.0).contains(&weakening.minimum) {
                return Err(DamageError::InvalidWeakeningMinimum(weakening.minimum));
            }
        }
        if let Some(splash) = config.splash {
            if splash.minimum > splash.maximum {
                return Err(DamageError::InvalidSplash {
                    minimum: splash.minimum,
                    maximum: splash.maximum,
                });
            }
            if splash.radius <= 0.0 {
                return Err(DamageError::InvalidSplashRadius(splash.radius));
            }
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &DamageConfig {
        &self.config
    }

    /// Fixed value, or a Gaussian sample (mean = midpoint, sd = width / 6) clipped to the range
    pub fn base_damage<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self.config.base {
            BaseDamage::Fixed(damage) => damage,
            BaseDamage::Range(range) => {
                let mean = (range.from + range.to) / 2.0;
                let sd = (range.to - range.from) / 6.0;
                (mean + sd * standard_normal(rng)).clamp(range.from, range.to)
            }
        }
    }

    /// Range falloff multiplier for a distance in meters
    pub fn weakening(&self, distance: f64) -> f64 {
        match self.config.weakening {
            None => 1.0,
            Some(w) if distance <= w.inner => 1.0,
            Some(w) if distance >= w.outer => w.minimum,
            Some(w) => w.minimum + (w.outer - distance) * (1.0 - w.minimum) / (w.outer - w.inner),
        }
    }

    /// Approximate splash multiplier for a distance in meters from the impact
    ///
    /// Linear between the edge and the center; not a physical model.
    pub fn splash(&self, distance: f64) -> f64 {
        match self.config.splash {
            None => 1.0,
            Some(s) if distance >= s.radius => s.minimum,
            Some(s) => s.minimum + (1.0 - distance.max(0.0) / s.radius) * (s.maximum - s.minimum),
        }
    }

    /// Full computation for a target `distance` meters away
    pub fn calculate<R: Rng + ?Sized>(&self, rng: &mut R, distance: f64, splash: bool) -> DamageResult {
        let weakening = self.weakening(distance);
        let mut damage = self.base_damage(rng) * weakening;
        if splash {
            damage *= self.splash(distance);
        }
        DamageResult {
            damage,
            weakening,
            is_critical: false,
        }
    }
}

/// Box-Muller standard normal sample
fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1: f64 = 1.0 - rng.gen::<f64>(); // (0, 1]
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Next hit of a falling-off chain
#[inline]
pub fn chain_falloff(previous: f64, factor: f64) -> f64 {
    (previous * factor).ceil()
}
