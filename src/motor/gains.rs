// Closed-loop gain sets
use serde::{Deserialize, Serialize};

/// One term of a gain set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainTerm {
    Kf,
    Kp,
    Ki,
    Kd,
    IntegralZone,
}

/// Feed-forward, PID gains and integral zone for one controller slot
///
/// Values are immutable once built; the `with_*` methods return a new set.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GainSet {
    kf: f64,
    kp: f64,
    ki: f64,
    kd: f64,
    i_zone: f64,
}

impl GainSet {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0, 0.0, 0.0);

    pub const fn new(kf: f64, kp: f64, ki: f64, kd: f64, i_zone: f64) -> Self {
        Self { kf, kp, ki, kd, i_zone }
    }

    pub const fn with_kf(self, kf: f64) -> Self {
        Self { kf, ..self }
    }

    pub const fn with_kp(self, kp: f64) -> Self {
        Self { kp, ..self }
    }

    pub const fn with_ki(self, ki: f64) -> Self {
        Self { ki, ..self }
    }

    pub const fn with_kd(self, kd: f64) -> Self {
        Self { kd, ..self }
    }

    pub const fn with_i_zone(self, i_zone: f64) -> Self {
        Self { i_zone, ..self }
    }

    pub fn kf(&self) -> f64 {
        self.kf
    }

    pub fn kp(&self) -> f64 {
        self.kp
    }

    pub fn ki(&self) -> f64 {
        self.ki
    }

    pub fn kd(&self) -> f64 {
        self.kd
    }

    pub fn i_zone(&self) -> f64 {
        self.i_zone
    }

    /// All five terms in write order
    pub fn terms(&self) -> [(GainTerm, f64); 5] {
        [
            (GainTerm::Kp, self.kp),
            (GainTerm::Ki, self.ki),
            (GainTerm::Kd, self.kd),
            (GainTerm::Kf, self.kf),
            (GainTerm::IntegralZone, self.i_zone),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_zero() {
        assert_eq!(GainSet::default(), GainSet::ZERO);
        assert!(GainSet::default().terms().iter().all(|&(_, v)| v == 0.0));
    }

    #[test]
    fn test_builder_leaves_other_terms() {
        let gains = GainSet::ZERO.with_kp(0.4).with_kd(2.0);
        assert_eq!(gains.kp(), 0.4);
        assert_eq!(gains.kd(), 2.0);
        assert_eq!(gains.ki(), 0.0);
        assert_eq!(gains, GainSet::new(0.0, 0.4, 0.0, 2.0, 0.0));
    }

    #[test]
    fn test_deserialize_partial() {
        let gains: GainSet = serde_json::from_str(r#"{"kp": 1.5, "i_zone": 200.0}"#).unwrap();
        assert_eq!(gains, GainSet::ZERO.with_kp(1.5).with_i_zone(200.0));
    }
}
