use aero_kernel::Point3d;
use serde::{Deserialize, Serialize};

use crate::error::LltError;

/// How the freestream speed is set for each angle of attack.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SpeedMode {
    /// Constant speed, m/s.
    FixedSpeed { speed: f64 },
    /// Speed adjusted so that lift balances the weight of `mass` kg.
    FixedLift { mass: f64 },
}

/// Settings of a lifting-line analysis, fixed at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LltConfig {
    pub max_iter: usize,
    /// Number of span intervals; stations 1..n_stations-1 carry unknowns.
    pub n_stations: usize,
    /// Under-relaxation divisor of the induced angle update.
    pub relaxation: f64,
    /// Largest induced angle change between two iterations, degrees.
    pub precision: f64,
    pub density: f64,
    /// Kinematic viscosity, m²/s.
    pub viscosity: f64,
    pub speed_mode: SpeedMode,
    pub cog: Point3d,
}

impl Default for LltConfig {
    fn default() -> Self {
        Self {
            max_iter: 100,
            n_stations: 20,
            relaxation: 20.0,
            precision: 0.01,
            density: 1.225,
            viscosity: 1.5e-5,
            speed_mode: SpeedMode::FixedSpeed { speed: 10.0 },
            cog: Point3d::ORIGIN,
        }
    }
}

/// Beyond this the station arrays stop making sense for a lifting line.
pub const MAX_SPAN_STATIONS: usize = 1000;

impl LltConfig {
    pub fn fixed_lift(mass: f64) -> Self {
        Self {
            speed_mode: SpeedMode::FixedLift { mass },
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, LltError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| LltError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), LltError> {
        if self.max_iter == 0 {
            return Err(LltError::InvalidConfig("max_iter must be at least 1".into()));
        }
        if !(3..=MAX_SPAN_STATIONS).contains(&self.n_stations) {
            return Err(LltError::InvalidConfig(format!(
                "n_stations must lie in 3..={MAX_SPAN_STATIONS}, got {}",
                self.n_stations
            )));
        }
        if !(self.relaxation >= 1.0) {
            return Err(LltError::InvalidConfig(format!(
                "relaxation must be at least 1, got {}",
                self.relaxation
            )));
        }
        let (mode_name, mode_value) = match self.speed_mode {
            SpeedMode::FixedSpeed { speed } => ("speed", speed),
            SpeedMode::FixedLift { mass } => ("mass", mass),
        };
        for (name, value) in [
            ("precision", self.precision),
            ("density", self.density),
            ("viscosity", self.viscosity),
            (mode_name, mode_value),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(LltError::InvalidConfig(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        Ok(())
    }

    pub fn is_fixed_lift(&self) -> bool {
        matches!(self.speed_mode, SpeedMode::FixedLift { .. })
    }
}
