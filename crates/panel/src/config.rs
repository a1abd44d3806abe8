use aero_kernel::Point3d;
use aero_solver::Precision;
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// Boundary condition applied on thick surfaces. Thin (mid) surfaces always
/// use the Neumann condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BoundaryCondition {
    /// Zero perturbation potential inside the body.
    #[default]
    Dirichlet,
    /// Zero normal velocity at the collocation point.
    Neumann,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaneKind {
    /// Solid ground: images have the same sign.
    Ground,
    /// Free surface: images have opposite sign.
    FreeSurface,
}

/// Horizontal mirror plane at `z = -height`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroundPlane {
    pub height: f64,
    pub kind: PlaneKind,
}

impl GroundPlane {
    pub fn ground(height: f64) -> Self {
        Self {
            height,
            kind: PlaneKind::Ground,
        }
    }

    pub fn free_surface(height: f64) -> Self {
        Self {
            height,
            kind: PlaneKind::FreeSurface,
        }
    }

    /// Sign applied to the image contribution.
    pub fn coef(&self) -> f64 {
        match self.kind {
            PlaneKind::Ground => 1.0,
            PlaneKind::FreeSurface => -1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferenceDimensions {
    pub area: f64,
    pub span: f64,
    pub chord: f64,
}

impl Default for ReferenceDimensions {
    fn default() -> Self {
        Self {
            area: 1.0,
            span: 1.0,
            chord: 1.0,
        }
    }
}

/// Settings of a panel analysis, fixed at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub multithread: bool,
    pub max_threads: usize,
    pub precision: Precision,
    /// Far-field factor: beyond `rff` panel sizes the point-singularity
    /// approximations are used.
    pub rff: f64,
    pub core_radius: f64,
    pub boundary_condition: BoundaryCondition,
    pub trefftz_distance: f64,
    /// Streamwise extent of the wake behind the last trailing point.
    pub wake_length: f64,
    pub wake_panels: usize,
    /// Geometric progression ratio of wake panel lengths.
    pub wake_panel_factor: f64,
    pub vorton_wake: bool,
    /// Vorton core size as a fraction of the reference chord.
    pub vorton_core_size: f64,
    /// Length of the panel wake ahead of the vortons when the vorton wake is on.
    pub buffer_wake_length: f64,
    /// Vortons farther than this from the origin, in reference chords, are
    /// switched off.
    pub vorton_max_length: f64,
    /// Advect-and-shed passes of the vorton wake per operating point.
    pub vorton_iterations: usize,
    pub ground: Option<GroundPlane>,
    pub reference: ReferenceDimensions,
    pub density: f64,
    pub cog: Point3d,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            multithread: true,
            max_threads: 4,
            precision: Precision::Double,
            rff: 10.0,
            core_radius: 1e-5,
            boundary_condition: BoundaryCondition::Dirichlet,
            trefftz_distance: 100.0,
            wake_length: 100.0,
            wake_panels: 10,
            wake_panel_factor: 1.1,
            vorton_wake: false,
            vorton_core_size: 0.05,
            buffer_wake_length: 1.0,
            vorton_max_length: 30.0,
            vorton_iterations: 35,
            ground: None,
            reference: ReferenceDimensions::default(),
            density: 1.225,
            cog: Point3d::ORIGIN,
        }
    }
}

impl AnalysisConfig {
    pub fn single_threaded() -> Self {
        Self {
            multithread: false,
            max_threads: 1,
            ..Self::default()
        }
    }

    pub fn with_ground_effect(height: f64) -> Self {
        Self {
            ground: Some(GroundPlane::ground(height)),
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, AnalysisError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| AnalysisError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        let positive = [
            ("rff", self.rff),
            ("trefftz_distance", self.trefftz_distance),
            ("wake_length", self.wake_length),
            ("wake_panel_factor", self.wake_panel_factor),
            ("vorton_core_size", self.vorton_core_size),
            ("buffer_wake_length", self.buffer_wake_length),
            ("vorton_max_length", self.vorton_max_length),
            ("reference.area", self.reference.area),
            ("reference.span", self.reference.span),
            ("reference.chord", self.reference.chord),
            ("density", self.density),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(AnalysisError::InvalidConfig(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        if !(self.core_radius.is_finite() && self.core_radius >= 0.0) {
            return Err(AnalysisError::InvalidConfig(format!(
                "core_radius must be non-negative, got {}",
                self.core_radius
            )));
        }
        if self.max_threads == 0 {
            return Err(AnalysisError::InvalidConfig("max_threads must be at least 1".into()));
        }
        if self.wake_panels == 0 {
            return Err(AnalysisError::InvalidConfig("wake_panels must be at least 1".into()));
        }
        if let Some(g) = &self.ground {
            if !g.height.is_finite() {
                return Err(AnalysisError::InvalidConfig("ground height must be finite".into()));
            }
        }
        Ok(())
    }

    /// Row blocks used for parallel assembly and cancellation checks.
    pub fn n_blocks(&self) -> usize {
        if self.multithread {
            self.max_threads * 4
        } else {
            8
        }
    }

    pub fn vorton_core_length(&self) -> f64 {
        self.vorton_core_size * self.reference.chord
    }

    pub fn vorton_discard_length(&self) -> f64 {
        self.vorton_max_length * self.reference.chord
    }
}
