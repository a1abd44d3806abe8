//! 3D panel method for lifting surfaces and closed bodies.
//!
//! A [`PanelAnalysis`] owns a [`PanelMesh`] and its wake. It assembles the
//! influence matrix in row blocks, factorizes it once and solves the six
//! unit motions, so that any freestream and rotation is a linear combination.
//! Post-processing gives surface pressures, near- and far-field forces,
//! span loading, trim and stability derivatives.

pub mod axes;
pub mod config;
pub mod engine;
pub mod error;
pub mod forces;
pub mod kernels;
pub mod mesh;
pub mod panel;
pub mod stability;
pub mod status;
pub mod sweep;
pub mod vorton;
pub mod wake;

pub use axes::{wind_direction, wind_normal, wind_side};
pub use config::{AnalysisConfig, BoundaryCondition, GroundPlane, PlaneKind, ReferenceDimensions};
pub use engine::{PanelAnalysis, PanelSolution, Progress, ProgressFn, Stage, UnitSolutions};
pub use error::AnalysisError;
pub use forces::{AeroCoefficients, AeroForces, SpanDistribution, SpanStation};
pub use mesh::{PanelMesh, TrailingPair};
pub use panel::{Panel, PanelKernel, PanelShape, QuadPanel, SurfacePosition, TrianglePanel};
pub use stability::{StabilityDerivatives, TrimmedState};
pub use status::{AnalysisStatus, StatusCell};
pub use sweep::{OperatingPoint, PointOutcome};
pub use vorton::{NegatingVortex, Vorton, VortonWake};
pub use wake::WakeColumn;
