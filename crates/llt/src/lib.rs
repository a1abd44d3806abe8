//! Nonlinear lifting-line analysis of straight symmetric wings with viscous
//! section polars.

pub mod config;
pub mod error;
pub mod polar;
pub mod results;
pub mod task;
pub mod wing;

pub use config::{LltConfig, MAX_SPAN_STATIONS, SpeedMode};
pub use error::LltError;
pub use polar::{BlendedPolars, Polar, PolarLookup, PolarMesh, PolarPoint, ViscousPolars};
pub use results::{LltOpPoint, LltOppReport, ReportQueue, SpanResults};
pub use task::LltTask;
pub use wing::{LltWing, WingSection};
