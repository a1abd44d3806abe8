pub mod error;
pub mod geometry;

pub use error::{CodecError, GeometryError};
pub use geometry::bspline::BSpline3d;
pub use geometry::point::Point3d;
pub use geometry::triangle::Triangle3d;
pub use geometry::triangulation::{Node, Segment, Triangulation};
pub use geometry::vector::{Vec2, Vec3};

use serde::{Deserialize, Serialize};

/// Tolerances used by mesh construction and geometric comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tolerance {
    /// Per-axis distance under which two triangle vertices merge into one node.
    pub merge_length: f64,
    /// Maximum vertex distance for two triangle edges to be matched as neighbours.
    pub max_distance: f64,
    /// Vector norms below this are treated as zero.
    pub length_precision: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            merge_length: 1e-4,
            max_distance: 1e-4,
            length_precision: 1e-9,
        }
    }
}

impl Tolerance {
    /// Parse a tolerance set from JSON, falling back to defaults for missing fields.
    pub fn from_json_str(json: &str) -> Result<Self, GeometryError> {
        let tol: Self =
            serde_json::from_str(json).map_err(|e| GeometryError::InvalidConfig(e.to_string()))?;
        tol.validate()?;
        Ok(tol)
    }

    pub fn validate(&self) -> Result<(), GeometryError> {
        for (name, value) in [
            ("merge_length", self.merge_length),
            ("max_distance", self.max_distance),
            ("length_precision", self.length_precision),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(GeometryError::InvalidConfig(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tolerance() {
        let t = Tolerance::default();
        assert_eq!(t.merge_length, 1e-4);
        assert_eq!(t.max_distance, 1e-4);
    }

    #[test]
    fn test_tolerance_from_json() {
        let t = Tolerance::from_json_str(r#"{ "merge_length": 0.001 }"#).unwrap();
        assert_eq!(t.merge_length, 0.001);
        assert_eq!(t.max_distance, 1e-4);

        assert!(Tolerance::from_json_str(r#"{ "max_distance": -1.0 }"#).is_err());
        assert!(Tolerance::from_json_str("not json").is_err());
        assert_eq!(Tolerance::from_json_str("{}").unwrap(), Tolerance::default());
    }

    #[test]
    fn test_triangulation_rejects_invalid_tolerance() {
        let tol = Tolerance {
            merge_length: 0.0,
            ..Tolerance::default()
        };
        assert!(matches!(
            Triangulation::with_tolerance(tol),
            Err(GeometryError::InvalidConfig(_))
        ));
        let nan = Tolerance {
            length_precision: f64::NAN,
            ..Tolerance::default()
        };
        assert!(Triangulation::with_tolerance(nan).is_err());

        let loose = Tolerance {
            merge_length: 1e-3,
            ..Tolerance::default()
        };
        let t = Triangulation::with_tolerance(loose).unwrap();
        assert_eq!(t.tolerance().merge_length, 1e-3);
    }
}
