//! Panel meshes: the ordered list of body panels an analysis solves for.

use aero_kernel::geometry::distribution::cosine_spacing;
use aero_kernel::{GeometryError, Point3d, Triangulation};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::AnalysisError;
use crate::panel::{Panel, PanelKernel, QuadPanel, SurfacePosition, TrianglePanel};

/// Panels below this area are rejected.
const MIN_PANEL_AREA: f64 = 1e-12;

/// Trailing pair of a spanwise strip: the upper (top or mid) panel and the
/// bottom panel when the surface is thick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrailingPair {
    pub strip: usize,
    pub upper: usize,
    pub lower: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PanelMesh {
    panels: Vec<Panel>,
}

impl PanelMesh {
    pub fn new(panels: Vec<Panel>) -> Result<Self, AnalysisError> {
        let mesh = Self { panels };
        mesh.validate()?;
        Ok(mesh)
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.panels.is_empty() {
            return Err(AnalysisError::InvalidMesh("no panels".into()));
        }
        let n = self.panels.len();
        for (i, p) in self.panels.iter().enumerate() {
            if p.position == SurfacePosition::Wake {
                return Err(AnalysisError::InvalidMesh(format!(
                    "panel {i} is a wake panel"
                )));
            }
            if !(p.area() > MIN_PANEL_AREA) || !p.collocation_point().to_vec3().is_finite() {
                return Err(AnalysisError::InvalidMesh(format!(
                    "panel {i} is degenerate, area {}",
                    p.area()
                )));
            }
            if let Some(&j) = p.neighbours.iter().flatten().find(|&&j| j >= n || j == i) {
                return Err(AnalysisError::InvalidMesh(format!(
                    "panel {i} has invalid neighbour {j}"
                )));
            }
        }
        Ok(())
    }

    pub fn panels(&self) -> &[Panel] {
        &self.panels
    }

    pub fn panel(&self, i: usize) -> Option<&Panel> {
        self.panels.get(i)
    }

    pub fn len(&self) -> usize {
        self.panels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.panels.is_empty()
    }

    pub fn n_strips(&self) -> usize {
        self.panels
            .iter()
            .filter_map(|p| p.strip)
            .max()
            .map_or(0, |s| s + 1)
    }

    /// One pair per strip that ends on a trailing edge, in strip order.
    pub fn trailing_pairs(&self) -> Vec<TrailingPair> {
        let mut pairs: Vec<TrailingPair> = self
            .panels
            .iter()
            .enumerate()
            .filter(|(_, p)| {
                p.is_trailing && matches!(p.position, SurfacePosition::Mid | SurfacePosition::Top)
            })
            .filter_map(|(i, p)| {
                let strip = p.strip?;
                let lower = self.panels.iter().position(|q| {
                    q.is_trailing && q.position == SurfacePosition::Bottom && q.strip == Some(strip)
                });
                Some(TrailingPair {
                    strip,
                    upper: i,
                    lower,
                })
            })
            .collect();
        pairs.sort_by_key(|p| p.strip);
        pairs
    }

    /// Reference area of a strip: the mid panels, or the bottom panels of a thick surface.
    pub fn strip_area(&self, strip: usize) -> f64 {
        let in_strip = |p: &&Panel| p.strip == Some(strip);
        let mid: f64 = self
            .panels
            .iter()
            .filter(in_strip)
            .filter(|p| p.is_mid())
            .map(|p| p.area())
            .sum();
        if mid > 0.0 {
            return mid;
        }
        self.panels
            .iter()
            .filter(in_strip)
            .filter(|p| p.position == SurfacePosition::Bottom)
            .map(|p| p.area())
            .sum()
    }

    pub fn wetted_area(&self) -> f64 {
        self.panels.iter().map(|p| p.area()).sum()
    }

    pub fn has_thick_panels(&self) -> bool {
        self.panels.iter().any(|p| !p.is_mid())
    }

    /// Flat rectangular wing of thin (mid) panels in the z = 0 plane, leading
    /// edge on the y axis. Chordwise stations use cosine spacing.
    pub fn thin_wing(span: f64, chord: f64, nx: usize, ny: usize) -> Result<Self, AnalysisError> {
        check_sizes(span, chord, nx, ny)?;
        let xs: Vec<f64> = cosine_spacing(nx).iter().map(|t| t * chord).collect();
        let ys = span_stations(span, ny);

        let mut panels = Vec::with_capacity(nx * ny);
        for j in 0..ny {
            for i in 0..nx {
                let q = QuadPanel::new(
                    Point3d::new(xs[i], ys[j], 0.0),
                    Point3d::new(xs[i], ys[j + 1], 0.0),
                    Point3d::new(xs[i + 1], ys[j], 0.0),
                    Point3d::new(xs[i + 1], ys[j + 1], 0.0),
                );
                let mut p = Panel::quad(q, SurfacePosition::Mid);
                link_grid(&mut p, i, j, nx, ny, 0);
                panels.push(p);
            }
        }
        info!(n_panels = panels.len(), nx, ny, "thin wing mesh");
        Self::new(panels)
    }

    /// Closed rectangular wing with a symmetric four-digit section of the given
    /// thickness ratio: bottom surface, top surface, then the two tips.
    pub fn thick_wing(
        span: f64,
        chord: f64,
        thickness: f64,
        nx: usize,
        ny: usize,
    ) -> Result<Self, AnalysisError> {
        check_sizes(span, chord, nx, ny)?;
        if nx < 2 || !(thickness > 0.0 && thickness < 0.5) {
            return Err(AnalysisError::InvalidMesh(format!(
                "thick wing needs nx >= 2 and 0 < thickness < 0.5, got {nx} and {thickness}"
            )));
        }
        let xs: Vec<f64> = cosine_spacing(nx).iter().map(|t| t * chord).collect();
        let zs: Vec<f64> = xs
            .iter()
            .map(|x| half_thickness(x / chord, thickness) * chord)
            .collect();
        let ys = span_stations(span, ny);
        let top = |i: usize, y: f64| Point3d::new(xs[i], y, zs[i]);
        let bot = |i: usize, y: f64| Point3d::new(xs[i], y, -zs[i]);

        let mut panels = Vec::with_capacity(2 * nx * ny + 2 * nx);
        for j in 0..ny {
            for i in 0..nx {
                // A/B swapped so that the normal points down
                let q = QuadPanel::new(
                    bot(i, ys[j + 1]),
                    bot(i, ys[j]),
                    bot(i + 1, ys[j + 1]),
                    bot(i + 1, ys[j]),
                );
                let mut p = Panel::quad(q, SurfacePosition::Bottom);
                link_grid(&mut p, i, j, nx, ny, 0);
                panels.push(p);
            }
        }
        let offset = nx * ny;
        for j in 0..ny {
            for i in 0..nx {
                let q = QuadPanel::new(
                    top(i, ys[j]),
                    top(i, ys[j + 1]),
                    top(i + 1, ys[j]),
                    top(i + 1, ys[j + 1]),
                );
                let mut p = Panel::quad(q, SurfacePosition::Top);
                link_grid(&mut p, i, j, nx, ny, offset);
                panels.push(p);
            }
        }
        let (y_left, y_right) = (ys[0], ys[ny]);
        for i in 0..nx {
            let q = QuadPanel::new(bot(i, y_left), top(i, y_left), bot(i + 1, y_left), top(i + 1, y_left));
            panels.push(Panel::quad(q, SurfacePosition::Side));
        }
        for i in 0..nx {
            let q = QuadPanel::new(top(i, y_right), bot(i, y_right), top(i + 1, y_right), bot(i + 1, y_right));
            panels.push(Panel::quad(q, SurfacePosition::Side));
        }
        info!(n_panels = panels.len(), nx, ny, thickness, "thick wing mesh");
        Self::new(panels)
    }

    /// Closed body from a triangulation with outward normals; triangle
    /// neighbours become panel neighbours.
    pub fn from_triangulation(
        triangulation: &Triangulation,
        position: SurfacePosition,
    ) -> Result<Self, AnalysisError> {
        if !triangulation.connections_valid() {
            return Err(GeometryError::StaleConnections.into());
        }
        let panels: Vec<Panel> = triangulation
            .triangles()
            .iter()
            .map(|t| {
                let mut p = Panel::triangle(TrianglePanel::from(t), position);
                for (slot, n) in p.neighbours.iter_mut().zip(t.neighbours) {
                    *slot = n;
                }
                p
            })
            .collect();
        debug!(n_panels = panels.len(), "mesh from triangulation");
        Self::new(panels)
    }
}

fn check_sizes(span: f64, chord: f64, nx: usize, ny: usize) -> Result<(), AnalysisError> {
    if !(span > 0.0 && chord > 0.0) || nx == 0 || ny == 0 {
        return Err(AnalysisError::InvalidMesh(format!(
            "bad wing size: span {span}, chord {chord}, {nx}x{ny} panels"
        )));
    }
    Ok(())
}

/// Uniform spanwise stations from -span/2 to span/2.
fn span_stations(span: f64, ny: usize) -> Vec<f64> {
    (0..=ny)
        .map(|j| -span / 2.0 + span * j as f64 / ny as f64)
        .collect()
}

/// Four-digit symmetric half thickness with a closed trailing edge.
fn half_thickness(x: f64, t: f64) -> f64 {
    let x = x.clamp(0.0, 1.0);
    5.0 * t
        * (0.2969 * x.sqrt() - 0.1260 * x - 0.3516 * x * x + 0.2843 * x.powi(3)
            - 0.1036 * x.powi(4))
}

/// Left, right, upstream and downstream links within one structured surface.
fn link_grid(p: &mut Panel, i: usize, j: usize, nx: usize, ny: usize, offset: usize) {
    let idx = |i: usize, j: usize| offset + j * nx + i;
    p.neighbours = [
        (j > 0).then(|| idx(i, j - 1)),
        (j + 1 < ny).then(|| idx(i, j + 1)),
        (i > 0).then(|| idx(i - 1, j)),
        (i + 1 < nx).then(|| idx(i + 1, j)),
    ];
    p.is_leading = i == 0;
    p.is_trailing = i + 1 == nx;
    p.strip = Some(j);
}

#[cfg(test)]
mod tests {
    use super::*;
    use aero_kernel::{Triangle3d, Vec3};
    use approx::assert_relative_eq;

    #[test]
    fn test_thin_wing() {
        let mesh = PanelMesh::thin_wing(4.0, 1.0, 5, 8).unwrap();
        assert_eq!(mesh.len(), 40);
        assert_eq!(mesh.n_strips(), 8);
        assert_relative_eq!(mesh.wetted_area(), 4.0, epsilon = 1e-12);
        assert_relative_eq!(mesh.strip_area(3), 0.5, epsilon = 1e-12);
        let pairs = mesh.trailing_pairs();
        assert_eq!(pairs.len(), 8);
        assert!(pairs.iter().all(|p| p.lower.is_none()));
        assert_eq!(pairs[2].upper, 2 * 5 + 4);
        assert!(mesh.panels().iter().all(|p| p.normal().is_same(&Vec3::Z, 1e-12)));
        assert!(!mesh.has_thick_panels());
    }

    #[test]
    fn test_thick_wing_is_closed_and_outward() {
        let (nx, ny) = (6, 4);
        let mesh = PanelMesh::thick_wing(3.0, 1.0, 0.12, nx, ny).unwrap();
        assert_eq!(mesh.len(), 2 * nx * ny + 2 * nx);
        // a closed surface has zero net area vector
        let sum: Vec3 = mesh.panels().iter().map(|p| p.normal() * p.area()).sum();
        assert!(sum.norm() < 1e-10, "{sum:?}");
        for p in mesh.panels() {
            match p.position {
                SurfacePosition::Top => assert!(p.normal().z > 0.0),
                SurfacePosition::Bottom => assert!(p.normal().z < 0.0),
                SurfacePosition::Side => {
                    assert!(p.normal().y.abs() > 0.99);
                    assert_eq!(p.normal().y > 0.0, p.collocation_point().y > 0.0);
                }
                _ => unreachable!(),
            }
        }
        let pairs = mesh.trailing_pairs();
        assert_eq!(pairs.len(), ny);
        assert!(pairs.iter().all(|p| p.lower.is_some()));
    }

    #[test]
    fn test_invalid_meshes() {
        assert!(PanelMesh::new(Vec::new()).is_err());
        assert!(PanelMesh::thin_wing(0.0, 1.0, 2, 2).is_err());
        assert!(PanelMesh::thick_wing(1.0, 1.0, 0.12, 1, 2).is_err());

        let mut p = PanelMesh::thin_wing(1.0, 1.0, 1, 1).unwrap().panels()[0].clone();
        p.neighbours[0] = Some(7);
        assert!(matches!(PanelMesh::new(vec![p]), Err(AnalysisError::InvalidMesh(_))));
    }

    #[test]
    fn test_from_triangulation_requires_connections() {
        let mut tri = Triangulation::new();
        tri.append_triangle(Triangle3d::new(
            Point3d::new(0.0, 0.0, 0.0),
            Point3d::new(1.0, 0.0, 0.0),
            Point3d::new(0.0, 1.0, 0.0),
        ));
        tri.append_triangle(Triangle3d::new(
            Point3d::new(1.0, 0.0, 0.0),
            Point3d::new(1.0, 1.0, 0.0),
            Point3d::new(0.0, 1.0, 0.0),
        ));
        assert!(matches!(
            PanelMesh::from_triangulation(&tri, SurfacePosition::Body),
            Err(AnalysisError::Geometry(GeometryError::StaleConnections))
        ));
        tri.make_triangle_connections();
        let mesh = PanelMesh::from_triangulation(&tri, SurfacePosition::Body).unwrap();
        assert_eq!(mesh.len(), 2);
        assert_eq!(mesh.panels()[0].neighbours.iter().flatten().count(), 1);
        assert_eq!(mesh.panels()[1].neighbours.iter().flatten().copied().next(), Some(0));
    }
}
