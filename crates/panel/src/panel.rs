//! Flat panels carrying uniform source and doublet densities.

use aero_kernel::{Point3d, Triangle3d, Vec3};
use serde::{Deserialize, Serialize};

use crate::kernels::{self, PanelFrame};

/// Chordwise position of the bound vortex on a quad, as a fraction of the chord.
const VORTEX_FRAC_POS: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurfacePosition {
    Bottom,
    /// Thin surface without thickness.
    Mid,
    Top,
    /// Wing tip closure.
    Side,
    /// Fuselage or other closed body.
    Body,
    Wake,
}

/// Influence of a flat panel on a field point.
///
/// Implementors provide the geometry; the singularity formulas are shared.
pub trait PanelKernel {
    /// Corner nodes in loop order, counter-clockwise about the normal.
    fn nodes(&self) -> &[Point3d];

    fn frame(&self) -> &PanelFrame;

    /// End points of the bound vortex, left then right.
    fn vortex_points(&self) -> (Point3d, Point3d);

    fn collocation_point(&self) -> Point3d {
        self.frame().origin
    }

    fn normal(&self) -> Vec3 {
        self.frame().n
    }

    fn area(&self) -> f64 {
        self.frame().area
    }

    fn trailing_vortex(&self) -> Vec3 {
        let (a, b) = self.vortex_points();
        b - a
    }

    fn doublet_potential(&self, c: &Point3d, self_influence: bool, core: f64, rff: Option<f64>) -> f64 {
        kernels::doublet_potential(self.nodes(), self.frame(), c, self_influence, core, rff)
    }

    fn doublet_velocity(&self, c: &Point3d, core: f64, rff: Option<f64>) -> Vec3 {
        kernels::doublet_velocity(self.nodes(), self.frame(), c, core, rff)
    }

    fn source_potential(&self, c: &Point3d, rff: Option<f64>) -> f64 {
        kernels::source_potential(self.nodes(), self.frame(), c, rff)
    }

    fn source_velocity(&self, c: &Point3d, self_influence: bool, rff: Option<f64>) -> Vec3 {
        kernels::source_velocity(self.nodes(), self.frame(), c, self_influence, rff)
    }
}

/// Flat quadrilateral defined by its leading (LA, LB) and trailing (TA, TB)
/// corners, A on the left looking downstream when the normal points up.
///
/// ```text
///   LA ---- LB
///   |        |     flow
///   |        |      |
///   TA ---- TB      v
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuadPanel {
    /// LA, TA, TB, LB.
    nodes: [Point3d; 4],
    frame: PanelFrame,
    va: Point3d,
    vb: Point3d,
}

impl QuadPanel {
    pub fn new(la: Point3d, lb: Point3d, ta: Point3d, tb: Point3d) -> Self {
        let n = (tb - la).cross(&(lb - ta));
        let area = n.norm() / 2.0;
        let n = n.normalized_or_zero();

        let mut sum = la.to_vec3();
        let mut count = 1.0;
        for (p, prev) in [(lb, la), (tb, lb), (ta, tb)] {
            if !p.is_same(&prev, 0.001) {
                sum += p.to_vec3();
                count += 1.0;
            }
        }
        let coll = Point3d::ORIGIN + sum / count;

        let smq = lb.midpoint(&tb) - coll;
        let smp = tb.midpoint(&ta) - coll;
        let m = smq.normalized_or_zero();
        let l = m.cross(&n);

        Self {
            nodes: [la, ta, tb, lb],
            frame: PanelFrame {
                origin: coll,
                l,
                m,
                n,
                area,
                max_size: smp.norm().max(smq.norm()),
            },
            va: la.lerp(&ta, VORTEX_FRAC_POS),
            vb: lb.lerp(&tb, VORTEX_FRAC_POS),
        }
    }

    pub fn la(&self) -> Point3d {
        self.nodes[0]
    }

    pub fn ta(&self) -> Point3d {
        self.nodes[1]
    }

    pub fn tb(&self) -> Point3d {
        self.nodes[2]
    }

    pub fn lb(&self) -> Point3d {
        self.nodes[3]
    }

    /// Ray intersection through the two half triangles.
    pub fn intersect(&self, origin: &Point3d, dir: &Vec3) -> Option<Point3d> {
        let [la, ta, tb, lb] = self.nodes;
        Triangle3d::new(la, ta, tb)
            .intersect_ray_inside(origin, dir)
            .or_else(|| Triangle3d::new(la, tb, lb).intersect_ray_inside(origin, dir))
            .map(|(p, _)| p)
    }
}

impl PanelKernel for QuadPanel {
    fn nodes(&self) -> &[Point3d] {
        &self.nodes
    }

    fn frame(&self) -> &PanelFrame {
        &self.frame
    }

    fn vortex_points(&self) -> (Point3d, Point3d) {
        (self.va, self.vb)
    }
}

/// Flat triangle with uniform densities. When trailing, the edge from
/// vertex 1 to vertex 2 is the trailing edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrianglePanel {
    nodes: [Point3d; 3],
    frame: PanelFrame,
}

impl TrianglePanel {
    pub fn new(a: Point3d, b: Point3d, c: Point3d) -> Self {
        Self::from(&Triangle3d::new(a, b, c))
    }
}

impl From<&Triangle3d> for TrianglePanel {
    fn from(t: &Triangle3d) -> Self {
        let [a, b, c] = *t.vertices();
        let origin = t.centroid();
        let n = t.normal();
        let m = (b.midpoint(&c) - origin).normalized_or_zero();
        let max_size = [a, b, c]
            .iter()
            .map(|p| p.distance_to(&origin))
            .fold(0.0, f64::max);
        Self {
            nodes: [a, b, c],
            frame: PanelFrame {
                origin,
                l: m.cross(&n),
                m,
                n,
                area: t.area(),
                max_size,
            },
        }
    }
}

impl PanelKernel for TrianglePanel {
    fn nodes(&self) -> &[Point3d] {
        &self.nodes
    }

    fn frame(&self) -> &PanelFrame {
        &self.frame
    }

    fn vortex_points(&self) -> (Point3d, Point3d) {
        (self.nodes[1], self.nodes[2])
    }
}

/// The closed set of panel shapes an analysis can mix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PanelShape {
    Quad(QuadPanel),
    Triangle(TrianglePanel),
}

impl PanelShape {
    /// Trailing edge nodes in loop order, where a wake column attaches.
    pub fn trailing_edge(&self) -> (Point3d, Point3d) {
        match self {
            PanelShape::Quad(q) => (q.ta(), q.tb()),
            PanelShape::Triangle(t) => (t.nodes[1], t.nodes[2]),
        }
    }
}

impl PanelKernel for PanelShape {
    fn nodes(&self) -> &[Point3d] {
        match self {
            PanelShape::Quad(q) => q.nodes(),
            PanelShape::Triangle(t) => t.nodes(),
        }
    }

    fn frame(&self) -> &PanelFrame {
        match self {
            PanelShape::Quad(q) => q.frame(),
            PanelShape::Triangle(t) => t.frame(),
        }
    }

    fn vortex_points(&self) -> (Point3d, Point3d) {
        match self {
            PanelShape::Quad(q) => q.vortex_points(),
            PanelShape::Triangle(t) => t.vortex_points(),
        }
    }
}

/// A body panel with its place in the mesh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Panel {
    pub shape: PanelShape,
    pub position: SurfacePosition,
    /// Adjacent panels on the same surface, used for surface gradients.
    pub neighbours: [Option<usize>; 4],
    pub is_leading: bool,
    pub is_trailing: bool,
    /// Spanwise strip the panel belongs to, if any.
    pub strip: Option<usize>,
}

impl Panel {
    pub fn new(shape: PanelShape, position: SurfacePosition) -> Self {
        Self {
            shape,
            position,
            neighbours: [None; 4],
            is_leading: false,
            is_trailing: false,
            strip: None,
        }
    }

    pub fn quad(q: QuadPanel, position: SurfacePosition) -> Self {
        Self::new(PanelShape::Quad(q), position)
    }

    pub fn triangle(t: TrianglePanel, position: SurfacePosition) -> Self {
        Self::new(PanelShape::Triangle(t), position)
    }

    pub fn is_mid(&self) -> bool {
        self.position == SurfacePosition::Mid
    }

    /// The normal of the mean surface, pointing up for both sides of a wing.
    pub fn surface_normal(&self) -> Vec3 {
        match self.position {
            SurfacePosition::Bottom => -self.normal(),
            _ => self.normal(),
        }
    }
}

impl PanelKernel for Panel {
    fn nodes(&self) -> &[Point3d] {
        self.shape.nodes()
    }

    fn frame(&self) -> &PanelFrame {
        self.shape.frame()
    }

    fn vortex_points(&self) -> (Point3d, Point3d) {
        self.shape.vortex_points()
    }
}
