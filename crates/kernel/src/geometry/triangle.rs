use serde::{Deserialize, Serialize};

use super::point::Point3d;
use super::transform::Transform;
use super::vector::Vec3;

/// A straight edge between two points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: Point3d,
    pub end: Point3d,
}

impl Segment {
    pub fn new(start: Point3d, end: Point3d) -> Self {
        Self { start, end }
    }

    pub fn length(&self) -> f64 {
        self.start.distance_to(&self.end)
    }

    pub fn mid_point(&self) -> Point3d {
        self.start.midpoint(&self.end)
    }

    /// Same end points in either direction, within `tol` per axis.
    pub fn is_same(&self, other: &Segment, tol: f64) -> bool {
        (self.start.is_same(&other.start, tol) && self.end.is_same(&other.end, tol))
            || (self.start.is_same(&other.end, tol) && self.end.is_same(&other.start, tol))
    }
}

/// A flat triangle with cached normal and area.
///
/// Edge `i` joins vertices `i+1` and `i+2` and is therefore opposite vertex `i`;
/// `neighbours[i]` is the triangle sharing that edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Triangle3d {
    vertices: [Point3d; 3],
    normal: Vec3,
    area: f64,
    pub nodes: [Option<usize>; 3],
    pub neighbours: [Option<usize>; 3],
    pub node_normals: [Vec3; 3],
}

impl Triangle3d {
    pub fn new(a: Point3d, b: Point3d, c: Point3d) -> Self {
        let mut t = Self {
            vertices: [a, b, c],
            normal: Vec3::Z,
            area: 0.0,
            nodes: [None; 3],
            neighbours: [None; 3],
            node_normals: [Vec3::ZERO; 3],
        };
        t.update_properties();
        t
    }

    fn update_properties(&mut self) {
        let [a, b, c] = self.vertices;
        let n = (b - a).cross(&(c - a));
        self.area = n.norm() / 2.0;
        self.normal = n.normalized().unwrap_or(Vec3::ZERO);
        self.node_normals = [self.normal; 3];
    }

    pub fn vertices(&self) -> &[Point3d; 3] {
        &self.vertices
    }

    pub fn vertex(&self, i: usize) -> Point3d {
        self.vertices[i % 3]
    }

    /// Unit normal following the right-hand rule on the vertex order; zero for a null triangle.
    pub fn normal(&self) -> Vec3 {
        self.normal
    }

    pub fn area(&self) -> f64 {
        self.area
    }

    pub fn is_null(&self) -> bool {
        self.area < 1e-12
    }

    pub fn centroid(&self) -> Point3d {
        let [a, b, c] = self.vertices;
        Point3d::new((a.x + b.x + c.x) / 3.0, (a.y + b.y + c.y) / 3.0, (a.z + b.z + c.z) / 3.0)
    }

    /// Edge opposite vertex `i`.
    pub fn edge(&self, i: usize) -> Segment {
        Segment::new(self.vertices[(i + 1) % 3], self.vertices[(i + 2) % 3])
    }

    /// Index of the edge matching `seg` in either direction, if any.
    pub fn edge_index(&self, seg: &Segment, tol: f64) -> Option<usize> {
        (0..3).find(|&i| self.edge(i).is_same(seg, tol))
    }

    pub fn neighbour_count(&self) -> usize {
        self.neighbours.iter().filter(|n| n.is_some()).count()
    }

    pub fn has_node(&self, node: usize) -> bool {
        self.nodes.contains(&Some(node))
    }

    pub fn clear_connections(&mut self) {
        self.neighbours = [None; 3];
    }

    /// Intersection of the ray `origin + s·dir` (s >= 0) with the triangle
    /// interior, by the Möller–Trumbore test. Returns the hit point and `s`.
    pub fn intersect_ray_inside(&self, origin: &Point3d, dir: &Vec3) -> Option<(Point3d, f64)> {
        const EPS: f64 = 1e-12;
        let [a, b, c] = self.vertices;
        let e1 = b - a;
        let e2 = c - a;
        let p = dir.cross(&e2);
        let det = e1.dot(&p);
        if det.abs() < EPS {
            return None;
        }
        let inv = 1.0 / det;
        let s = *origin - a;
        let u = s.dot(&p) * inv;
        if !(0.0..=1.0).contains(&u) {
            return None;
        }
        let q = s.cross(&e1);
        let v = dir.dot(&q) * inv;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }
        let dist = e2.dot(&q) * inv;
        if dist < 0.0 {
            return None;
        }
        Some((*origin + *dir * dist, dist))
    }

    /// Apply an affine map to the vertices. Reflections swap two vertices so
    /// that the normal stays consistent with the mapped geometry.
    pub fn transform(&mut self, t: &Transform) {
        for v in &mut self.vertices {
            *v = t.transform_point(v);
        }
        if t.is_reflection() {
            self.vertices.swap(1, 2);
            self.nodes.swap(1, 2);
        }
        self.update_properties();
    }

    /// Swap the orientation, reversing the normal.
    pub fn reverse_orientation(&mut self) {
        self.vertices.swap(1, 2);
        self.nodes.swap(1, 2);
        self.neighbours.swap(1, 2);
        self.update_properties();
    }
}
