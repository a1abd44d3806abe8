use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::point::Point3d;
use super::transform::{BoundingBox, Transform};
pub use super::triangle::Segment;
use super::triangle::Triangle3d;
use super::vector::Vec3;
use crate::Tolerance;
use crate::error::GeometryError;

/// A mesh vertex shared by one or more triangles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub position: Point3d,
    pub normal: Vec3,
    /// Indices of the incident triangles in the owning triangulation.
    pub triangles: Vec<usize>,
}

impl Node {
    fn new(position: Point3d) -> Self {
        Self {
            position,
            normal: Vec3::ZERO,
            triangles: Vec::new(),
        }
    }
}

/// An ordered set of triangles with derived nodes and edge connectivity.
///
/// Nodes and neighbour links are derived data. Any change to the triangle
/// list or to the geometry marks the neighbour links stale; queries that
/// depend on them refuse to run until [`Triangulation::make_triangle_connections`]
/// is called again.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Triangulation {
    triangles: Vec<Triangle3d>,
    nodes: Vec<Node>,
    tolerance: Tolerance,
    connections_valid: bool,
    normals_reversed: Option<bool>,
}

impl Triangulation {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty triangulation using `tolerance`, which must pass [`Tolerance::validate`].
    pub fn with_tolerance(tolerance: Tolerance) -> Result<Self, GeometryError> {
        tolerance.validate()?;
        Ok(Self {
            tolerance,
            ..Self::default()
        })
    }

    pub fn tolerance(&self) -> &Tolerance {
        &self.tolerance
    }

    pub fn triangles(&self) -> &[Triangle3d] {
        &self.triangles
    }

    pub fn triangle(&self, index: usize) -> Result<&Triangle3d, GeometryError> {
        self.triangles.get(index).ok_or(GeometryError::IndexOutOfRange {
            index,
            len: self.triangles.len(),
        })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn n_triangles(&self) -> usize {
        self.triangles.len()
    }

    pub fn connections_valid(&self) -> bool {
        self.connections_valid
    }

    pub fn reserve(&mut self, additional: usize) {
        self.triangles.reserve(additional);
    }

    /// Appending leaves the links of earlier triangles in place but marks
    /// them stale; they are rebuilt from scratch by the next
    /// [`Triangulation::make_triangle_connections`].
    pub fn append_triangle(&mut self, triangle: Triangle3d) {
        self.triangles.push(triangle);
        self.nodes.clear();
        self.normals_reversed = None;
        self.connections_valid = false;
    }

    pub fn clear(&mut self) {
        self.triangles.clear();
        self.invalidate_topology();
    }

    fn invalidate_topology(&mut self) {
        self.nodes.clear();
        self.normals_reversed = None;
        self.clear_connections();
    }

    /// Drop all neighbour links and mark them stale.
    pub fn clear_connections(&mut self) {
        for t in &mut self.triangles {
            t.clear_connections();
        }
        self.connections_valid = false;
    }

    /// Merge triangle vertices into unique nodes and index the triangles by node.
    ///
    /// Vertices closer than the merge length on every axis share a node. Node
    /// indices follow the order in which vertices are first met.
    pub fn make_nodes(&mut self) -> usize {
        let merge = self.tolerance.merge_length;
        let mut nodes: Vec<Node> = Vec::with_capacity(self.triangles.len() * 3);
        for (it, t) in self.triangles.iter_mut().enumerate() {
            for iv in 0..3 {
                let v = t.vertex(iv);
                let idx = match nodes.iter().rposition(|n| n.position.is_same(&v, merge)) {
                    Some(idx) => idx,
                    None => {
                        nodes.push(Node::new(v));
                        nodes.len() - 1
                    }
                };
                if nodes[idx].triangles.last() != Some(&it) {
                    nodes[idx].triangles.push(it);
                }
                t.nodes[iv] = Some(idx);
            }
        }
        debug!(
            n_nodes = nodes.len(),
            n_triangles = self.triangles.len(),
            "merged triangle vertices"
        );
        self.nodes = nodes;
        self.normals_reversed = None;
        self.nodes.len()
    }

    /// Average the incident triangle normals at every node.
    ///
    /// When the incident normals cancel out the node takes the normal of its
    /// first triangle, or +Z for an isolated node.
    pub fn make_node_normals(&mut self, reversed: bool) -> Result<(), GeometryError> {
        if self.nodes.is_empty() && !self.triangles.is_empty() {
            return Err(GeometryError::NodesNotBuilt);
        }
        let precision = self.tolerance.length_precision;
        for node in &mut self.nodes {
            let sum: Vec3 = node
                .triangles
                .iter()
                .filter_map(|&it| self.triangles.get(it))
                .map(|t| t.normal())
                .sum();
            let mut normal = if sum.norm() < precision {
                node.triangles
                    .first()
                    .and_then(|&it| self.triangles.get(it))
                    .map(|t| t.normal())
                    .filter(|n| n.norm() >= precision)
                    .unwrap_or(Vec3::Z)
            } else {
                sum.normalized_or_zero()
            };
            if reversed {
                normal = -normal;
            }
            node.normal = normal;
        }
        self.normals_reversed = Some(reversed);
        self.assign_node_normals();
        Ok(())
    }

    fn assign_node_normals(&mut self) {
        for t in &mut self.triangles {
            for iv in 0..3 {
                if let Some(node) = t.nodes[iv].and_then(|i| self.nodes.get(i)) {
                    t.node_normals[iv] = node.normal;
                }
            }
        }
    }

    /// Match triangle edges pairwise and store symmetric neighbour links.
    ///
    /// Two edges match when their end points coincide within the maximum
    /// connection distance, in either direction. An edge already linked is
    /// never relinked, so an edge shared by more than two triangles keeps
    /// its first partner only.
    #[instrument(skip(self), fields(n_triangles = self.triangles.len()))]
    pub fn make_triangle_connections(&mut self) {
        self.clear_connections();
        let tol = self.tolerance.max_distance;
        let mut n_links = 0usize;
        for it0 in 1..self.triangles.len() {
            let (lower, upper) = self.triangles.split_at_mut(it0);
            let t0 = &mut upper[0];
            for it1 in (0..it0).rev() {
                if t0.neighbour_count() >= 3 {
                    break;
                }
                let t1 = &mut lower[it1];
                for iedge in 0..3 {
                    if t1.neighbours[iedge].is_some() {
                        continue;
                    }
                    let Some(e0) = t0.edge_index(&t1.edge(iedge), tol) else {
                        continue;
                    };
                    if t0.neighbours[e0].is_none() {
                        t0.neighbours[e0] = Some(it1);
                        t1.neighbours[iedge] = Some(it0);
                        n_links += 1;
                    }
                    break;
                }
            }
        }
        self.connections_valid = true;
        info!(n_links, "triangle connections built");
    }

    /// Every triangle edge without a neighbour.
    pub fn free_edges(&self) -> Result<Vec<Segment>, GeometryError> {
        if !self.connections_valid {
            return Err(GeometryError::StaleConnections);
        }
        Ok(self
            .triangles
            .iter()
            .flat_map(|t| (0..3).filter(|&i| t.neighbours[i].is_none()).map(move |i| t.edge(i)))
            .collect())
    }

    /// Whether two triangles share more than one node.
    pub fn are_neighbours(&self, i: usize, j: usize) -> Result<bool, GeometryError> {
        let (a, b) = (self.triangle(i)?, self.triangle(j)?);
        if a.nodes.iter().chain(&b.nodes).any(Option::is_none) {
            return Err(GeometryError::NodesNotBuilt);
        }
        let shared = b.nodes.iter().flatten().filter(|&&n| a.has_node(n)).count();
        Ok(shared > 1)
    }

    /// Nearest intersection of the ray from `a` towards `b` with the triangles,
    /// returned with the normal of the triangle hit.
    pub fn intersect(&self, a: &Point3d, b: &Point3d) -> Option<(Point3d, Vec3)> {
        let dir = (*b - *a).normalized()?;
        self.triangles
            .iter()
            .filter_map(|t| {
                t.intersect_ray_inside(a, &dir)
                    .map(|(p, d)| (p, d, t.normal()))
            })
            .min_by(|x, y| x.1.total_cmp(&y.1))
            .map(|(p, _, n)| (p, n))
    }

    pub fn translate(&mut self, v: Vec3) {
        self.apply_transform(&Transform::translation(v));
    }

    pub fn scale(&mut self, sx: f64, sy: f64, sz: f64) {
        if sx * sy * sz == 0.0 {
            warn!(sx, sy, sz, "scaling with a zero factor collapses the mesh");
        }
        self.apply_transform(&Transform::scaling(sx, sy, sz));
    }

    pub fn rotate(&mut self, origin: &Point3d, axis: &Vec3, angle: f64) {
        self.apply_transform(&Transform::rotation_about(origin, axis, angle));
    }

    /// Mirror across the XZ plane, keeping outward normals.
    pub fn flip_xz(&mut self) {
        self.apply_transform(&Transform::mirror_xz());
    }

    fn apply_transform(&mut self, t: &Transform) {
        for tri in &mut self.triangles {
            tri.transform(t);
        }
        for node in &mut self.nodes {
            node.position = t.transform_point(&node.position);
        }
        self.clear_connections();
        if let Some(reversed) = self.normals_reversed {
            // node normals follow the transformed faces
            if let Err(e) = self.make_node_normals(reversed) {
                warn!(%e, "node normals dropped after transform");
                self.normals_reversed = None;
            }
        }
    }

    /// Append the mirror image of every triangle across the XZ plane.
    pub fn make_xz_symmetric(&mut self) {
        let mirror = Transform::mirror_xz();
        let images: Vec<Triangle3d> = self
            .triangles
            .iter()
            .map(|t| {
                let [a, b, c] = *t.vertices();
                let mut image = Triangle3d::new(a, b, c);
                image.transform(&mirror);
                image
            })
            .collect();
        self.triangles.extend(images);
        self.invalidate_topology();
    }

    pub fn flip_normals(&mut self) {
        for t in &mut self.triangles {
            t.reverse_orientation();
        }
        for node in &mut self.nodes {
            node.normal = -node.normal;
        }
        if let Some(reversed) = self.normals_reversed {
            self.normals_reversed = Some(!reversed);
        }
        self.assign_node_normals();
        self.clear_connections();
    }

    pub fn wetted_area(&self) -> f64 {
        self.triangles.iter().map(|t| t.area()).sum()
    }

    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_points(self.triangles.iter().flat_map(|t| t.vertices().iter()))
    }
}
