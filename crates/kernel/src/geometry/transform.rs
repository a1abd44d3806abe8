use nalgebra::{Matrix3, Rotation3, Unit, Vector3};
use serde::{Deserialize, Serialize};

use super::point::Point3d;
use super::vector::Vec3;

/// Affine map `p -> linear * p + offset`.
///
/// Mesh transforms (translation, scaling, rotation about an axis through a
/// point, mirroring) are all expressed as one of these so that triangle
/// vertices and normals are updated consistently.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub linear: Matrix3<f64>,
    pub offset: Vector3<f64>,
}

impl Transform {
    pub fn identity() -> Self {
        Self {
            linear: Matrix3::identity(),
            offset: Vector3::zeros(),
        }
    }

    pub fn translation(v: Vec3) -> Self {
        Self {
            linear: Matrix3::identity(),
            offset: Vector3::new(v.x, v.y, v.z),
        }
    }

    pub fn scaling(sx: f64, sy: f64, sz: f64) -> Self {
        Self {
            linear: Matrix3::from_diagonal(&Vector3::new(sx, sy, sz)),
            offset: Vector3::zeros(),
        }
    }

    /// Rotation by `angle` radians about the axis through `origin` with direction `axis`.
    /// A zero axis yields the identity.
    pub fn rotation_about(origin: &Point3d, axis: &Vec3, angle: f64) -> Self {
        let Some(k) = axis.normalized() else {
            return Self::identity();
        };
        let r = Rotation3::from_axis_angle(&Unit::new_unchecked(Vector3::new(k.x, k.y, k.z)), angle)
            .into_inner();
        let o = Vector3::new(origin.x, origin.y, origin.z);
        Self {
            linear: r,
            offset: o - r * o,
        }
    }

    /// Reflection across the XZ plane (y -> -y).
    pub fn mirror_xz() -> Self {
        Self::scaling(1.0, -1.0, 1.0)
    }

    pub fn transform_point(&self, p: &Point3d) -> Point3d {
        let v = self.linear * Vector3::new(p.x, p.y, p.z) + self.offset;
        Point3d::new(v.x, v.y, v.z)
    }

    pub fn transform_vector(&self, v: &Vec3) -> Vec3 {
        let w = self.linear * Vector3::new(v.x, v.y, v.z);
        Vec3::new(w.x, w.y, w.z)
    }

    /// Whether the map reverses orientation; triangle winding must be flipped when it does.
    pub fn is_reflection(&self) -> bool {
        self.linear.determinant() < 0.0
    }

    /// Compose: apply `self` first, then `next`.
    pub fn then(&self, next: &Transform) -> Transform {
        Transform {
            linear: next.linear * self.linear,
            offset: next.linear * self.offset + next.offset,
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Point3d,
    pub max: Point3d,
}

impl BoundingBox {
    pub fn empty() -> Self {
        Self {
            min: Point3d::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            max: Point3d::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point3d>) -> Self {
        let mut bb = Self::empty();
        for p in points {
            bb.expand_to_include(p);
        }
        bb
    }

    pub fn expand_to_include(&mut self, p: &Point3d) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.min.z = self.min.z.min(p.z);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
        self.max.z = self.max.z.max(p.z);
    }

    pub fn center(&self) -> Point3d {
        self.min.midpoint(&self.max)
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn is_valid(&self) -> bool {
        self.min.x <= self.max.x && self.min.y <= self.max.y && self.min.z <= self.max.z
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_identity_transform() {
        let t = Transform::identity();
        let p = Point3d::new(1.0, 2.0, 3.0);
        assert!(t.transform_point(&p).is_same(&p, 1e-12));
        assert!(!t.is_reflection());
    }

    #[test]
    fn test_rotation_about_offset_point() {
        let t = Transform::rotation_about(&Point3d::new(1.0, 0.0, 0.0), &Vec3::Z, FRAC_PI_2);
        let result = t.transform_point(&Point3d::new(2.0, 0.0, 0.0));
        assert!(result.is_same(&Point3d::new(1.0, 1.0, 0.0), 1e-12));
        // vectors ignore the offset
        let v = t.transform_vector(&Vec3::X);
        assert!(v.is_same(&Vec3::Y, 1e-12));
    }

    #[test]
    fn test_mirror_is_reflection() {
        let t = Transform::mirror_xz();
        assert!(t.is_reflection());
        let p = t.transform_point(&Point3d::new(1.0, 2.0, 3.0));
        assert!(p.is_same(&Point3d::new(1.0, -2.0, 3.0), 1e-12));
    }

    #[test]
    fn test_compose_transforms() {
        let t1 = Transform::translation(Vec3::new(1.0, 0.0, 0.0));
        let t2 = Transform::scaling(2.0, 2.0, 2.0);
        let p = t1.then(&t2).transform_point(&Point3d::ORIGIN);
        assert!(p.is_same(&Point3d::new(2.0, 0.0, 0.0), 1e-12));
    }

    #[test]
    fn test_bounding_box() {
        let pts = [Point3d::new(-1.0, 0.0, 2.0), Point3d::new(3.0, -2.0, 0.0)];
        let bb = BoundingBox::from_points(&pts);
        assert!(bb.is_valid());
        assert!(bb.center().is_same(&Point3d::new(1.0, -1.0, 1.0), 1e-12));
        assert!(!BoundingBox::empty().is_valid());
    }
}
