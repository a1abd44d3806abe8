//! Wind axes from the aerodynamic angles, in degrees.

use aero_kernel::Vec3;

/// Unit vector along the freestream.
pub fn wind_direction(alpha: f64, beta: f64) -> Vec3 {
    let (ca, sa) = (alpha.to_radians().cos(), alpha.to_radians().sin());
    let (cb, sb) = ((-beta).to_radians().cos(), (-beta).to_radians().sin());
    Vec3::new(ca * cb, sb, sa * cb)
}

/// Lift direction.
pub fn wind_normal(alpha: f64, _beta: f64) -> Vec3 {
    let a = alpha.to_radians();
    Vec3::new(-a.sin(), 0.0, a.cos())
}

/// Side force direction.
pub fn wind_side(alpha: f64, beta: f64) -> Vec3 {
    let (ca, sa) = (alpha.to_radians().cos(), alpha.to_radians().sin());
    let (cb, sb) = ((-beta).to_radians().cos(), (-beta).to_radians().sin());
    Vec3::new(-ca * sb, cb, -sa * sb)
}
