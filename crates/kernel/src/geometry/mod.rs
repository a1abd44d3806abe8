pub mod bspline;
pub mod codec;
pub mod distribution;
pub mod point;
pub mod transform;
pub mod triangle;
pub mod triangulation;
pub mod vector;
