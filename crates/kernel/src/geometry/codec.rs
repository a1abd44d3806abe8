//! Versioned little-endian binary stream for triangulations.
//!
//! Layout: `i32` format tag, `i32` triangle count, then three vertices of
//! three `f32` coordinates per triangle. Only the triangles are stored; nodes
//! and connections are rebuilt by the reader's caller.

use std::io::{Read, Write};

use tracing::debug;

use super::point::Point3d;
use super::triangle::Triangle3d;
use super::triangulation::Triangulation;
use crate::error::CodecError;

/// Tag written by this version.
pub const FORMAT_TAG: i32 = 500002;
/// Range of tags the reader accepts.
pub const ACCEPTED_TAGS: std::ops::RangeInclusive<i32> = 500001..=500010;

pub fn write_binary<W: Write>(triangulation: &Triangulation, out: &mut W) -> Result<(), CodecError> {
    let count = i32::try_from(triangulation.n_triangles())
        .map_err(|_| CodecError::InvalidCount(i32::MAX))?;
    out.write_all(&FORMAT_TAG.to_le_bytes())?;
    out.write_all(&count.to_le_bytes())?;
    for t in triangulation.triangles() {
        for v in t.vertices() {
            for c in [v.x, v.y, v.z] {
                out.write_all(&(c as f32).to_le_bytes())?;
            }
        }
    }
    Ok(())
}

pub fn read_binary<R: Read>(input: &mut R) -> Result<Triangulation, CodecError> {
    let tag = read_i32(input)?;
    if !ACCEPTED_TAGS.contains(&tag) {
        return Err(CodecError::UnknownFormat(tag));
    }
    let count = read_i32(input)?;
    if count < 0 {
        return Err(CodecError::InvalidCount(count));
    }

    let mut triangulation = Triangulation::new();
    triangulation.reserve((count as usize).min(1 << 20));
    for _ in 0..count {
        let mut v = [Point3d::ORIGIN; 3];
        for p in &mut v {
            *p = Point3d::new(
                read_f32(input)? as f64,
                read_f32(input)? as f64,
                read_f32(input)? as f64,
            );
        }
        triangulation.append_triangle(Triangle3d::new(v[0], v[1], v[2]));
    }
    debug!(tag, count, "triangulation read");
    Ok(triangulation)
}

fn read_i32<R: Read>(input: &mut R) -> Result<i32, CodecError> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_f32<R: Read>(input: &mut R) -> Result<f32, CodecError> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample() -> Triangulation {
        let mut t = Triangulation::new();
        t.append_triangle(Triangle3d::new(
            Point3d::new(0.0, 0.0, 0.0),
            Point3d::new(1.5, 0.0, 0.25),
            Point3d::new(0.0, 2.0, -1.0),
        ));
        t
    }

    #[test]
    fn test_layout() {
        let mut buf = Vec::new();
        write_binary(&sample(), &mut buf).unwrap();
        assert_eq!(buf.len(), 4 + 4 + 9 * 4);
        assert_eq!(&buf[..4], &500002i32.to_le_bytes());
        assert_eq!(&buf[4..8], &1i32.to_le_bytes());
        assert_eq!(&buf[8 + 4 * 3..8 + 4 * 4], &1.5f32.to_le_bytes());
    }

    #[test]
    fn test_read_back() {
        let mut buf = Vec::new();
        write_binary(&sample(), &mut buf).unwrap();
        let t = read_binary(&mut Cursor::new(buf)).unwrap();
        assert_eq!(t.n_triangles(), 1);
        assert_eq!(t.triangles()[0].vertices(), sample().triangles()[0].vertices());
        assert!(!t.connections_valid());
    }

    #[test]
    fn test_reads_large_stream() {
        let n = 200_000;
        let mut buf = Vec::with_capacity(8 + n * 36);
        buf.extend_from_slice(&FORMAT_TAG.to_le_bytes());
        buf.extend_from_slice(&(n as i32).to_le_bytes());
        for i in 0..n {
            let x = i as f32;
            for c in [x, 0.0, 0.0, x + 1.0, 0.0, 0.0, x, 1.0, 0.0] {
                buf.extend_from_slice(&c.to_le_bytes());
            }
        }
        let t = read_binary(&mut Cursor::new(buf)).unwrap();
        assert_eq!(t.n_triangles(), n);
        assert_eq!(t.triangles()[n - 1].vertex(1), Point3d::new(n as f64, 0.0, 0.0));
        assert!(!t.connections_valid());
    }

    #[test]
    fn test_rejects_unknown_tag() {
        let mut buf = 400000i32.to_le_bytes().to_vec();
        buf.extend_from_slice(&0i32.to_le_bytes());
        assert!(matches!(
            read_binary(&mut Cursor::new(buf)),
            Err(CodecError::UnknownFormat(400000))
        ));
    }

    #[test]
    fn test_older_tag_and_truncation() {
        let mut buf = 500001i32.to_le_bytes().to_vec();
        buf.extend_from_slice(&0i32.to_le_bytes());
        assert_eq!(read_binary(&mut Cursor::new(buf)).unwrap().n_triangles(), 0);

        let mut truncated = Vec::new();
        write_binary(&sample(), &mut truncated).unwrap();
        truncated.truncate(20);
        assert!(matches!(
            read_binary(&mut Cursor::new(truncated)),
            Err(CodecError::Io(_))
        ));

        let mut negative = 500002i32.to_le_bytes().to_vec();
        negative.extend_from_slice(&(-3i32).to_le_bytes());
        assert!(matches!(
            read_binary(&mut Cursor::new(negative)),
            Err(CodecError::InvalidCount(-3))
        ));
    }
}
