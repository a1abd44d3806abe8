//! Symmetric wing planform described by half-span sections.

use serde::{Deserialize, Serialize};

use crate::error::LltError;

/// Planform section at span position `y` (m), root at `y = 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WingSection {
    pub y: f64,
    pub chord: f64,
    /// Leading-edge x offset, m.
    pub offset: f64,
    /// Twist, degrees.
    pub twist: f64,
}

impl WingSection {
    pub fn new(y: f64, chord: f64, offset: f64, twist: f64) -> Self {
        Self {
            y,
            chord,
            offset,
            twist,
        }
    }
}

/// A wing mirrored about `y = 0`, linear between sections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LltWing {
    sections: Vec<WingSection>,
}

impl LltWing {
    pub fn new(sections: Vec<WingSection>) -> Result<Self, LltError> {
        if sections.len() < 2 {
            return Err(LltError::InvalidWing("at least two sections are required".into()));
        }
        if sections[0].y != 0.0 {
            return Err(LltError::InvalidWing(format!(
                "root section must sit at y = 0, got {}",
                sections[0].y
            )));
        }
        if sections.windows(2).any(|w| !(w[1].y > w[0].y)) {
            return Err(LltError::InvalidWing("section positions must increase".into()));
        }
        for (i, s) in sections.iter().enumerate() {
            if !(s.chord.is_finite() && s.chord > 0.0) || !s.offset.is_finite() || !s.twist.is_finite() {
                return Err(LltError::InvalidWing(format!("bad section {i}: {s:?}")));
            }
        }
        Ok(Self { sections })
    }

    pub fn rectangular(span: f64, chord: f64) -> Result<Self, LltError> {
        Self::new(vec![
            WingSection::new(0.0, chord, 0.0, 0.0),
            WingSection::new(span / 2.0, chord, 0.0, 0.0),
        ])
    }

    /// Straight taper with leading-edge sweep and linear washout.
    pub fn tapered(
        span: f64,
        root_chord: f64,
        tip_chord: f64,
        sweep: f64,
        tip_twist: f64,
    ) -> Result<Self, LltError> {
        let half = span / 2.0;
        Self::new(vec![
            WingSection::new(0.0, root_chord, 0.0, 0.0),
            WingSection::new(half, tip_chord, half * sweep.to_radians().tan(), tip_twist),
        ])
    }

    pub fn sections(&self) -> &[WingSection] {
        &self.sections
    }

    pub fn planform_span(&self) -> f64 {
        2.0 * self.sections.last().map_or(0.0, |s| s.y)
    }

    pub fn planform_area(&self) -> f64 {
        2.0 * self
            .sections
            .windows(2)
            .map(|w| (w[1].y - w[0].y) * (w[0].chord + w[1].chord) / 2.0)
            .sum::<f64>()
    }

    pub fn aspect_ratio(&self) -> f64 {
        let b = self.planform_span();
        b * b / self.planform_area()
    }

    pub fn root_chord(&self) -> f64 {
        self.sections[0].chord
    }

    /// Mean aerodynamic chord.
    pub fn mac(&self) -> f64 {
        let integral: f64 = self
            .sections
            .windows(2)
            .map(|w| {
                let (c0, c1) = (w[0].chord, w[1].chord);
                (w[1].y - w[0].y) * (c0 * c0 + c0 * c1 + c1 * c1) / 3.0
            })
            .sum();
        2.0 * integral / self.planform_area()
    }

    /// Geometric mean chord, area over span.
    pub fn geometric_chord(&self) -> f64 {
        self.planform_area() / self.planform_span()
    }

    /// Interpolated section at relative span position `yob` in [-1, 1].
    pub fn section_at(&self, yob: f64) -> WingSection {
        let y = (yob.abs() * self.planform_span() / 2.0).min(self.planform_span() / 2.0);
        let k = self
            .sections
            .windows(2)
            .position(|w| y <= w[1].y)
            .unwrap_or(self.sections.len() - 2);
        let (s0, s1) = (&self.sections[k], &self.sections[k + 1]);
        let tau = (y - s0.y) / (s1.y - s0.y);
        WingSection {
            y: yob * self.planform_span() / 2.0,
            chord: s0.chord + (s1.chord - s0.chord) * tau,
            offset: s0.offset + (s1.offset - s0.offset) * tau,
            twist: s0.twist + (s1.twist - s0.twist) * tau,
        }
    }

    pub fn chord_at(&self, yob: f64) -> f64 {
        self.section_at(yob).chord
    }

    pub fn twist_at(&self, yob: f64) -> f64 {
        self.section_at(yob).twist
    }

    /// Quarter-chord x position.
    pub fn c4(&self, yob: f64) -> f64 {
        let s = self.section_at(yob);
        s.offset + s.chord / 4.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rectangular() {
        let w = LltWing::rectangular(8.0, 1.0).unwrap();
        assert_relative_eq!(w.planform_span(), 8.0);
        assert_relative_eq!(w.planform_area(), 8.0);
        assert_relative_eq!(w.aspect_ratio(), 8.0);
        assert_relative_eq!(w.mac(), 1.0);
        assert_relative_eq!(w.c4(0.3), 0.25);
    }

    #[test]
    fn test_tapered_interpolation() {
        let w = LltWing::tapered(10.0, 2.0, 1.0, 10.0, -3.0).unwrap();
        assert_relative_eq!(w.planform_area(), 15.0);
        let s = w.section_at(-0.5);
        assert_relative_eq!(s.y, -2.5);
        assert_relative_eq!(s.chord, 1.5);
        assert_relative_eq!(s.twist, -1.5);
        assert_relative_eq!(s.offset, 2.5 * 10f64.to_radians().tan(), epsilon = 1e-12);
        // mac of a linear taper: 2/3 cr (1 + l + l²)/(1 + l)
        assert_relative_eq!(w.mac(), 2.0 / 3.0 * 2.0 * (1.0 + 0.5 + 0.25) / 1.5, epsilon = 1e-12);
    }

    #[test]
    fn test_invalid_wings() {
        assert!(LltWing::new(vec![WingSection::new(0.0, 1.0, 0.0, 0.0)]).is_err());
        assert!(LltWing::rectangular(4.0, 0.0).is_err());
        assert!(LltWing::new(vec![
            WingSection::new(0.5, 1.0, 0.0, 0.0),
            WingSection::new(1.0, 1.0, 0.0, 0.0),
        ])
        .is_err());
        assert!(LltWing::rectangular(-2.0, 1.0).is_err());
    }
}
