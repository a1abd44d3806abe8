//! Flat wake panels trailing the body's trailing edges.

use aero_kernel::{Point3d, Vec3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AnalysisError;
use crate::mesh::PanelMesh;
use crate::panel::{PanelKernel, QuadPanel};

/// A column of wake panels shed by one trailing pair. Its doublet strength
/// is the difference of the upper and lower trailing panel strengths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WakeColumn {
    pub strip: usize,
    pub upper: usize,
    pub lower: Option<usize>,
    pub panels: Vec<QuadPanel>,
}

impl WakeColumn {
    /// Doublet strength carried by the column.
    pub fn strength(&self, mu: &[f64]) -> f64 {
        mu[self.upper] - self.lower.map_or(0.0, |l| mu[l])
    }

    /// Point halfway down the column, where the wake looks locally two dimensional.
    pub fn mid_point(&self) -> Option<Point3d> {
        let first = self.panels.first()?;
        let last = self.panels.last()?;
        let start = first.la().midpoint(&first.lb());
        let end = last.ta().midpoint(&last.tb());
        Some(start.midpoint(&end))
    }

    pub fn last_panel(&self) -> Option<&QuadPanel> {
        self.panels.last()
    }
}

/// Fractions of the column length at each wake node, in a geometric
/// progression of ratio `factor` starting at the trailing edge.
pub fn progression(n_panels: usize, factor: f64) -> Vec<f64> {
    let weights: Vec<f64> = (0..n_panels).map(|k| factor.powi(k as i32)).collect();
    let total: f64 = weights.iter().sum();
    let mut fractions = Vec::with_capacity(n_panels + 1);
    let mut acc = 0.0;
    fractions.push(0.0);
    for w in &weights {
        acc += w;
        fractions.push(acc / total);
    }
    fractions
}

/// Build one wake column per trailing pair. Each column starts on the upper
/// panel's trailing edge and follows `direction` down to the plane
/// `x = max trailing x + length`.
pub fn make_wake_columns(
    mesh: &PanelMesh,
    direction: Vec3,
    length: f64,
    n_panels: usize,
    factor: f64,
) -> Result<Vec<WakeColumn>, AnalysisError> {
    let dir = direction
        .normalized()
        .filter(|d| d.x > 0.1)
        .ok_or_else(|| AnalysisError::InvalidConfig(format!("wake direction {direction:?} must point downstream")))?;

    let pairs = mesh.trailing_pairs();
    let panels = mesh.panels();
    let x_end = pairs
        .iter()
        .map(|pair| {
            let (a, b) = panels[pair.upper].shape.trailing_edge();
            a.x.max(b.x)
        })
        .fold(f64::NEG_INFINITY, f64::max)
        + length;
    let fractions = progression(n_panels, factor);

    let columns: Vec<WakeColumn> = pairs
        .iter()
        .map(|pair| {
            let (ta, tb) = panels[pair.upper].shape.trailing_edge();
            let side = |p: Point3d| -> Vec<Point3d> {
                let reach = (x_end - p.x) / dir.x;
                fractions.iter().map(|f| p + dir * (reach * f)).collect()
            };
            let (left, right) = (side(ta), side(tb));
            let wake_panels = (0..n_panels)
                .map(|k| QuadPanel::new(left[k], right[k], left[k + 1], right[k + 1]))
                .collect();
            WakeColumn {
                strip: pair.strip,
                upper: pair.upper,
                lower: pair.lower,
                panels: wake_panels,
            }
        })
        .collect();
    debug!(
        n_columns = columns.len(),
        n_panels,
        x_end,
        "wake columns"
    );
    Ok(columns)
}

/// Unit vector of the bound vortex of a column's upper panel.
pub fn column_vortex(mesh: &PanelMesh, column: &WakeColumn) -> Vec3 {
    mesh.panels()[column.upper].trailing_vortex()
}
