//! Operating-point results and the progress report channel.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use aero_kernel::{Point3d, Vec3};
use serde::{Deserialize, Serialize};

/// Spanwise distributions, one entry per station, ordered by increasing y.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SpanResults {
    pub position: Vec<f64>,
    pub chord: Vec<f64>,
    pub offset: Vec<f64>,
    pub twist: Vec<f64>,
    pub strip_area: Vec<f64>,
    pub re: Vec<f64>,
    pub cl: Vec<f64>,
    /// Induced angle, degrees.
    pub ai: Vec<f64>,
    pub icd: Vec<f64>,
    pub pcd: Vec<f64>,
    pub cm: Vec<f64>,
    pub cm_airfoil: Vec<f64>,
    pub xcp_rel: Vec<f64>,
    pub xcp_abs: Vec<f64>,
    pub xtr_top: Vec<f64>,
    pub xtr_bot: Vec<f64>,
    pub bending_moment: Vec<f64>,
}

impl SpanResults {
    pub(crate) fn zeroed(n: usize) -> Self {
        let z = || vec![0.0; n];
        Self {
            position: z(),
            chord: z(),
            offset: z(),
            twist: z(),
            strip_area: z(),
            re: z(),
            cl: z(),
            ai: z(),
            icd: z(),
            pcd: z(),
            cm: z(),
            cm_airfoil: z(),
            xcp_rel: z(),
            xcp_abs: z(),
            xtr_top: z(),
            xtr_bot: z(),
            bending_moment: z(),
        }
    }

    pub fn len(&self) -> usize {
        self.position.len()
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_empty()
    }

    /// The entries at `indices`, in that order.
    pub(crate) fn select(&self, indices: &[usize]) -> Self {
        let pick = |v: &[f64]| indices.iter().map(|&k| v[k]).collect::<Vec<f64>>();
        Self {
            position: pick(&self.position),
            chord: pick(&self.chord),
            offset: pick(&self.offset),
            twist: pick(&self.twist),
            strip_area: pick(&self.strip_area),
            re: pick(&self.re),
            cl: pick(&self.cl),
            ai: pick(&self.ai),
            icd: pick(&self.icd),
            pcd: pick(&self.pcd),
            cm: pick(&self.cm),
            cm_airfoil: pick(&self.cm_airfoil),
            xcp_rel: pick(&self.xcp_rel),
            xcp_abs: pick(&self.xcp_abs),
            xtr_top: pick(&self.xtr_top),
            xtr_bot: pick(&self.xtr_bot),
            bending_moment: pick(&self.bending_moment),
        }
    }
}

/// Integrated results of one angle of attack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LltOpPoint {
    pub alpha: f64,
    pub speed: f64,
    pub cl: f64,
    pub cdi: f64,
    pub cdv: f64,
    /// Pitching moment about the CoG.
    pub cm: f64,
    pub cm_induced: f64,
    pub cm_viscous: f64,
    pub rolling_moment: f64,
    pub yawing_moment: f64,
    pub yawing_induced: f64,
    pub yawing_viscous: f64,
    pub center_of_pressure: Point3d,
    /// Inviscid force over the dynamic pressure, body axes, m².
    pub force_per_q: Vec3,
    pub max_bending: f64,
    pub iterations: usize,
    pub converged: bool,
    /// Some station needed polar data outside the tabulated range.
    pub wing_out: bool,
    pub span: SpanResults,
}

/// Progress message for observers. Log-only messages carry no angle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LltOppReport {
    pub alpha: Option<f64>,
    /// Largest induced angle change of each iteration, degrees.
    pub max_a: Vec<f64>,
    pub message: String,
}

impl LltOppReport {
    pub fn log(message: impl Into<String>) -> Self {
        Self {
            alpha: None,
            max_a: Vec::new(),
            message: message.into(),
        }
    }
}

/// FIFO of reports shared between the analysis and its observers.
#[derive(Debug, Default)]
pub struct ReportQueue {
    queue: Mutex<VecDeque<LltOppReport>>,
    ready: Condvar,
}

impl ReportQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<LltOppReport>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, report: LltOppReport) {
        self.lock().push_back(report);
        self.ready.notify_all();
    }

    /// Oldest report, waiting up to `timeout` for one to arrive.
    pub fn next_report(&self, timeout: Duration) -> Option<LltOppReport> {
        let guard = self.lock();
        let (mut guard, _) = self
            .ready
            .wait_timeout_while(guard, timeout, |q| q.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        guard.pop_front()
    }

    pub fn drain(&self) -> Vec<LltOppReport> {
        self.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
