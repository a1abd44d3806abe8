//! Analysis life cycle shared between the engine and its observers.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum AnalysisStatus {
    Pending = 0,
    Running = 1,
    Finished = 2,
    Cancelled = 3,
}

impl AnalysisStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => AnalysisStatus::Running,
            2 => AnalysisStatus::Finished,
            3 => AnalysisStatus::Cancelled,
            _ => AnalysisStatus::Pending,
        }
    }
}

/// Atomic status cell. Clones share the same state, so a clone handed to
/// another thread can cancel the run.
#[derive(Debug, Clone)]
pub struct StatusCell {
    inner: Arc<AtomicU8>,
}

impl Default for StatusCell {
    fn default() -> Self {
        Self {
            inner: Arc::new(AtomicU8::new(AnalysisStatus::Pending as u8)),
        }
    }
}

impl StatusCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> AnalysisStatus {
        AnalysisStatus::from_u8(self.inner.load(Ordering::Acquire))
    }

    pub fn is_cancelled(&self) -> bool {
        self.get() == AnalysisStatus::Cancelled
    }

    /// Pending or Finished -> Running. Returns false if the run was cancelled.
    pub fn start(&self) -> bool {
        loop {
            let current = self.inner.load(Ordering::Acquire);
            match AnalysisStatus::from_u8(current) {
                AnalysisStatus::Cancelled => return false,
                AnalysisStatus::Running => return true,
                AnalysisStatus::Pending | AnalysisStatus::Finished => {
                    if self
                        .inner
                        .compare_exchange(
                            current,
                            AnalysisStatus::Running as u8,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        return true;
                    }
                }
            }
        }
    }

    /// Running -> Finished. A concurrent cancel wins.
    pub fn finish(&self) -> AnalysisStatus {
        match self.inner.compare_exchange(
            AnalysisStatus::Running as u8,
            AnalysisStatus::Finished as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => AnalysisStatus::Finished,
            Err(v) => AnalysisStatus::from_u8(v),
        }
    }

    /// Request cancellation. Has no effect once the run has finished.
    pub fn cancel(&self) {
        let _ = self.inner.fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
            match AnalysisStatus::from_u8(v) {
                AnalysisStatus::Pending | AnalysisStatus::Running => {
                    Some(AnalysisStatus::Cancelled as u8)
                }
                _ => None,
            }
        });
    }

    /// Back to Pending, clearing a previous cancellation.
    pub fn reset(&self) {
        self.inner
            .store(AnalysisStatus::Pending as u8, Ordering::Release);
    }
}
