use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Status string the backend reports once the report is ready.
pub const STATUS_COMPLETE: &str = "Deep Analysis Complete";

/// Status string the backend reports when the job gave up.
pub const STATUS_FAILED: &str = "Deep Analysis Failed";

/// Tri-state KPI completion as encoded by the backend (`0`, `1`, `-1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum KpiState {
    Pending,
    Success,
    Failure,
}

impl From<i64> for KpiState {
    fn from(code: i64) -> Self {
        match code {
            0 => KpiState::Pending,
            c if c > 0 => KpiState::Success,
            _ => KpiState::Failure,
        }
    }
}

impl From<KpiState> for i64 {
    fn from(state: KpiState) -> Self {
        match state {
            KpiState::Pending => 0,
            KpiState::Success => 1,
            KpiState::Failure => -1,
        }
    }
}

/// Response of `GET /deep_analysis/status/{session_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisStatus {
    pub status: String,
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub kpi_list: Vec<String>,
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub kpi_status: HashMap<String, KpiState>,
    #[serde(default)]
    pub report_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl AnalysisStatus {
    pub fn phase(&self) -> AnalysisPhase {
        AnalysisPhase::from_status(&self.status)
    }

    /// KPI state by name; KPIs missing from the status map are pending.
    pub fn kpi_state(&self, name: &str) -> KpiState {
        self.kpi_status
            .get(name)
            .copied()
            .unwrap_or(KpiState::Pending)
    }

    /// Number of KPI entries that are no longer pending.
    pub fn completed_kpis(&self) -> usize {
        self.kpi_status
            .values()
            .filter(|s| **s != KpiState::Pending)
            .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisPhase {
    NotStarted,
    Running,
    Complete,
    Failed,
}

impl AnalysisPhase {
    /// Any status string other than the two sentinels means the job is live.
    pub fn from_status(status: &str) -> Self {
        match status {
            STATUS_COMPLETE => AnalysisPhase::Complete,
            STATUS_FAILED => AnalysisPhase::Failed,
            _ => AnalysisPhase::Running,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AnalysisPhase::Complete | AnalysisPhase::Failed)
    }
}
