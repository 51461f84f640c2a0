use serde::{Deserialize, Serialize};

/// The three parallelizable stages (§5): S2 per branch, S3 per
/// `(branch, supervisor, day)`, S4 per `(branch, supervisor)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StageKind {
    Schedule,
    Route,
    Match,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Schedule => "schedule",
            StageKind::Route => "route",
            StageKind::Match => "match",
        }
    }
}

/// One subproblem's outcome, independent of what it actually computed; the
/// collector only needs the status to decide whether the batch as a whole
/// succeeded (§6 "Exit behavior").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub stage: String,
    pub status: String,
    pub warning_count: usize,
    pub error: Option<String>,
}

impl JobRecord {
    pub fn ok(job_id: impl Into<String>, stage: StageKind, warning_count: usize) -> Self {
        Self {
            job_id: job_id.into(),
            stage: stage.as_str().to_string(),
            status: if warning_count > 0 { "warn" } else { "ok" }.to_string(),
            warning_count,
            error: None,
        }
    }

    pub fn error(job_id: impl Into<String>, stage: StageKind, error: impl ToString) -> Self {
        Self {
            job_id: job_id.into(),
            stage: stage.as_str().to_string(),
            status: "error".to_string(),
            warning_count: 0,
            error: Some(error.to_string()),
        }
    }
}
