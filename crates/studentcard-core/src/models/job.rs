//! Background jobs run by the backend: card generation and CSV imports.

use serde::{Deserialize, Serialize};

/// Terminal job statuses; anything else is still queued or running.
const COMPLETED: &str = "COMPLETED";
const FAILED: &str = "FAILED";

/// A card generation job (`GET /jobs/`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationJob {
    pub id: i64,
    pub job_type: String,
    pub provider: String,
    pub status: String,
    pub created_at: String,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub filter_criteria: Option<serde_json::Value>,
}

impl GenerationJob {
    pub fn is_finished(&self) -> bool {
        is_terminal(&self.status)
    }
}

/// A CSV import (`GET /imports/`, or the answer to an upload).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportJob {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub total_rows: u64,
    #[serde(default)]
    pub successful_rows: u64,
    #[serde(default)]
    pub failed_rows: u64,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl ImportJob {
    pub fn is_finished(&self) -> bool {
        is_terminal(&self.status)
    }
}

fn is_terminal(status: &str) -> bool {
    status.eq_ignore_ascii_case(COMPLETED) || status.eq_ignore_ascii_case(FAILED)
}
