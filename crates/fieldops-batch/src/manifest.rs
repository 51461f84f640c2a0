use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::JobRecord;

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchManifest {
    pub created_at: DateTime<Utc>,
    pub num_jobs: usize,
    pub success: usize,
    pub warned: usize,
    pub failure: usize,
    pub jobs: Vec<JobRecord>,
}

impl BatchManifest {
    pub fn from_jobs(created_at: DateTime<Utc>, jobs: Vec<JobRecord>) -> Self {
        let success = jobs.iter().filter(|j| j.status == "ok").count();
        let warned = jobs.iter().filter(|j| j.status == "warn").count();
        let failure = jobs.iter().filter(|j| j.status == "error").count();
        Self {
            created_at,
            num_jobs: jobs.len(),
            success,
            warned,
            failure,
            jobs,
        }
    }
}

pub fn write_batch_manifest(path: &Path, manifest: &BatchManifest) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating manifest directory '{}'", parent.display()))?;
    }
    let json =
        serde_json::to_string_pretty(manifest).context("serializing batch manifest to JSON")?;
    fs::write(path, json).with_context(|| format!("writing batch manifest '{}'", path.display()))?;
    Ok(())
}

pub fn load_batch_manifest(path: &Path) -> Result<BatchManifest> {
    let file = fs::File::open(path)
        .with_context(|| format!("opening batch manifest '{}'", path.display()))?;
    serde_json::from_reader(file)
        .with_context(|| format!("parsing batch manifest '{}'", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::StageKind;

    #[test]
    fn manifest_counts_reflect_job_statuses() {
        let jobs = vec![
            JobRecord::ok("b1", StageKind::Schedule, 0),
            JobRecord::ok("b2", StageKind::Schedule, 2),
            JobRecord::error("b3", StageKind::Schedule, "infeasible"),
        ];
        let manifest = BatchManifest::from_jobs(Utc::now(), jobs);
        assert_eq!(manifest.success, 1);
        assert_eq!(manifest.warned, 1);
        assert_eq!(manifest.failure, 1);
    }

    #[test]
    fn manifest_writes_and_reads_back() {
        let jobs = vec![JobRecord::ok("b1", StageKind::Route, 0)];
        let manifest = BatchManifest::from_jobs(Utc::now(), jobs);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch_manifest.json");
        write_batch_manifest(&path, &manifest).unwrap();
        let parsed = load_batch_manifest(&path).unwrap();
        assert_eq!(parsed.success, 1);
    }
}
