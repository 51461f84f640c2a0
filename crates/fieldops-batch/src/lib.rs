//! Batch orchestration: wires S1-S4 together behind a bounded worker pool,
//! tracks per-subproblem outcomes, and writes the run manifest (§5, §6).

pub mod job;
pub mod manifest;
pub mod pipeline;
pub mod retry;

pub use job::{JobRecord, StageKind};
pub use manifest::{load_batch_manifest, write_batch_manifest, BatchManifest};
pub use pipeline::{run_pipeline, PipelineInput, PipelineOutput, PipelineSettings, RouteRecord};
pub use retry::{fold_until_converged, RetryParams, MAX_RETRY_ATTEMPTS};
