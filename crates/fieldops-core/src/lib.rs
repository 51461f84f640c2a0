//! Core data model for the field-service planning pipeline: entities (§3),
//! identifiers (§9/§12), the hard-error taxonomy (§7) and the diagnostics
//! collector used for everything recoverable.

pub mod diagnostics;
pub mod error;
pub mod ids;
pub mod model;

pub use diagnostics::{DiagnosticIssue, Diagnostics, Severity};
pub use error::{FieldOpsError, FieldOpsResult};
pub use ids::{AssetId, BranchId, Half, PartnerId, SplitId, SupervisorId};
pub use model::{
    Asset, Branch, ConsumptionRecord, Meters, Modality, Partner, Seconds, SkuLine, TimeWindow,
    TravelMatrixRow,
};
