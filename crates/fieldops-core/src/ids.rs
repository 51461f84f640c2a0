//! Identifier types for the field-service data model.
//!
//! Branches and supervisors are plain newtypes, the same pattern as the
//! bus/branch ids in the power-network model this crate started from.
//! Partners and assets are different: once the frequency engine splits an
//! overloaded entity into an A/B pair (a "repasse"), downstream stages must
//! keep treating the halves as first-class entities without ever
//! reconstructing provenance by string-munging a suffix. `PartnerId` and
//! `AssetId` are therefore a tagged enum instead of a transparent wrapper.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchId(u64);

impl BranchId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "branch#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SupervisorId(u64);

impl SupervisorId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SupervisorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "supervisor#{}", self.0)
    }
}

/// Which half of a split ("repasse") entity this identifier names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Half {
    A,
    B,
}

impl fmt::Display for Half {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Half::A => write!(f, "A"),
            Half::B => write!(f, "B"),
        }
    }
}

/// Identity for an entity that the frequency engine may split in two.
///
/// `Original` wraps the raw ingest-time numeric id. `SplitHalf` names a
/// synthetic half produced by S1; `parent` is the original's numeric id so
/// ordering and grouping (§5 canonical sort keys) stay stable across the
/// split regardless of which half is being compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SplitId {
    Original(u64),
    SplitHalf { parent: u64, which: Half },
}

impl SplitId {
    pub fn original(value: u64) -> Self {
        SplitId::Original(value)
    }

    pub fn split(parent: u64, which: Half) -> Self {
        SplitId::SplitHalf { parent, which }
    }

    /// The id of the entity this one was derived from, for grouping
    /// operations that must be agnostic to whether a split happened.
    pub fn parent(&self) -> u64 {
        match self {
            SplitId::Original(id) => *id,
            SplitId::SplitHalf { parent, .. } => *parent,
        }
    }

    pub fn is_split(&self) -> bool {
        matches!(self, SplitId::SplitHalf { .. })
    }
}

impl PartialOrd for SplitId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SplitId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        let which_key = |id: &SplitId| match id {
            SplitId::Original(_) => None,
            SplitId::SplitHalf { which, .. } => Some(*which),
        };
        (self.parent(), which_key(self)).cmp(&(other.parent(), which_key(other)))
    }
}

impl fmt::Display for SplitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SplitId::Original(id) => write!(f, "{id}"),
            SplitId::SplitHalf { parent, which } => write!(f, "{parent}_{which}"),
        }
    }
}

pub type PartnerId = SplitId;
pub type AssetId = SplitId;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_renders_suffix_only_at_the_text_boundary() {
        let original = PartnerId::original(42);
        let half_a = PartnerId::split(42, Half::A);
        assert_eq!(original.to_string(), "42");
        assert_eq!(half_a.to_string(), "42_A");
    }

    #[test]
    fn split_halves_share_a_parent_for_grouping() {
        let a = AssetId::split(7, Half::A);
        let b = AssetId::split(7, Half::B);
        assert_eq!(a.parent(), b.parent());
        assert!(a.is_split());
        assert!(!PartnerId::original(7).is_split());
    }

    #[test]
    fn ordering_is_stable_for_canonical_sort_keys() {
        let mut ids = vec![
            AssetId::split(2, Half::B),
            AssetId::original(1),
            AssetId::split(2, Half::A),
            AssetId::original(2),
        ];
        ids.sort();
        assert_eq!(
            ids,
            vec![
                AssetId::original(1),
                AssetId::original(2),
                AssetId::split(2, Half::A),
                AssetId::split(2, Half::B),
            ]
        );
    }
}
