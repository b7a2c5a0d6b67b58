//! # Pipeline Stages
//!
//! | Index | Stage | Result handed to the observer |
//! |-------|-------|-------------------------------|
//! | 0 | Acquire | initial composite manifestation |
//! | 1 | Parse | composite with every component lifted |
//! | 2 | Flatten-by-kind | decision-bearing components flattened in place |
//! | 3 | Translate | composite in the target representation |
//! | 4 | Flatten-to-root | single artifact rooted at the root asset |
//! | 5 | Enrich | bound and woven final manifestation |

use crate::KbError;
use crate::primitives::STAGE_COUNT;
use serde::{Deserialize, Serialize};

/// One step of the transformation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Acquire,
    Parse,
    FlattenByKind,
    Translate,
    FlattenToRoot,
    Enrich,
}

impl PipelineStage {
    /// Every stage in execution order.
    pub const ALL: [PipelineStage; STAGE_COUNT] = [
        PipelineStage::Acquire,
        PipelineStage::Parse,
        PipelineStage::FlattenByKind,
        PipelineStage::Translate,
        PipelineStage::FlattenToRoot,
        PipelineStage::Enrich,
    ];

    /// Observer slot of this stage.
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            PipelineStage::Acquire => 0,
            PipelineStage::Parse => 1,
            PipelineStage::FlattenByKind => 2,
            PipelineStage::Translate => 3,
            PipelineStage::FlattenToRoot => 4,
            PipelineStage::Enrich => 5,
        }
    }

    /// The stage at `index`, or `InvalidStage` past the last one.
    pub fn from_index(index: usize) -> Result<Self, KbError> {
        Self::ALL
            .get(index)
            .copied()
            .ok_or(KbError::InvalidStage(index))
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            PipelineStage::Acquire => "Acquire",
            PipelineStage::Parse => "Parse",
            PipelineStage::FlattenByKind => "Flatten-by-kind",
            PipelineStage::Translate => "Translate",
            PipelineStage::FlattenToRoot => "Flatten-to-root",
            PipelineStage::Enrich => "Enrich",
        }
    }

    #[must_use]
    pub fn next(self) -> Option<PipelineStage> {
        Self::ALL.get(self.index().saturating_add(1)).copied()
    }

    #[must_use]
    pub fn previous(self) -> Option<PipelineStage> {
        self.index()
            .checked_sub(1)
            .and_then(|i| Self::ALL.get(i).copied())
    }

    /// Enrich is the last stage.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineStage::Enrich)
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.index(), self.name())
    }
}
