//! Duplicate detection.
//!
//! - Size bucketing (Phase 1): [`bucket_by_size`], [`SizeBucketer`]
//! - Staged hashing (Phase 2 checksum, Phase 3 digest): [`HashPipeline`]
//! - Group formation and keeper selection: [`DuplicateGrouper`], [`KeeperPolicy`]

pub mod grouper;
pub mod groups;
pub mod keeper;
pub mod pipeline;

pub use grouper::{DuplicateGrouper, GroupTotals};
pub use groups::{
    bucket_by_size, BucketStats, DispositionStatus, DuplicateGroup, GroupMember, MatchGroup,
    MemberRole, SizeBucket, SizeBucketer,
};
pub use keeper::{KeepRule, KeeperPolicy};
pub use pipeline::{
    default_io_threads, HashMessage, HashPipeline, HashStage, PipelineConfig, PipelineEvent,
    PipelineOutcome,
};
