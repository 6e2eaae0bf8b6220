pub mod aggregator;
pub mod checkpoint;

pub use aggregator::{compute_counts, ActivityCounts, ActivityFeed, ActivityService};
pub use checkpoint::{ActivityCategory, SeenCheckpoints, CHECKPOINTS};
