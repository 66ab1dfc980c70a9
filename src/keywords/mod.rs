pub mod cluster;
pub mod normalize;

pub use cluster::{cluster_ideas, KeywordCluster};
pub use normalize::{is_low_signal_variant, matches_include_exclude, normalize};
