pub mod parse;
pub mod serp;

pub use serp::{SerpBatch, SerpFetch, SerpOptions, YouTubeClient};
