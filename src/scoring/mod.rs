pub mod explorer;
pub mod fit;
pub mod opportunity;
pub mod tokenize;

pub use explorer::{
    score_keyword_opportunity, OpportunityReport, ScoreBreakdown, ScoreInput, ScoredVideo,
};
pub use opportunity::log_norm;
