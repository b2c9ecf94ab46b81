pub mod agreement;

pub use agreement::{match_events, MatchSummary};
