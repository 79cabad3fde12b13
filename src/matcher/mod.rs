//! Track-to-candidate matching
//!
//! Candidate generation (search strategies), pure scoring, and selection
//! (threshold, tie-breaks, close alternatives) are separate so the scoring
//! model can be tested without any network.

pub mod candidates;
pub mod normalize;
pub mod scoring;
pub mod selector;

pub use candidates::{CandidateGenerator, MatchCandidate, QueryStrategy, SearchHit, SearchProvider};
pub use scoring::{score_candidate, PenaltyFlag, ScoreBreakdown};
pub use selector::{MatchDecision, MatchSelector, ScoredCandidate};
