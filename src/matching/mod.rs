//! Match scoring and match lifecycle.
//!
//! - **scorer**: pure compatibility scoring of two profiles in a scene
//! - **reason**: natural-language explanation of a pairing
//! - **service**: profile/scene lookups, `find_matches`, accept/reject

pub mod reason;
pub mod scorer;
pub mod service;

pub use reason::match_reason;
pub use service::MatchingService;
