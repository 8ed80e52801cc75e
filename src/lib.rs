//! Affinity - scene-based match scoring and weight optimization
//!
//! Core of a social matching product that pairs users inside a fixed set of
//! scenes (study rooms, career consulting, emotional support, hobby groups):
//! - Compatibility scoring on personality, interests, scene and emotion
//! - Feedback collection and per-scene performance metrics
//! - Manual and feedback-driven tuning of scene weights
//! - A/B tests over two weight configurations with sticky assignment
//!
//! # Architecture
//!
//! - **Types**: Core records (Profile, Match, FeedbackRecord, ABTestConfig, ...)
//! - **Storage**: One repository trait per entity, in-memory implementations
//! - **Matching**: Pure scorer plus the matching service
//! - **Optimization**: Feedback, performance, tuner, A/B tests, reports
//! - **Engine**: Facade wiring the services over shared repositories
//!
//! # Example
//!
//! ```ignore
//! use affinity_core::{AffinityEngine, EngineConfig, Repositories, Scene};
//! use affinity_core::storage::InMemoryProfileProvider;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let profiles = Arc::new(InMemoryProfileProvider::new());
//!     let engine = AffinityEngine::new(
//!         Repositories::in_memory(profiles),
//!         EngineConfig::load(None)?,
//!     );
//!
//!     let matches = engine.find_matches(&"alice".into(), Scene::StudyRoom, 10).await?;
//!     if let Some(adjustment) = engine.auto_adjust_weights(Scene::StudyRoom).await? {
//!         println!("{}", adjustment.reason);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod matching;
pub mod optimization;
pub mod storage;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use config::EngineConfig;
pub use engine::AffinityEngine;
pub use error::{AffinityError, Result};
pub use storage::Repositories;
pub use types::{
    ABTestConfig, ABTestResult, Dimension, FeedbackRecord, Match, MatchStatus, MatchWeights,
    NewABTest, NewFeedback, OptimizationReport, PerformanceMetrics, Profile, Scene, SceneConfig,
    ScoreBreakdown, TestGroup, UserId, WeightAdjustment, Winner,
};
