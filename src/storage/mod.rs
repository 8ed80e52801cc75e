//! Storage layer for the Affinity matching core
//!
//! One repository trait per entity. Services receive them as
//! `Arc<dyn Trait>` so an embedding application can back them with its own
//! database; [`memory`] provides lock-protected in-memory implementations.
//!
//! Lookups return `Ok(None)` for unknown ids; the services turn that into
//! `AffinityError::NotFound` with a message naming the entity.

pub mod memory;

use crate::error::Result;
use crate::types::{
    ABTestConfig, ABTestResult, AdjustmentId, FeedbackId, FeedbackRecord, Match, MatchId,
    MatchStatus, MatchWeights, Profile, Scene, SceneConfig, TestGroup, TestId, UserId,
    WeightAdjustment,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub use memory::{
    InMemoryABTestStore, InMemoryAdjustmentStore, InMemoryFeedbackStore, InMemoryMatchRepository,
    InMemoryProfileProvider, InMemorySceneRegistry,
};

/// Source of user profiles (owned by the profile service)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProfileProvider: Send + Sync {
    /// Fetch a profile; fails with NotFound if the user is unknown
    async fn get_profile(&self, user_id: &UserId) -> Result<Profile>;

    /// All known user ids, in a stable enumeration order
    async fn list_user_ids(&self) -> Result<Vec<UserId>>;
}

/// Scene catalog with mutable match weights
#[async_trait]
pub trait SceneRegistry: Send + Sync {
    /// Fails with a validation error for a scene the registry does not carry
    async fn get_scene_config(&self, scene: Scene) -> Result<SceneConfig>;

    /// Replace the whole weight vector of a scene
    async fn set_match_weights(&self, scene: Scene, weights: MatchWeights) -> Result<()>;

    async fn list_scenes(&self) -> Result<Vec<SceneConfig>>;
}

/// Persisted match records
#[async_trait]
pub trait MatchRepository: Send + Sync {
    async fn insert_match(&self, record: &Match) -> Result<()>;

    async fn get_match(&self, id: &MatchId) -> Result<Option<Match>>;

    /// Set the status of a match, returning the updated record
    async fn update_status(&self, id: &MatchId, status: MatchStatus) -> Result<Option<Match>>;

    /// Matches where the user is either side, newest first
    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Match>>;
}

/// Append-only feedback log
#[async_trait]
pub trait FeedbackStore: Send + Sync {
    async fn append(&self, record: &FeedbackRecord) -> Result<()>;

    async fn get(&self, id: &FeedbackId) -> Result<Option<FeedbackRecord>>;

    /// Feedback for a scene with inclusive optional bounds, oldest first
    async fn list_by_scene(
        &self,
        scene: Scene,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<FeedbackRecord>>;
}

/// Weight adjustment history
#[async_trait]
pub trait AdjustmentStore: Send + Sync {
    async fn insert(&self, adjustment: &WeightAdjustment) -> Result<()>;

    async fn get(&self, id: &AdjustmentId) -> Result<Option<WeightAdjustment>>;

    /// Replace a stored adjustment (used to record its evaluation)
    async fn update(&self, adjustment: &WeightAdjustment) -> Result<()>;

    /// Adjustments of a scene created at or after `since`, oldest first
    async fn list_by_scene(
        &self,
        scene: Scene,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<WeightAdjustment>>;
}

/// A/B test configs, sticky assignments and evaluation results
#[async_trait]
pub trait ABTestStore: Send + Sync {
    async fn insert_test(&self, test: &ABTestConfig) -> Result<()>;

    async fn get_test(&self, id: &TestId) -> Result<Option<ABTestConfig>>;

    async fn update_test(&self, test: &ABTestConfig) -> Result<()>;

    async fn list_tests(&self, scene: Option<Scene>) -> Result<Vec<ABTestConfig>>;

    /// Mark an active test completed as one atomic step and return it
    ///
    /// `None` when the test is unknown or no longer active, so of several
    /// concurrent callers exactly one gets the test back.
    async fn complete_if_active(
        &self,
        id: &TestId,
        end_date: DateTime<Utc>,
    ) -> Result<Option<ABTestConfig>>;

    /// Store `group` for `(test_id, user_id)` unless an assignment already
    /// exists; returns whichever group is stored afterwards.
    ///
    /// Must be atomic per key: concurrent first calls all observe the same
    /// group.
    async fn assign_if_absent(
        &self,
        test_id: &TestId,
        user_id: &UserId,
        group: TestGroup,
    ) -> Result<TestGroup>;

    async fn get_assignment(&self, test_id: &TestId, user_id: &UserId)
        -> Result<Option<TestGroup>>;

    async fn list_assignments(&self, test_id: &TestId) -> Result<Vec<(UserId, TestGroup)>>;

    /// Store a result, replacing any previous result for the same test
    async fn put_result(&self, result: &ABTestResult) -> Result<()>;

    async fn get_result(&self, test_id: &TestId) -> Result<Option<ABTestResult>>;
}

/// Bundle of every repository the engine needs
#[derive(Clone)]
pub struct Repositories {
    pub profiles: Arc<dyn ProfileProvider>,
    pub scenes: Arc<dyn SceneRegistry>,
    pub matches: Arc<dyn MatchRepository>,
    pub feedback: Arc<dyn FeedbackStore>,
    pub adjustments: Arc<dyn AdjustmentStore>,
    pub ab_tests: Arc<dyn ABTestStore>,
}

impl Repositories {
    /// In-memory repositories with the built-in scene catalog and the given
    /// profile provider
    pub fn in_memory(profiles: Arc<dyn ProfileProvider>) -> Self {
        Self {
            profiles,
            scenes: Arc::new(InMemorySceneRegistry::new()),
            matches: Arc::new(InMemoryMatchRepository::new()),
            feedback: Arc::new(InMemoryFeedbackStore::new()),
            adjustments: Arc::new(InMemoryAdjustmentStore::new()),
            ab_tests: Arc::new(InMemoryABTestStore::new()),
        }
    }
}
