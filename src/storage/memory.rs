//! In-memory repository implementations
//!
//! Each logical store sits behind a single `tokio::sync::RwLock`. Reads take
//! the shared lock; appends and read-modify-write operations on one key take
//! the write lock for the whole operation, which makes them atomic per key.

use crate::error::{AffinityError, Result};
use crate::storage::{
    ABTestStore, AdjustmentStore, FeedbackStore, MatchRepository, ProfileProvider, SceneRegistry,
};
use crate::types::{
    ABTestConfig, ABTestResult, AdjustmentId, FeedbackId, FeedbackRecord, Match, MatchId,
    MatchStatus, MatchWeights, Profile, Scene, SceneConfig, TestGroup, TestId, TestStatus,
    UserId, WeightAdjustment,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default)]
struct ProfileTable {
    order: Vec<UserId>,
    profiles: HashMap<UserId, Profile>,
}

/// Profile provider backed by a map; enumeration follows insertion order
#[derive(Default)]
pub struct InMemoryProfileProvider {
    table: RwLock<ProfileTable>,
}

impl InMemoryProfileProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profiles(profiles: impl IntoIterator<Item = Profile>) -> Self {
        let mut table = ProfileTable::default();
        for profile in profiles {
            if !table.profiles.contains_key(&profile.user_id) {
                table.order.push(profile.user_id.clone());
            }
            table.profiles.insert(profile.user_id.clone(), profile);
        }
        Self {
            table: RwLock::new(table),
        }
    }

    /// Insert or replace a profile
    pub async fn upsert(&self, profile: Profile) {
        let mut table = self.table.write().await;
        if !table.profiles.contains_key(&profile.user_id) {
            table.order.push(profile.user_id.clone());
        }
        table.profiles.insert(profile.user_id.clone(), profile);
    }
}

#[async_trait]
impl ProfileProvider for InMemoryProfileProvider {
    async fn get_profile(&self, user_id: &UserId) -> Result<Profile> {
        let table = self.table.read().await;
        table
            .profiles
            .get(user_id)
            .cloned()
            .ok_or_else(|| AffinityError::not_found(format!("Profile not found: {}", user_id)))
    }

    async fn list_user_ids(&self) -> Result<Vec<UserId>> {
        Ok(self.table.read().await.order.clone())
    }
}

/// Scene registry seeded with the built-in catalog
pub struct InMemorySceneRegistry {
    configs: RwLock<HashMap<Scene, SceneConfig>>,
}

impl InMemorySceneRegistry {
    pub fn new() -> Self {
        Self::with_configs(Scene::ALL.into_iter().map(SceneConfig::default_for))
    }

    /// Registry carrying only the given scenes
    pub fn with_configs(configs: impl IntoIterator<Item = SceneConfig>) -> Self {
        let configs = configs.into_iter().map(|c| (c.scene, c)).collect();
        Self {
            configs: RwLock::new(configs),
        }
    }
}

impl Default for InMemorySceneRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn invalid_scene(scene: Scene) -> AffinityError {
    AffinityError::validation(format!("Invalid scene: {}", scene))
}

#[async_trait]
impl SceneRegistry for InMemorySceneRegistry {
    async fn get_scene_config(&self, scene: Scene) -> Result<SceneConfig> {
        self.configs
            .read()
            .await
            .get(&scene)
            .cloned()
            .ok_or_else(|| invalid_scene(scene))
    }

    async fn set_match_weights(&self, scene: Scene, weights: MatchWeights) -> Result<()> {
        let mut configs = self.configs.write().await;
        let config = configs.get_mut(&scene).ok_or_else(|| invalid_scene(scene))?;
        config.match_weights = weights;
        debug!("Replaced match weights for scene {}", scene);
        Ok(())
    }

    async fn list_scenes(&self) -> Result<Vec<SceneConfig>> {
        let mut scenes: Vec<SceneConfig> = self.configs.read().await.values().cloned().collect();
        scenes.sort_by_key(|c| c.scene);
        Ok(scenes)
    }
}

#[derive(Default)]
pub struct InMemoryMatchRepository {
    matches: RwLock<HashMap<MatchId, Match>>,
}

impl InMemoryMatchRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MatchRepository for InMemoryMatchRepository {
    async fn insert_match(&self, record: &Match) -> Result<()> {
        self.matches
            .write()
            .await
            .insert(record.match_id, record.clone());
        Ok(())
    }

    async fn get_match(&self, id: &MatchId) -> Result<Option<Match>> {
        Ok(self.matches.read().await.get(id).cloned())
    }

    async fn update_status(&self, id: &MatchId, status: MatchStatus) -> Result<Option<Match>> {
        let mut matches = self.matches.write().await;
        Ok(matches.get_mut(id).map(|m| {
            m.status = status;
            m.clone()
        }))
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Match>> {
        let mut found: Vec<Match> = self
            .matches
            .read()
            .await
            .values()
            .filter(|m| m.involves(user_id))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }
}

#[derive(Default)]
pub struct InMemoryFeedbackStore {
    // Append order; the stable sort in `list_by_scene` keeps it for equal timestamps
    records: RwLock<Vec<FeedbackRecord>>,
}

impl InMemoryFeedbackStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FeedbackStore for InMemoryFeedbackStore {
    async fn append(&self, record: &FeedbackRecord) -> Result<()> {
        let mut records = self.records.write().await;
        match records
            .iter_mut()
            .find(|existing| existing.feedback_id == record.feedback_id)
        {
            Some(existing) => *existing = record.clone(),
            None => records.push(record.clone()),
        }
        Ok(())
    }

    async fn get(&self, id: &FeedbackId) -> Result<Option<FeedbackRecord>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .find(|fb| fb.feedback_id == *id)
            .cloned())
    }

    async fn list_by_scene(
        &self,
        scene: Scene,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<FeedbackRecord>> {
        let mut found: Vec<FeedbackRecord> = self
            .records
            .read()
            .await
            .iter()
            .filter(|fb| fb.scene == scene)
            .filter(|fb| start.map_or(true, |s| fb.created_at >= s))
            .filter(|fb| end.map_or(true, |e| fb.created_at <= e))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(found)
    }
}

#[derive(Default)]
pub struct InMemoryAdjustmentStore {
    adjustments: RwLock<HashMap<AdjustmentId, WeightAdjustment>>,
}

impl InMemoryAdjustmentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AdjustmentStore for InMemoryAdjustmentStore {
    async fn insert(&self, adjustment: &WeightAdjustment) -> Result<()> {
        self.adjustments
            .write()
            .await
            .insert(adjustment.adjustment_id, adjustment.clone());
        Ok(())
    }

    async fn get(&self, id: &AdjustmentId) -> Result<Option<WeightAdjustment>> {
        Ok(self.adjustments.read().await.get(id).cloned())
    }

    async fn update(&self, adjustment: &WeightAdjustment) -> Result<()> {
        let mut adjustments = self.adjustments.write().await;
        match adjustments.get_mut(&adjustment.adjustment_id) {
            Some(existing) => {
                *existing = adjustment.clone();
                Ok(())
            }
            None => Err(AffinityError::not_found(format!(
                "Weight adjustment not found: {}",
                adjustment.adjustment_id
            ))),
        }
    }

    async fn list_by_scene(
        &self,
        scene: Scene,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<WeightAdjustment>> {
        let mut found: Vec<WeightAdjustment> = self
            .adjustments
            .read()
            .await
            .values()
            .filter(|adj| adj.scene == scene)
            .filter(|adj| since.map_or(true, |s| adj.created_at >= s))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(found)
    }
}

#[derive(Default)]
pub struct InMemoryABTestStore {
    tests: RwLock<HashMap<TestId, ABTestConfig>>,
    assignments: RwLock<HashMap<(TestId, UserId), TestGroup>>,
    results: RwLock<HashMap<TestId, ABTestResult>>,
}

impl InMemoryABTestStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ABTestStore for InMemoryABTestStore {
    async fn insert_test(&self, test: &ABTestConfig) -> Result<()> {
        self.tests.write().await.insert(test.test_id, test.clone());
        Ok(())
    }

    async fn get_test(&self, id: &TestId) -> Result<Option<ABTestConfig>> {
        Ok(self.tests.read().await.get(id).cloned())
    }

    async fn update_test(&self, test: &ABTestConfig) -> Result<()> {
        let mut tests = self.tests.write().await;
        match tests.get_mut(&test.test_id) {
            Some(existing) => {
                *existing = test.clone();
                Ok(())
            }
            None => Err(AffinityError::not_found(format!(
                "A/B test not found: {}",
                test.test_id
            ))),
        }
    }

    async fn list_tests(&self, scene: Option<Scene>) -> Result<Vec<ABTestConfig>> {
        let mut found: Vec<ABTestConfig> = self
            .tests
            .read()
            .await
            .values()
            .filter(|t| scene.map_or(true, |s| t.scene == s))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.start_date.cmp(&b.start_date));
        Ok(found)
    }

    async fn complete_if_active(
        &self,
        id: &TestId,
        end_date: DateTime<Utc>,
    ) -> Result<Option<ABTestConfig>> {
        let mut tests = self.tests.write().await;
        match tests.get_mut(id) {
            Some(test) if test.is_active() => {
                test.status = TestStatus::Completed;
                test.end_date = Some(end_date);
                Ok(Some(test.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn assign_if_absent(
        &self,
        test_id: &TestId,
        user_id: &UserId,
        group: TestGroup,
    ) -> Result<TestGroup> {
        let mut assignments = self.assignments.write().await;
        let stored = assignments
            .entry((*test_id, user_id.clone()))
            .or_insert(group);
        Ok(*stored)
    }

    async fn get_assignment(
        &self,
        test_id: &TestId,
        user_id: &UserId,
    ) -> Result<Option<TestGroup>> {
        Ok(self
            .assignments
            .read()
            .await
            .get(&(*test_id, user_id.clone()))
            .copied())
    }

    async fn list_assignments(&self, test_id: &TestId) -> Result<Vec<(UserId, TestGroup)>> {
        let mut found: Vec<(UserId, TestGroup)> = self
            .assignments
            .read()
            .await
            .iter()
            .filter(|((tid, _), _)| tid == test_id)
            .map(|((_, uid), group)| (uid.clone(), *group))
            .collect();
        found.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(found)
    }

    async fn put_result(&self, result: &ABTestResult) -> Result<()> {
        self.results
            .write()
            .await
            .insert(result.test_id, result.clone());
        Ok(())
    }

    async fn get_result(&self, test_id: &TestId) -> Result<Option<ABTestResult>> {
        Ok(self.results.read().await.get(test_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MatchId;
    use chrono::Duration;
    use std::sync::Arc;

    fn feedback(scene: Scene, created_at: DateTime<Utc>) -> FeedbackRecord {
        FeedbackRecord {
            feedback_id: FeedbackId::new(),
            user_id: UserId::from("u1"),
            match_id: MatchId::new(),
            scene,
            satisfaction_score: 4.0,
            conversation_quality: 8.0,
            match_accuracy: 4.0,
            positive_aspects: vec![],
            negative_aspects: vec![],
            suggestions: String::new(),
            created_at,
        }
    }

    #[tokio::test]
    async fn test_profile_enumeration_order() {
        let provider = InMemoryProfileProvider::with_profiles(vec![
            Profile::new("c"),
            Profile::new("a"),
            Profile::new("b"),
        ]);
        provider.upsert(Profile::new("a")).await;
        provider.upsert(Profile::new("d")).await;

        let ids = provider.list_user_ids().await.unwrap();
        let ids: Vec<&str> = ids.iter().map(|u| u.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b", "d"]);

        let err = provider
            .get_profile(&UserId::from("zzz"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_scene_registry_unknown_scene() {
        let registry =
            InMemorySceneRegistry::with_configs(vec![SceneConfig::default_for(Scene::StudyRoom)]);

        assert!(registry.get_scene_config(Scene::StudyRoom).await.is_ok());
        let err = registry
            .get_scene_config(Scene::TreeHole)
            .await
            .unwrap_err();
        assert!(err.is_validation());
        let err = registry
            .set_match_weights(Scene::TreeHole, MatchWeights::uniform())
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_feedback_window_bounds_are_inclusive() {
        let store = InMemoryFeedbackStore::new();
        let now = Utc::now();
        let old = feedback(Scene::StudyRoom, now - Duration::days(10));
        let edge = feedback(Scene::StudyRoom, now - Duration::days(7));
        let other_scene = feedback(Scene::TreeHole, now);
        for record in [&old, &edge, &other_scene] {
            store.append(record).await.unwrap();
        }

        let found = store
            .list_by_scene(Scene::StudyRoom, Some(edge.created_at), Some(now))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].feedback_id, edge.feedback_id);

        let all = store
            .list_by_scene(Scene::StudyRoom, None, None)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[0].created_at <= all[1].created_at);
    }

    #[tokio::test]
    async fn test_assign_if_absent_is_sticky_under_concurrency() {
        let store = Arc::new(InMemoryABTestStore::new());
        let test_id = TestId::new();
        let user = UserId::from("u1");

        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            let user = user.clone();
            let group = if i % 2 == 0 {
                TestGroup::Control
            } else {
                TestGroup::Treatment
            };
            handles.push(tokio::spawn(async move {
                store.assign_if_absent(&test_id, &user, group).await.unwrap()
            }));
        }

        let mut seen = Vec::new();
        for handle in handles {
            seen.push(handle.await.unwrap());
        }
        assert!(seen.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(
            store.get_assignment(&test_id, &user).await.unwrap(),
            Some(seen[0])
        );
        assert_eq!(store.list_assignments(&test_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_feedback_with_equal_timestamps_keeps_append_order() {
        let store = InMemoryFeedbackStore::new();
        let at = Utc::now();
        let mut appended = Vec::new();
        for _ in 0..16 {
            let record = feedback(Scene::TreeHole, at);
            store.append(&record).await.unwrap();
            appended.push(record.feedback_id);
        }

        let listed: Vec<FeedbackId> = store
            .list_by_scene(Scene::TreeHole, None, None)
            .await
            .unwrap()
            .into_iter()
            .map(|fb| fb.feedback_id)
            .collect();
        assert_eq!(listed, appended);
    }

    #[tokio::test]
    async fn test_complete_if_active_succeeds_once() {
        let store = Arc::new(InMemoryABTestStore::new());
        let weights = MatchWeights::new(0.25, 0.25, 0.25, 0.25);
        let test = ABTestConfig {
            test_id: TestId::new(),
            test_name: "t".into(),
            scene: Scene::TreeHole,
            control_weights: weights,
            treatment_weights: weights,
            traffic_split: 0.5,
            min_sample_size: 10,
            status: TestStatus::Active,
            start_date: Utc::now(),
            end_date: None,
        };
        store.insert_test(&test).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            let test_id = test.test_id;
            handles.push(tokio::spawn(async move {
                store.complete_if_active(&test_id, Utc::now()).await.unwrap()
            }));
        }
        let mut winners = 0;
        for handle in handles {
            if let Some(completed) = handle.await.unwrap() {
                assert_eq!(completed.status, TestStatus::Completed);
                assert!(completed.end_date.is_some());
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert!(!store.get_test(&test.test_id).await.unwrap().unwrap().is_active());
        assert!(store
            .complete_if_active(&TestId::new(), Utc::now())
            .await
            .unwrap()
            .is_none());
    }
}
