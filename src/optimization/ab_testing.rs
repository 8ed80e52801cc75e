//! A/B testing for scene match weights.
//!
//! A test compares a control and a treatment weight configuration for one
//! scene. Users are assigned to a group on first contact and keep it for the
//! life of the test. Evaluation splits the scene's feedback by group and
//! decides a winner; completing the test can promote the treatment weights
//! to the scene through the weight tuner.
//!
//! # Lifecycle
//!
//! ```text
//! create_ab_test → Active ── assign / evaluate (repeatable) ──→ complete → Completed
//! ```

use crate::config::ABTestingSettings;
use crate::error::{AffinityError, Result};
use crate::optimization::significance::{GroupSample, SignificanceTest};
use crate::optimization::tuner::WeightTuner;
use crate::storage::{ABTestStore, FeedbackStore};
use crate::types::{
    ABTestConfig, ABTestResult, MatchWeights, NewABTest, Scene, TestGroup, TestId, TestStatus,
    UserId, WeightAdjustment, Winner,
};
use crate::utils::round2;
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

const NOT_SIGNIFICANT: &str = "差异不显著，建议继续使用当前配置";
const TREATMENT_WINS: &str = "实验组表现更好，建议采用新权重配置";
const CONTROL_WINS: &str = "对照组表现更好，建议保持当前配置";
const MIXED_RESULT: &str = "两组各有优势，建议进一步测试";

/// Outcome of completing a test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCompletion {
    pub test: ABTestConfig,
    /// Set when the treatment weights were promoted to the scene
    pub applied_adjustment: Option<WeightAdjustment>,
}

/// Creates, routes and evaluates weight A/B tests
pub struct ABTestManager {
    store: Arc<dyn ABTestStore>,
    feedback: Arc<dyn FeedbackStore>,
    tuner: Arc<WeightTuner>,
    significance: Box<dyn SignificanceTest>,
    settings: ABTestingSettings,
}

impl ABTestManager {
    pub fn new(
        store: Arc<dyn ABTestStore>,
        feedback: Arc<dyn FeedbackStore>,
        tuner: Arc<WeightTuner>,
        settings: ABTestingSettings,
    ) -> Self {
        Self {
            store,
            feedback,
            tuner,
            significance: settings.significance_method.build(),
            settings,
        }
    }

    /// Override the significance test chosen by configuration
    pub fn with_significance(mut self, significance: Box<dyn SignificanceTest>) -> Self {
        self.significance = significance;
        self
    }

    /// Validate and register a new active test
    pub async fn create_ab_test(&self, request: NewABTest) -> Result<ABTestConfig> {
        request.control_weights.validate("Control weights")?;
        request.treatment_weights.validate("Treatment weights")?;

        let traffic_split = request
            .traffic_split
            .unwrap_or(self.settings.default_traffic_split);
        if !(traffic_split > 0.0 && traffic_split < 1.0) {
            return Err(AffinityError::validation(format!(
                "Traffic split must be between 0 and 1 (exclusive), got {}",
                traffic_split
            )));
        }

        let min_sample_size = request
            .min_sample_size
            .unwrap_or(self.settings.default_min_sample_size);
        if min_sample_size == 0 {
            return Err(AffinityError::validation(
                "Minimum sample size must be at least 1",
            ));
        }

        let test = ABTestConfig {
            test_id: TestId::new(),
            test_name: request.test_name,
            scene: request.scene,
            control_weights: request.control_weights,
            treatment_weights: request.treatment_weights,
            traffic_split,
            min_sample_size,
            status: TestStatus::Active,
            start_date: Utc::now(),
            end_date: None,
        };
        self.store.insert_test(&test).await?;

        info!(
            "Created A/B test {} ({}) for scene {} with {}% treatment",
            test.test_id,
            test.test_name,
            test.scene,
            (traffic_split * 100.0).round()
        );
        Ok(test)
    }

    pub async fn get_ab_test(&self, test_id: &TestId) -> Result<ABTestConfig> {
        self.store
            .get_test(test_id)
            .await?
            .ok_or_else(|| AffinityError::not_found(format!("A/B test not found: {}", test_id)))
    }

    /// Tests of one scene, or all tests
    pub async fn list_ab_tests(&self, scene: Option<Scene>) -> Result<Vec<ABTestConfig>> {
        self.store.list_tests(scene).await
    }

    /// Group of a user in a test, drawing one on first contact
    ///
    /// The draw is stored with insert-if-absent, so concurrent first calls
    /// for the same user agree on a single group.
    pub async fn assign_to_test_group(
        &self,
        test_id: &TestId,
        user_id: &UserId,
    ) -> Result<TestGroup> {
        let test = self.get_ab_test(test_id).await?;

        if let Some(group) = self.store.get_assignment(test_id, user_id).await? {
            return Ok(group);
        }

        let draw: f64 = rand::thread_rng().gen();
        let candidate = if draw < test.traffic_split {
            TestGroup::Treatment
        } else {
            TestGroup::Control
        };

        let group = self
            .store
            .assign_if_absent(test_id, user_id, candidate)
            .await?;
        debug!(
            "Assigned user {} to {} group of A/B test {}",
            user_id, group, test_id
        );
        Ok(group)
    }

    /// Weights the user should be scored with under this test
    ///
    /// Reads only; the scene registry is never touched.
    pub async fn get_test_weights(
        &self,
        test_id: &TestId,
        user_id: &UserId,
    ) -> Result<MatchWeights> {
        let group = self.assign_to_test_group(test_id, user_id).await?;
        let test = self.get_ab_test(test_id).await?;
        Ok(test.weights_for(group))
    }

    /// Compare the groups on their feedback and store the result
    pub async fn evaluate_ab_test(&self, test_id: &TestId) -> Result<ABTestResult> {
        let test = self.get_ab_test(test_id).await?;

        let groups: HashMap<UserId, TestGroup> = self
            .store
            .list_assignments(test_id)
            .await?
            .into_iter()
            .collect();

        let mut control = GroupSample::default();
        let mut treatment = GroupSample::default();
        for record in self.feedback.list_by_scene(test.scene, None, None).await? {
            match groups.get(&record.user_id) {
                Some(TestGroup::Control) => {
                    control.push(record.satisfaction_score, record.conversation_quality)
                }
                Some(TestGroup::Treatment) => {
                    treatment.push(record.satisfaction_score, record.conversation_quality)
                }
                None => {}
            }
        }

        if control.len() < test.min_sample_size || treatment.len() < test.min_sample_size {
            warn!(
                "A/B test {} has insufficient samples: control={}, treatment={}, required={}",
                test_id,
                control.len(),
                treatment.len(),
                test.min_sample_size
            );
            return Err(AffinityError::validation(format!(
                "Insufficient sample size: control={}, treatment={}, required={}",
                control.len(),
                treatment.len(),
                test.min_sample_size
            )));
        }

        let p_value = self.significance.p_value(&control, &treatment);
        let is_significant = p_value < self.settings.significance_level;

        let control_satisfaction = control.mean_satisfaction();
        let control_quality = control.mean_quality();
        let treatment_satisfaction = treatment.mean_satisfaction();
        let treatment_quality = treatment.mean_quality();

        let (winner, recommendation) = if !is_significant {
            (Winner::Tie, NOT_SIGNIFICANT)
        } else if treatment_satisfaction > control_satisfaction
            && treatment_quality > control_quality
        {
            (Winner::Treatment, TREATMENT_WINS)
        } else if control_satisfaction > treatment_satisfaction
            && control_quality > treatment_quality
        {
            (Winner::Control, CONTROL_WINS)
        } else {
            (Winner::Tie, MIXED_RESULT)
        };

        let result = ABTestResult {
            test_id: *test_id,
            control_sample_size: control.len(),
            control_avg_satisfaction: round2(control_satisfaction),
            control_avg_quality: round2(control_quality),
            treatment_sample_size: treatment.len(),
            treatment_avg_satisfaction: round2(treatment_satisfaction),
            treatment_avg_quality: round2(treatment_quality),
            is_significant,
            p_value,
            winner,
            recommendation: recommendation.to_string(),
            evaluated_at: Utc::now(),
        };
        self.store.put_result(&result).await?;

        info!(
            "Evaluated A/B test {}: winner={}, p={:.4}",
            test_id, result.winner, result.p_value
        );
        Ok(result)
    }

    /// Latest stored evaluation
    pub async fn get_ab_test_result(&self, test_id: &TestId) -> Result<ABTestResult> {
        self.store.get_result(test_id).await?.ok_or_else(|| {
            AffinityError::not_found(format!("A/B test result not found: {}", test_id))
        })
    }

    /// Close a test, optionally promoting a winning treatment
    ///
    /// Treatment weights are applied only when `apply_winner` is set and the
    /// stored evaluation names the treatment as winner. The test is claimed
    /// through the store first so concurrent calls complete it once; if
    /// applying the weights fails it is reopened and the call can be retried.
    pub async fn complete_ab_test(
        &self,
        test_id: &TestId,
        apply_winner: bool,
    ) -> Result<TestCompletion> {
        self.get_ab_test(test_id).await?;
        let Some(test) = self.store.complete_if_active(test_id, Utc::now()).await? else {
            return Err(AffinityError::validation(format!(
                "A/B test {} is already completed",
                test_id
            )));
        };

        let applied_adjustment = if apply_winner {
            match self.apply_treatment(&test).await {
                Ok(adjustment) => adjustment,
                Err(e) => {
                    let mut reopened = test.clone();
                    reopened.status = TestStatus::Active;
                    reopened.end_date = None;
                    if let Err(restore) = self.store.update_test(&reopened).await {
                        warn!("Failed to reopen A/B test {}: {}", test_id, restore);
                    }
                    return Err(e);
                }
            }
        } else {
            None
        };

        info!(
            "Completed A/B test {} (winner applied: {})",
            test_id,
            applied_adjustment.is_some()
        );
        Ok(TestCompletion {
            test,
            applied_adjustment,
        })
    }

    async fn apply_treatment(&self, test: &ABTestConfig) -> Result<Option<WeightAdjustment>> {
        match self.store.get_result(&test.test_id).await? {
            Some(result) if result.winner == Winner::Treatment => {
                let reason = format!("A/B测试结果：实验组获胜（p={:.4}）", result.p_value);
                self.tuner
                    .adjust_weights(test.scene, test.treatment_weights, reason)
                    .await
                    .map(Some)
            }
            Some(result) => {
                debug!(
                    "A/B test {} winner is {}, keeping current weights",
                    test.test_id, result.winner
                );
                Ok(None)
            }
            None => {
                warn!(
                    "A/B test {} completed without an evaluation, nothing applied",
                    test.test_id
                );
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::matching::MatchingService;
    use crate::optimization::performance::PerformanceEvaluator;
    use crate::storage::{
        InMemoryABTestStore, InMemoryAdjustmentStore, InMemoryFeedbackStore,
        InMemoryMatchRepository, InMemoryProfileProvider, InMemorySceneRegistry, MatchRepository,
        SceneRegistry,
    };
    use crate::types::{FeedbackId, FeedbackRecord, MatchId};

    struct Fixture {
        manager: ABTestManager,
        scenes: Arc<dyn SceneRegistry>,
        feedback: Arc<InMemoryFeedbackStore>,
    }

    fn fixture() -> Fixture {
        fixture_with_scenes(Arc::new(InMemorySceneRegistry::new()))
    }

    fn fixture_with_scenes(scenes: Arc<dyn SceneRegistry>) -> Fixture {
        let config = EngineConfig::default();
        let matches: Arc<dyn MatchRepository> = Arc::new(InMemoryMatchRepository::new());
        let feedback = Arc::new(InMemoryFeedbackStore::new());
        let matching = Arc::new(MatchingService::new(
            Arc::new(InMemoryProfileProvider::new()),
            scenes.clone(),
            matches.clone(),
        ));
        let evaluator = Arc::new(PerformanceEvaluator::new(feedback.clone(), matches));
        let tuner = Arc::new(WeightTuner::new(
            matching,
            evaluator,
            feedback.clone(),
            Arc::new(InMemoryAdjustmentStore::new()),
            &config,
        ));
        let manager = ABTestManager::new(
            Arc::new(InMemoryABTestStore::new()),
            feedback.clone(),
            tuner,
            config.ab_testing,
        );
        Fixture {
            manager,
            scenes,
            feedback,
        }
    }

    fn new_test(min_sample_size: usize) -> NewABTest {
        NewABTest {
            test_name: "personality-heavy".into(),
            scene: Scene::StudyRoom,
            control_weights: MatchWeights::new(0.25, 0.35, 0.30, 0.10),
            treatment_weights: MatchWeights::new(0.40, 0.30, 0.20, 0.10),
            traffic_split: Some(0.5),
            min_sample_size: Some(min_sample_size),
        }
    }

    fn rating(user_id: &UserId, satisfaction: f64, quality: f64) -> FeedbackRecord {
        FeedbackRecord {
            feedback_id: FeedbackId::new(),
            user_id: user_id.clone(),
            match_id: MatchId::new(),
            scene: Scene::StudyRoom,
            satisfaction_score: satisfaction,
            conversation_quality: quality,
            match_accuracy: 3.0,
            positive_aspects: vec![],
            negative_aspects: vec![],
            suggestions: String::new(),
            created_at: Utc::now(),
        }
    }

    /// Assign users until each group has `per_group` members, then give every
    /// member of a group the same ratings
    async fn populate(
        f: &Fixture,
        test_id: &TestId,
        per_group: usize,
        control: (f64, f64),
        treatment: (f64, f64),
    ) {
        let (mut controls, mut treatments) = (0, 0);
        let mut n = 0;
        while controls < per_group || treatments < per_group {
            let user = UserId::from(format!("user-{}", n));
            n += 1;
            let group = f.manager.assign_to_test_group(test_id, &user).await.unwrap();
            let (scores, counter) = match group {
                TestGroup::Control => (control, &mut controls),
                TestGroup::Treatment => (treatment, &mut treatments),
            };
            if *counter < per_group {
                *counter += 1;
                f.feedback
                    .append(&rating(&user, scores.0, scores.1))
                    .await
                    .unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_weights() {
        let f = fixture();
        let mut request = new_test(10);
        request.treatment_weights = MatchWeights::new(0.3, 0.3, 0.2, 0.1);

        let err = f.manager.create_ab_test(request).await.unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("Treatment weights"));
        assert!(f.manager.list_ab_tests(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_bad_split_and_sample() {
        let f = fixture();
        for split in [0.0, 1.0, 1.5] {
            let mut request = new_test(10);
            request.traffic_split = Some(split);
            assert!(f.manager.create_ab_test(request).await.unwrap_err().is_validation());
        }
        assert!(f
            .manager
            .create_ab_test(new_test(0))
            .await
            .unwrap_err()
            .is_validation());
    }

    #[tokio::test]
    async fn test_create_applies_defaults() {
        let f = fixture();
        let mut request = new_test(10);
        request.traffic_split = None;
        request.min_sample_size = None;

        let test = f.manager.create_ab_test(request).await.unwrap();
        assert_eq!(test.traffic_split, 0.5);
        assert_eq!(test.min_sample_size, 100);
        assert_eq!(test.status, TestStatus::Active);
        assert_eq!(f.manager.get_ab_test(&test.test_id).await.unwrap(), test);
    }

    #[tokio::test]
    async fn test_assignment_is_sticky() {
        let f = fixture();
        let test = f.manager.create_ab_test(new_test(10)).await.unwrap();
        let user = UserId::from("sticky");

        let first = f
            .manager
            .assign_to_test_group(&test.test_id, &user)
            .await
            .unwrap();
        for _ in 0..20 {
            assert_eq!(
                f.manager
                    .assign_to_test_group(&test.test_id, &user)
                    .await
                    .unwrap(),
                first
            );
        }

        let weights = f
            .manager
            .get_test_weights(&test.test_id, &user)
            .await
            .unwrap();
        assert_eq!(weights, test.weights_for(first));

        // Registry untouched
        let config = f.scenes.get_scene_config(Scene::StudyRoom).await.unwrap();
        assert_eq!(config.match_weights, test.control_weights);
    }

    #[tokio::test]
    async fn test_unknown_test_not_found() {
        let f = fixture();
        let err = f
            .manager
            .assign_to_test_group(&TestId::new(), &"u".into())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(f
            .manager
            .get_ab_test_result(&TestId::new())
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_evaluate_requires_min_sample() {
        let f = fixture();
        let test = f.manager.create_ab_test(new_test(5)).await.unwrap();
        populate(&f, &test.test_id, 4, (3.0, 6.0), (3.0, 6.0)).await;

        let err = f.manager.evaluate_ab_test(&test.test_id).await.unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("required=5"));
    }

    #[tokio::test]
    async fn test_evaluate_treatment_wins_and_complete_applies() {
        let f = fixture();
        let test = f.manager.create_ab_test(new_test(5)).await.unwrap();
        populate(&f, &test.test_id, 5, (2.0, 4.0), (4.5, 9.0)).await;

        let result = f.manager.evaluate_ab_test(&test.test_id).await.unwrap();
        assert_eq!(result.control_sample_size, 5);
        assert_eq!(result.treatment_sample_size, 5);
        // 1 - (2.5 + 5) / 10 floors at 0.01
        assert_eq!(result.p_value, 0.01);
        assert!(result.is_significant);
        assert_eq!(result.winner, Winner::Treatment);
        assert_eq!(result.recommendation, TREATMENT_WINS);

        let completion = f
            .manager
            .complete_ab_test(&test.test_id, true)
            .await
            .unwrap();
        assert_eq!(completion.test.status, TestStatus::Completed);
        assert!(completion.test.end_date.is_some());
        let adjustment = completion.applied_adjustment.expect("treatment applied");
        assert_eq!(adjustment.reason, "A/B测试结果：实验组获胜（p=0.0100）");

        let config = f.scenes.get_scene_config(Scene::StudyRoom).await.unwrap();
        assert_eq!(config.match_weights, test.treatment_weights);

        let err = f
            .manager
            .complete_ab_test(&test.test_id, true)
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_evaluate_not_significant() {
        let f = fixture();
        let test = f.manager.create_ab_test(new_test(3)).await.unwrap();
        populate(&f, &test.test_id, 3, (3.0, 6.0), (3.5, 6.5)).await;

        let result = f.manager.evaluate_ab_test(&test.test_id).await.unwrap();
        assert!(!result.is_significant);
        assert_eq!(result.winner, Winner::Tie);
        assert_eq!(result.recommendation, NOT_SIGNIFICANT);

        let completion = f
            .manager
            .complete_ab_test(&test.test_id, true)
            .await
            .unwrap();
        assert!(completion.applied_adjustment.is_none());
        let config = f.scenes.get_scene_config(Scene::StudyRoom).await.unwrap();
        assert_eq!(config.match_weights, test.control_weights);
    }

    #[tokio::test]
    async fn test_evaluate_mixed_and_control_outcomes() {
        let f = fixture();
        let mixed = f.manager.create_ab_test(new_test(3)).await.unwrap();
        populate(&f, &mixed.test_id, 3, (5.0, 0.0), (0.0, 10.0)).await;
        let result = f.manager.evaluate_ab_test(&mixed.test_id).await.unwrap();
        assert_eq!(result.winner, Winner::Tie);
        assert_eq!(result.recommendation, MIXED_RESULT);

        let f = fixture();
        let control = f.manager.create_ab_test(new_test(3)).await.unwrap();
        populate(&f, &control.test_id, 3, (5.0, 10.0), (1.0, 2.0)).await;
        let result = f.manager.evaluate_ab_test(&control.test_id).await.unwrap();
        assert_eq!(result.winner, Winner::Control);
        assert_eq!(result.recommendation, CONTROL_WINS);
        assert_eq!(
            f.manager.get_ab_test_result(&control.test_id).await.unwrap(),
            result
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_completion_applies_once() {
        let f = fixture();
        let test = f.manager.create_ab_test(new_test(5)).await.unwrap();
        populate(&f, &test.test_id, 5, (2.0, 4.0), (4.5, 9.0)).await;
        f.manager.evaluate_ab_test(&test.test_id).await.unwrap();

        let manager = Arc::new(f.manager);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let manager = manager.clone();
            let test_id = test.test_id;
            handles.push(tokio::spawn(async move {
                manager.complete_ab_test(&test_id, true).await
            }));
        }

        let mut completed = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(completion) => {
                    assert!(completion.applied_adjustment.is_some());
                    completed += 1;
                }
                Err(e) => assert!(e.is_validation()),
            }
        }
        assert_eq!(completed, 1);
        assert_eq!(
            manager
                .tuner
                .list_adjustments(Scene::StudyRoom, None)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    /// Registry whose weight writes always fail
    struct ReadOnlyScenes(InMemorySceneRegistry);

    #[async_trait::async_trait]
    impl SceneRegistry for ReadOnlyScenes {
        async fn get_scene_config(&self, scene: Scene) -> Result<crate::types::SceneConfig> {
            self.0.get_scene_config(scene).await
        }

        async fn set_match_weights(&self, _scene: Scene, _weights: MatchWeights) -> Result<()> {
            Err(AffinityError::Other("registry is read-only".into()))
        }

        async fn list_scenes(&self) -> Result<Vec<crate::types::SceneConfig>> {
            self.0.list_scenes().await
        }
    }

    #[tokio::test]
    async fn test_failed_promotion_reopens_test() {
        let f = fixture_with_scenes(Arc::new(ReadOnlyScenes(InMemorySceneRegistry::new())));
        let test = f.manager.create_ab_test(new_test(5)).await.unwrap();
        populate(&f, &test.test_id, 5, (2.0, 4.0), (4.5, 9.0)).await;
        f.manager.evaluate_ab_test(&test.test_id).await.unwrap();

        assert!(f.manager.complete_ab_test(&test.test_id, true).await.is_err());
        let reopened = f.manager.get_ab_test(&test.test_id).await.unwrap();
        assert!(reopened.is_active());
        assert!(reopened.end_date.is_none());

        // Without promotion the retry goes through
        let completion = f
            .manager
            .complete_ab_test(&test.test_id, false)
            .await
            .unwrap();
        assert_eq!(completion.test.status, TestStatus::Completed);
        assert!(completion.applied_adjustment.is_none());
    }
}
