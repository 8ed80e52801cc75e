//! Engine facade wiring every service over one set of repositories

use crate::config::EngineConfig;
use crate::error::Result;
use crate::matching::MatchingService;
use crate::optimization::{
    ABTestManager, FeedbackCollector, PerformanceEvaluator, ReportGenerator, TestCompletion,
    WeightTuner,
};
use crate::storage::Repositories;
use crate::types::{
    ABTestConfig, ABTestResult, AdjustmentId, FeedbackId, FeedbackRecord, Match, MatchId,
    MatchWeights, NewABTest, NewFeedback, OptimizationReport, PerformanceMetrics, Scene,
    SceneConfig, ScoreBreakdown, TestGroup, TestId, UserId, WeightAdjustment,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

/// Entry point for embedding applications
///
/// Cheap to share behind an `Arc`; every operation takes `&self`.
pub struct AffinityEngine {
    config: EngineConfig,
    matching: Arc<MatchingService>,
    feedback: FeedbackCollector,
    evaluator: Arc<PerformanceEvaluator>,
    tuner: Arc<WeightTuner>,
    ab_tests: Arc<ABTestManager>,
    reports: ReportGenerator,
}

impl AffinityEngine {
    pub fn new(repos: Repositories, config: EngineConfig) -> Self {
        let matching = Arc::new(MatchingService::new(
            repos.profiles.clone(),
            repos.scenes.clone(),
            repos.matches.clone(),
        ));
        let evaluator = Arc::new(PerformanceEvaluator::new(
            repos.feedback.clone(),
            repos.matches.clone(),
        ));
        let tuner = Arc::new(WeightTuner::new(
            matching.clone(),
            evaluator.clone(),
            repos.feedback.clone(),
            repos.adjustments.clone(),
            &config,
        ));
        let ab_tests = Arc::new(ABTestManager::new(
            repos.ab_tests.clone(),
            repos.feedback.clone(),
            tuner.clone(),
            config.ab_testing.clone(),
        ));
        let reports = ReportGenerator::new(evaluator.clone(), tuner.clone(), ab_tests.clone(), &config);

        debug!(
            "Affinity engine ready (significance: {:?})",
            config.ab_testing.significance_method
        );
        Self {
            config,
            matching,
            feedback: FeedbackCollector::new(repos.feedback),
            evaluator,
            tuner,
            ab_tests,
            reports,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn matching(&self) -> &MatchingService {
        &self.matching
    }

    pub fn tuner(&self) -> &WeightTuner {
        &self.tuner
    }

    pub fn ab_tests(&self) -> &ABTestManager {
        &self.ab_tests
    }

    // Matching

    pub async fn calculate_match_score(
        &self,
        user_a_id: &UserId,
        user_b_id: &UserId,
        scene: Scene,
    ) -> Result<ScoreBreakdown> {
        self.matching
            .calculate_match_score(user_a_id, user_b_id, scene)
            .await
    }

    pub async fn calculate_match_score_with_weights(
        &self,
        user_a_id: &UserId,
        user_b_id: &UserId,
        scene: Scene,
        weights: &MatchWeights,
    ) -> Result<ScoreBreakdown> {
        self.matching
            .calculate_match_score_with_weights(user_a_id, user_b_id, scene, weights)
            .await
    }

    pub async fn find_matches(
        &self,
        user_id: &UserId,
        scene: Scene,
        limit: usize,
    ) -> Result<Vec<Match>> {
        self.matching.find_matches(user_id, scene, limit).await
    }

    pub async fn get_match_reason(
        &self,
        user_a_id: &UserId,
        user_b_id: &UserId,
        scene: Scene,
    ) -> String {
        self.matching
            .get_match_reason(user_a_id, user_b_id, scene)
            .await
    }

    pub async fn get_match(&self, match_id: &MatchId) -> Result<Match> {
        self.matching.get_match(match_id).await
    }

    pub async fn get_match_history(&self, user_id: &UserId, limit: usize) -> Result<Vec<Match>> {
        self.matching.get_match_history(user_id, limit).await
    }

    pub async fn accept_match(&self, match_id: &MatchId, user_id: &UserId) -> Result<Match> {
        self.matching.accept_match(match_id, user_id).await
    }

    pub async fn reject_match(&self, match_id: &MatchId, user_id: &UserId) -> Result<Match> {
        self.matching.reject_match(match_id, user_id).await
    }

    // Scenes

    pub async fn get_scene_config(&self, scene: Scene) -> Result<SceneConfig> {
        self.matching.get_scene_config(scene).await
    }

    pub async fn list_scenes(&self) -> Result<Vec<SceneConfig>> {
        self.matching.list_scenes().await
    }

    pub async fn update_match_weights(&self, scene: Scene, weights: MatchWeights) -> Result<()> {
        self.matching.update_match_weights(scene, weights).await
    }

    // Feedback and performance

    pub async fn collect_feedback(&self, feedback: NewFeedback) -> Result<FeedbackRecord> {
        self.feedback.collect_feedback(feedback).await
    }

    pub async fn get_feedback(&self, feedback_id: &FeedbackId) -> Result<FeedbackRecord> {
        self.feedback.get_feedback(feedback_id).await
    }

    pub async fn get_feedbacks_by_scene(
        &self,
        scene: Scene,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<FeedbackRecord>> {
        self.feedback.get_feedbacks_by_scene(scene, start, end).await
    }

    /// Performance score over the configured window
    pub async fn performance_score(&self, scene: Scene) -> Result<f64> {
        self.evaluator
            .score(scene, self.config.performance.window_days)
            .await
    }

    pub async fn calculate_performance_metrics(
        &self,
        scene: Scene,
        period_days: i64,
    ) -> Result<PerformanceMetrics> {
        self.evaluator
            .calculate_performance_metrics(scene, period_days)
            .await
    }

    // Weight tuning

    pub async fn adjust_weights(
        &self,
        scene: Scene,
        new_weights: MatchWeights,
        reason: impl Into<String>,
    ) -> Result<WeightAdjustment> {
        self.tuner.adjust_weights(scene, new_weights, reason).await
    }

    pub async fn evaluate_weight_adjustment(
        &self,
        adjustment_id: &AdjustmentId,
    ) -> Result<WeightAdjustment> {
        self.tuner.evaluate_weight_adjustment(adjustment_id).await
    }

    pub async fn auto_adjust_weights(&self, scene: Scene) -> Result<Option<WeightAdjustment>> {
        self.tuner.auto_adjust_weights(scene).await
    }

    pub async fn generate_optimization_report(&self, scene: Scene) -> Result<OptimizationReport> {
        self.reports.generate_optimization_report(scene).await
    }

    // A/B testing

    pub async fn create_ab_test(&self, request: NewABTest) -> Result<ABTestConfig> {
        self.ab_tests.create_ab_test(request).await
    }

    pub async fn get_ab_test(&self, test_id: &TestId) -> Result<ABTestConfig> {
        self.ab_tests.get_ab_test(test_id).await
    }

    pub async fn list_ab_tests(&self, scene: Option<Scene>) -> Result<Vec<ABTestConfig>> {
        self.ab_tests.list_ab_tests(scene).await
    }

    pub async fn assign_to_test_group(
        &self,
        test_id: &TestId,
        user_id: &UserId,
    ) -> Result<TestGroup> {
        self.ab_tests.assign_to_test_group(test_id, user_id).await
    }

    pub async fn get_test_weights(
        &self,
        test_id: &TestId,
        user_id: &UserId,
    ) -> Result<MatchWeights> {
        self.ab_tests.get_test_weights(test_id, user_id).await
    }

    pub async fn evaluate_ab_test(&self, test_id: &TestId) -> Result<ABTestResult> {
        self.ab_tests.evaluate_ab_test(test_id).await
    }

    pub async fn get_ab_test_result(&self, test_id: &TestId) -> Result<ABTestResult> {
        self.ab_tests.get_ab_test_result(test_id).await
    }

    pub async fn complete_ab_test(
        &self,
        test_id: &TestId,
        apply_winner: bool,
    ) -> Result<TestCompletion> {
        self.ab_tests.complete_ab_test(test_id, apply_winner).await
    }
}
